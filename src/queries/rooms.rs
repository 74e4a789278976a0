use crate::error::{AppError, AppResult};
use crate::models::rooms::{role_of, ChatRoom};
use crate::models::users::User;
use uuid::Uuid;

pub async fn get_room_by_id(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
) -> AppResult<Option<ChatRoom>> {
    let room = sqlx::query_as::<_, ChatRoom>("SELECT * FROM chat_rooms WHERE id = $1")
        .bind(room_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            tracing::error!(%room_id, "{:?}", e);
            AppError::InternalServerError(anyhow::anyhow!("Failed to load chat room"))
        })?;

    Ok(room)
}

/// All rooms the user participates in, most recently touched first.
pub async fn get_rooms_for_user(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> AppResult<Vec<ChatRoom>> {
    let rooms = sqlx::query_as::<_, ChatRoom>(
        "SELECT * FROM chat_rooms
         WHERE participant_1 = $1 OR participant_2 = $1
         ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to load chat rooms"))
    })?;

    Ok(rooms)
}

/// Looks up the room for an unordered pair, trying both slot orders so the
/// same two users never end up with duplicate rooms. Optionally scoped to a
/// single pitch.
pub async fn find_room_for_pair(
    conn: &mut sqlx::PgConnection,
    user_a: Uuid,
    user_b: Uuid,
    related_pitch_id: Option<Uuid>,
) -> AppResult<Option<ChatRoom>> {
    let room = sqlx::query_as::<_, ChatRoom>(
        "SELECT * FROM chat_rooms
         WHERE ((participant_1 = $1 AND participant_2 = $2)
             OR (participant_1 = $2 AND participant_2 = $1))
           AND related_pitch_id IS NOT DISTINCT FROM $3
         LIMIT 1",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(related_pitch_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_a, %user_b, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to look up chat room"))
    })?;

    Ok(room)
}

/// Returns the existing room for the pair or creates one, tagging each slot
/// with the role derived from the account flags. The second element reports
/// whether a room was created.
pub async fn get_or_create_room(
    conn: &mut sqlx::PgConnection,
    requester: &User,
    other: &User,
    related_pitch_id: Option<Uuid>,
) -> AppResult<(ChatRoom, bool)> {
    if let Some(room) = find_room_for_pair(conn, requester.id, other.id, related_pitch_id).await? {
        return Ok((room, false));
    }

    let room = sqlx::query_as::<_, ChatRoom>(
        "INSERT INTO chat_rooms
             (id, participant_1, participant_2, participant_1_role, participant_2_role,
              related_pitch_id, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, now(), now())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(requester.id)
    .bind(other.id)
    .bind(role_of(requester))
    .bind(role_of(other))
    .bind(related_pitch_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(requester = %requester.id, other = %other.id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to create chat room"))
    })?;

    Ok((room, true))
}

/// Keeps the room's recency ordering in step with message traffic.
pub async fn touch_room(conn: &mut sqlx::PgConnection, room_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE chat_rooms SET updated_at = now() WHERE id = $1")
        .bind(room_id)
        .execute(conn)
        .await
        .map_err(|e| {
            tracing::error!(%room_id, "{:?}", e);
            AppError::InternalServerError(anyhow::anyhow!("Failed to update chat room"))
        })?;

    Ok(())
}
