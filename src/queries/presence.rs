use crate::error::{AppError, AppResult};
use crate::models::presence::UserActivity;
use uuid::Uuid;

// Every mutation here is a single upsert keyed on user_id, so concurrent
// connects (two browser tabs) cannot create duplicate rows.

pub async fn get_activity(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> AppResult<Option<UserActivity>> {
    let activity =
        sqlx::query_as::<_, UserActivity>("SELECT * FROM user_activity WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                tracing::error!(%user_id, "{:?}", e);
                AppError::InternalServerError(anyhow::anyhow!("Failed to load user activity"))
            })?;

    Ok(activity)
}

/// Marks the user online, bound to the room they have open (if any).
pub async fn set_online(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    current_room_id: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO user_activity
             (user_id, is_online, last_seen, is_typing, typing_room_id, current_room_id)
         VALUES ($1, TRUE, now(), FALSE, NULL, $2)
         ON CONFLICT (user_id) DO UPDATE
         SET is_online = TRUE, last_seen = now(), current_room_id = EXCLUDED.current_room_id",
    )
    .bind(user_id)
    .bind(current_room_id)
    .execute(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to mark user online"))
    })?;

    Ok(())
}

/// Marks the user offline and clears room binding and typing state in the
/// same statement, so a disconnect can never leave a dangling typing flag.
pub async fn set_offline(conn: &mut sqlx::PgConnection, user_id: Uuid) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO user_activity
             (user_id, is_online, last_seen, is_typing, typing_room_id, current_room_id)
         VALUES ($1, FALSE, now(), FALSE, NULL, NULL)
         ON CONFLICT (user_id) DO UPDATE
         SET is_online = FALSE, last_seen = now(),
             is_typing = FALSE, typing_room_id = NULL, current_room_id = NULL",
    )
    .bind(user_id)
    .execute(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to mark user offline"))
    })?;

    Ok(())
}

/// Records typing state. Typing implies online, so the online flag and
/// last-seen stamp are refreshed as a side effect.
pub async fn set_typing(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    typing_room_id: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO user_activity
             (user_id, is_online, last_seen, is_typing, typing_room_id, current_room_id)
         VALUES ($1, TRUE, now(), $2::uuid IS NOT NULL, $2, $2)
         ON CONFLICT (user_id) DO UPDATE
         SET is_online = TRUE, last_seen = now(),
             is_typing = EXCLUDED.is_typing, typing_room_id = EXCLUDED.typing_room_id",
    )
    .bind(user_id)
    .bind(typing_room_id)
    .execute(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to update typing state"))
    })?;

    Ok(())
}
