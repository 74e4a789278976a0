use crate::error::{AppError, AppResult};
use crate::models::messages::{AttachmentKind, ChatMessage, MessageWithSender};
use uuid::Uuid;

pub struct AttachmentUpload {
    pub name: String,
    pub size: i64,
    pub kind: AttachmentKind,
}

/// Persists a new message. The live channel stores messages as already
/// delivered; the REST fallback path stores them undelivered until the
/// recipient fetches.
pub async fn insert_message(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
    sender_id: Uuid,
    body: &str,
    delivered: bool,
    attachment: Option<&AttachmentUpload>,
) -> AppResult<ChatMessage> {
    let message = sqlx::query_as::<_, ChatMessage>(
        "INSERT INTO chat_messages
             (id, room_id, sender_id, body, attachment_name, attachment_size, attachment_kind,
              created_at, is_delivered, delivered_at, is_read, read_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, now(), $8,
                 CASE WHEN $8 THEN now() ELSE NULL END, FALSE, NULL)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(room_id)
    .bind(sender_id)
    .bind(body)
    .bind(attachment.map(|a| a.name.as_str()))
    .bind(attachment.map(|a| a.size))
    .bind(attachment.map(|a| a.kind))
    .bind(delivered)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, %sender_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to save message"))
    })?;

    Ok(message)
}

/// Ordered history for a room. Creation time is authoritative; insertion id
/// breaks ties so replay order is stable.
pub async fn get_messages_for_room(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
) -> AppResult<Vec<MessageWithSender>> {
    let messages = sqlx::query_as::<_, MessageWithSender>(
        "SELECT m.*, u.username AS sender_name
         FROM chat_messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.room_id = $1
         ORDER BY m.created_at, m.id",
    )
    .bind(room_id)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to load messages"))
    })?;

    Ok(messages)
}

pub async fn get_latest_message_for_room(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
) -> AppResult<Option<MessageWithSender>> {
    let message = sqlx::query_as::<_, MessageWithSender>(
        "SELECT m.*, u.username AS sender_name
         FROM chat_messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.room_id = $1
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT 1",
    )
    .bind(room_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to load latest message"))
    })?;

    Ok(message)
}

pub async fn count_messages_in_room(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM chat_messages WHERE room_id = $1",
    )
    .bind(room_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to count messages"))
    })?;

    Ok(count)
}

/// Marks one message read. Read implies delivered, so the deliver stamp is
/// forced here too; both stamps are only set once.
pub async fn mark_message_read(
    conn: &mut sqlx::PgConnection,
    message_id: Uuid,
) -> AppResult<Option<ChatMessage>> {
    let message = sqlx::query_as::<_, ChatMessage>(
        "UPDATE chat_messages
         SET is_read = TRUE, read_at = COALESCE(read_at, now()),
             is_delivered = TRUE, delivered_at = COALESCE(delivered_at, now())
         WHERE id = $1
         RETURNING *",
    )
    .bind(message_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        tracing::error!(%message_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to mark message read"))
    })?;

    Ok(message)
}

/// The REST snapshot marks everything the other participant sent as
/// delivered and read in one pass.
pub async fn mark_room_messages_read(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
    sender_id: Uuid,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE chat_messages
         SET is_delivered = TRUE, delivered_at = COALESCE(delivered_at, now()),
             is_read = TRUE, read_at = COALESCE(read_at, now())
         WHERE room_id = $1 AND sender_id = $2 AND (is_read = FALSE OR is_delivered = FALSE)",
    )
    .bind(room_id)
    .bind(sender_id)
    .execute(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, %sender_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to mark room messages read"))
    })?;

    Ok(result.rows_affected())
}

/// Total unread messages addressed to the user: every room they participate
/// in, excluding messages they sent themselves. Computed fresh per call.
pub async fn unread_count_for_user(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*)
         FROM chat_messages m
         JOIN chat_rooms r ON r.id = m.room_id
         WHERE (r.participant_1 = $1 OR r.participant_2 = $1)
           AND m.sender_id <> $1
           AND m.is_read = FALSE",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to count unread messages"))
    })?;

    Ok(count)
}

/// Badge variant: excludes the conversation the user currently has open,
/// taken from the presence record, so the open chat never inflates the badge.
pub async fn unread_count_excluding_room(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    excluded_room_id: Option<Uuid>,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*)
         FROM chat_messages m
         JOIN chat_rooms r ON r.id = m.room_id
         WHERE (r.participant_1 = $1 OR r.participant_2 = $1)
           AND m.sender_id <> $1
           AND m.is_read = FALSE
           AND ($2::uuid IS NULL OR m.room_id <> $2)",
    )
    .bind(user_id)
    .bind(excluded_room_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to count unread messages"))
    })?;

    Ok(count)
}

/// Unread messages a specific sender left in one room, for the chat list.
pub async fn unread_count_in_room_from(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
    sender_id: Uuid,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM chat_messages
         WHERE room_id = $1 AND sender_id = $2 AND is_read = FALSE",
    )
    .bind(room_id)
    .bind(sender_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        tracing::error!(%room_id, %sender_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to count unread messages"))
    })?;

    Ok(count)
}
