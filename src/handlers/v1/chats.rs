use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::{
        messages::{normalize_body, AttachmentKind},
        rooms::ChatRoom,
        sessions::UserSession,
        websocket::GroupEvent,
    },
    queries,
    websocket::{chat::push_unread_refresh, router::GroupKey},
};

async fn current_user(session: &Session) -> AppResult<UserSession> {
    session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow!("Cannot find user session")))?
        .ok_or_else(|| AppError::Unauthorized(anyhow!("User session not found")))
}

/// Loads the room and resolves the requester's access in one step; every
/// REST call site goes through this, matching the channel admission check.
async fn room_for_participant(
    conn: &mut sqlx::PgConnection,
    room_id: Uuid,
    user_id: Uuid,
) -> AppResult<ChatRoom> {
    let room = queries::rooms::get_room_by_id(conn, room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Chat room not found")))?;

    if !room.is_participant(user_id) {
        return Err(AppError::Forbidden(anyhow!(
            "Not a participant of this chat room"
        )));
    }

    Ok(room)
}

#[derive(Deserialize, Validate)]
pub struct StartChatPayload {
    #[validate(length(min = 1))]
    pub username: String,
    pub related_pitch_id: Option<Uuid>,
}

/// Starts (or resumes) a conversation with the named user. Calling it twice
/// for the same pair returns the same room.
pub async fn start_chat(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<StartChatPayload>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    payload
        .validate()
        .map_err(|_| AppError::BadRequest(anyhow!("Invalid inputs")))?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let other = queries::users::get_user_by_username(&mut conn, payload.username.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("User not found")))?;

    if other.id == user.user_id {
        return Err(AppError::BadRequest(anyhow!("You cannot chat with yourself")));
    }

    let requester = queries::users::get_user_by_id(&mut conn, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("User not found")))?;

    let (room, created) =
        queries::rooms::get_or_create_room(&mut conn, &requester, &other, payload.related_pitch_id)
            .await?;

    Ok((
        axum::http::StatusCode::OK,
        Json(json!({ "room_id": room.id, "created": created })),
    ))
}

/// The user's conversations with unread counts and last-message previews,
/// most recently active first.
pub async fn chat_list(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let rooms = queries::rooms::get_rooms_for_user(&mut conn, user.user_id).await?;

    let mut entries = Vec::with_capacity(rooms.len());
    for room in rooms {
        let Some((other_id, other_role)) = room.other_participant(user.user_id) else {
            continue;
        };
        let Some(other) = queries::users::get_user_by_id(&mut conn, other_id).await? else {
            continue;
        };

        let unread_count =
            queries::messages::unread_count_in_room_from(&mut conn, room.id, other_id).await?;
        let total_messages = queries::messages::count_messages_in_room(&mut conn, room.id).await?;
        let last_message = queries::messages::get_latest_message_for_room(&mut conn, room.id).await?;
        let last_activity = last_message
            .as_ref()
            .map(|m| m.message.created_at)
            .unwrap_or(room.created_at);

        entries.push((last_activity, json!({
            "room_id": room.id,
            "related_pitch_id": room.related_pitch_id,
            "is_active": room.is_active,
            "other_user": {
                "id": other.id,
                "username": other.username,
                "role": other_role.label(),
            },
            "unread_count": unread_count,
            "total_messages": total_messages,
            "last_message": last_message,
            "last_activity": last_activity,
        })));
    }

    sort_recent_first(&mut entries);
    let chats: Vec<serde_json::Value> = entries.into_iter().map(|(_, entry)| entry).collect();

    Ok((
        axum::http::StatusCode::OK,
        Json(json!({ "total_chats": chats.len(), "chats": chats })),
    ))
}

/// Orders chat-list entries newest first by their activity instant. The
/// comparison happens on the timestamps themselves; their serialized form
/// varies in sub-second precision and does not sort chronologically.
fn sort_recent_first(entries: &mut [(DateTime<Utc>, serde_json::Value)]) {
    entries.sort_by(|a, b| b.0.cmp(&a.0));
}

/// Point-in-time snapshot used as the fallback/refresh path next to the live
/// channel: ordered history plus the other participant's presence. Fetching
/// also marks their messages delivered and read, mirroring an open chat view.
pub async fn room_messages(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let room = room_for_participant(&mut conn, room_id, user.user_id).await?;
    let (other_id, _) = room
        .other_participant(user.user_id)
        .ok_or_else(|| AppError::Forbidden(anyhow!("Not a participant of this chat room")))?;

    let now = Utc::now();
    let activity = queries::presence::get_activity(&mut conn, other_id).await?;
    let (other_online, other_typing, other_last_seen) = match activity {
        Some(a) => (a.online_now(now), a.typing_in(room.id, now), Some(a.last_seen)),
        None => (false, false, None),
    };

    let marked = queries::messages::mark_room_messages_read(&mut conn, room.id, other_id).await?;
    if marked > 0 {
        // The snapshot just consumed unread messages; keep the reader's
        // badge in step with the live mark-read path.
        if let Err(e) = push_unread_refresh(&state, &mut conn, user.user_id).await {
            warn!(user_id = %user.user_id, room_id = %room.id, error = %e, "unread refresh failed");
        }
    }
    let messages = queries::messages::get_messages_for_room(&mut conn, room.id).await?;

    Ok((
        axum::http::StatusCode::OK,
        Json(json!({
            "success": true,
            "messages": messages,
            "other_user_online": other_online,
            "other_user_typing": other_typing,
            "other_user_last_seen": other_last_seen,
        })),
    ))
}

#[derive(Deserialize, Validate)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub message: String,
    pub attachment: Option<AttachmentPayload>,
}

#[derive(Deserialize, Validate)]
pub struct AttachmentPayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1))]
    pub size: i64,
}

/// Plain request/response send for non-channel clients. Unlike the live
/// channel, a blank body here is reported as a failure. Messages land
/// undelivered and are stamped when the recipient fetches or reads.
pub async fn send_message(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let room = room_for_participant(&mut conn, room_id, user.user_id).await?;

    let body = normalize_body(&payload.message);
    let attachment = match payload.attachment {
        Some(a) => {
            a.validate()
                .map_err(|_| AppError::BadRequest(anyhow!("Invalid attachment")))?;
            Some(queries::messages::AttachmentUpload {
                kind: AttachmentKind::from_file_name(&a.name),
                name: a.name,
                size: a.size,
            })
        }
        None => None,
    };

    // Body may be empty only when a file rides along.
    if body.is_none() && attachment.is_none() {
        return Err(AppError::BadRequest(anyhow!("Message cannot be empty")));
    }

    let saved = queries::messages::insert_message(
        &mut conn,
        room.id,
        user.user_id,
        body.as_deref().unwrap_or(""),
        false,
        attachment.as_ref(),
    )
    .await?;
    queries::rooms::touch_room(&mut conn, room.id).await?;

    // Same fan-out as the live path so channel clients and badges stay
    // current even when the sender posts over REST.
    if let Some((other_id, _)) = room.other_participant(user.user_id) {
        if let Err(e) = push_unread_refresh(&state, &mut conn, other_id).await {
            warn!(user_id = %other_id, room_id = %room.id, error = %e, "unread refresh failed");
        }
    }
    state.group_router.publish(
        GroupKey::Room(room.id),
        GroupEvent::NewMessage {
            message_id: saved.id,
            sender_id: user.user_id,
            sender_name: user.username.clone(),
            body: saved.body.clone(),
            timestamp: saved.created_at,
            delivered: saved.is_delivered,
            read: saved.is_read,
        },
    );

    Ok((
        axum::http::StatusCode::OK,
        Json(json!({ "success": true, "message": saved })),
    ))
}

#[derive(Deserialize)]
pub struct TypingPayload {
    pub is_typing: bool,
}

/// Request/response typing indicator for non-channel clients.
pub async fn typing_status(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<TypingPayload>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let room = room_for_participant(&mut conn, room_id, user.user_id).await?;

    queries::presence::set_typing(&mut conn, user.user_id, payload.is_typing.then_some(room.id))
        .await?;

    state.group_router.publish(
        GroupKey::Room(room.id),
        GroupEvent::Typing {
            user_id: user.user_id,
            username: user.username.clone(),
            is_typing: payload.is_typing,
        },
    );

    Ok((axum::http::StatusCode::OK, Json(json!({ "success": true }))))
}

#[derive(Deserialize)]
pub struct ActivityPayload {
    pub room_id: Option<Uuid>,
    #[serde(default)]
    pub offline: bool,
}

/// Heartbeat keeping the presence row fresh; `offline: true` is the explicit
/// going-away marker for clients that can still get a request out.
pub async fn update_activity(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<ActivityPayload>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    if payload.offline {
        queries::presence::set_offline(&mut conn, user.user_id).await?;
    } else {
        queries::presence::set_online(&mut conn, user.user_id, payload.room_id).await?;
    }

    Ok((axum::http::StatusCode::OK, Json(json!({ "success": true }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_list_orders_by_instant_not_serialized_form() {
        // Same second, differing sub-second precision: the RFC 3339 strings
        // sort the later instant first lexicographically reversed.
        let earlier: DateTime<Utc> = "2026-01-01T10:00:00.123Z".parse().unwrap();
        let later: DateTime<Utc> = "2026-01-01T10:00:00.123456Z".parse().unwrap();
        assert!(later > earlier);

        let mut entries = vec![
            (earlier, json!({ "room": "older" })),
            (later, json!({ "room": "newer" })),
        ];
        sort_recent_first(&mut entries);

        assert_eq!(entries[0].1["room"], "newer");
        assert_eq!(entries[1].1["room"], "older");
    }

    #[test]
    fn chat_list_ties_keep_both_entries() {
        let t: DateTime<Utc> = "2026-01-01T10:00:00Z".parse().unwrap();
        let mut entries = vec![(t, json!({ "room": "a" })), (t, json!({ "room": "b" }))];
        sort_recent_first(&mut entries);
        assert_eq!(entries.len(), 2);
    }
}
