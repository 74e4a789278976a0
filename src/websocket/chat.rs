use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tower_sessions::Session;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::{
        messages::normalize_body,
        rooms::ChatRoom,
        sessions::UserSession,
        websocket::{ClientEvent, GroupEvent, ServerEvent},
    },
    queries,
    websocket::router::GroupKey,
};

/// Upgrades a room-channel connection. Admission requires an authenticated
/// session and room membership; everything after the upgrade runs in
/// [`run_chat_session`].
pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<Response> {
    let user = session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Cannot find user session")))?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User session not found")))?;

    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    let room = queries::rooms::get_room_by_id(&mut conn, room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Chat room not found")))?;

    if !room.is_participant(user.user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Not a participant of this chat room"
        )));
    }

    Ok(ws.on_upgrade(move |socket| run_chat_session(socket, state, room, user)))
}

/// One open chat view: joins the room group, replays history, then processes
/// client events sequentially until the socket closes. Offline presence and
/// group leave always run on the way out.
async fn run_chat_session(socket: WebSocket, state: AppState, room: ChatRoom, user: UserSession) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = Uuid::new_v4();
    let room_group = GroupKey::Room(room.id);

    info!(user_id = %user.user_id, room_id = %room.id, "chat session opened");

    // Outgoing pump: everything this client receives flows through one channel,
    // both direct replies and group fan-out.
    let outgoing_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    state.group_router.join(room_group, connection_id, user.user_id, tx.clone());

    // Presence failures degrade the join, they do not abort it.
    if let Err(e) = mark_online(&state, user.user_id, room.id).await {
        warn!(user_id = %user.user_id, room_id = %room.id, error = %e, "failed to mark user online");
    }

    if let Err(e) = replay_room_state(&state, &room, &user, &tx).await {
        warn!(user_id = %user.user_id, room_id = %room.id, error = %e, "failed to replay room state");
    }

    state.group_router.publish(
        room_group,
        GroupEvent::UserStatus {
            user_id: user.user_id,
            username: user.username.clone(),
            is_online: true,
            last_seen: Some(Utc::now()),
        },
    );

    let _ = tx.send(ServerEvent::ConnectionEstablished {
        message: "Connected to real-time chat".to_string(),
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Per-event boundary: a malformed or failing event is logged
                // and dropped, the connection lives on.
                if let Err(e) = handle_client_event(&state, &room, &user, text.as_str()).await {
                    warn!(
                        user_id = %user.user_id,
                        room_id = %room.id,
                        error = %e,
                        "chat event failed"
                    );
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(user_id = %user.user_id, room_id = %room.id, error = %e, "websocket error");
                break;
            }
            _ => {}
        }
    }

    // Guaranteed cleanup, in order: offline presence, offline broadcast,
    // group leave.
    if let Err(e) = mark_offline(&state, user.user_id).await {
        warn!(user_id = %user.user_id, error = %e, "failed to mark user offline");
    }
    state.group_router.publish(
        room_group,
        GroupEvent::UserStatus {
            user_id: user.user_id,
            username: user.username.clone(),
            is_online: false,
            last_seen: Some(Utc::now()),
        },
    );
    state.group_router.leave(room_group, connection_id);
    outgoing_task.abort();

    info!(user_id = %user.user_id, room_id = %room.id, "chat session closed");
}

async fn mark_online(state: &AppState, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;
    queries::presence::set_online(&mut conn, user_id, Some(room_id)).await
}

async fn mark_offline(state: &AppState, user_id: Uuid) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;
    queries::presence::set_offline(&mut conn, user_id).await
}

/// Sends the full message history (annotated per viewer) followed by the
/// other participant's current presence, staleness-adjusted. A missing
/// presence row reads as offline, never seen.
async fn replay_room_state(
    state: &AppState,
    room: &ChatRoom,
    user: &UserSession,
    tx: &tokio::sync::mpsc::UnboundedSender<ServerEvent>,
) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    let history = queries::messages::get_messages_for_room(&mut conn, room.id).await?;
    for item in history {
        let _ = tx.send(ServerEvent::ExistingMessage {
            message: item.message.body,
            sender_id: item.message.sender_id,
            sender_name: item.sender_name,
            timestamp: item.message.created_at,
            message_id: item.message.id,
            delivered: item.message.is_delivered,
            read: item.message.is_read,
            is_own_message: item.message.sender_id == user.user_id,
        });
    }

    let Some((other_id, _)) = room.other_participant(user.user_id) else {
        return Ok(());
    };
    let Some(other) = queries::users::get_user_by_id(&mut conn, other_id).await? else {
        return Ok(());
    };

    let activity = queries::presence::get_activity(&mut conn, other_id).await?;
    let now = Utc::now();
    let (is_online, last_seen) = match activity {
        Some(a) => (a.online_now(now), Some(a.last_seen)),
        None => (false, None),
    };

    let _ = tx.send(ServerEvent::UserStatus {
        user_id: other.id,
        username: other.username,
        is_online,
        last_seen,
    });

    Ok(())
}

async fn handle_client_event(
    state: &AppState,
    room: &ChatRoom,
    user: &UserSession,
    text: &str,
) -> AppResult<()> {
    let event: ClientEvent = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed client event: {}", e)))?;

    match event {
        ClientEvent::ChatMessage { message } => {
            handle_chat_message(state, room, user, &message).await
        }
        ClientEvent::MessageRead { message_id } => {
            handle_message_read(state, room, user, message_id).await
        }
        ClientEvent::TypingStart => handle_typing(state, room, user, true).await,
        ClientEvent::TypingStop => handle_typing(state, room, user, false).await,
    }
}

async fn handle_chat_message(
    state: &AppState,
    room: &ChatRoom,
    user: &UserSession,
    raw_message: &str,
) -> AppResult<()> {
    // Blank input is a user no-op, not a failure; nothing is persisted or
    // broadcast.
    let Some(body) = normalize_body(raw_message) else {
        return Ok(());
    };

    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    let saved =
        queries::messages::insert_message(&mut conn, room.id, user.user_id, &body, true, None)
            .await?;
    queries::rooms::touch_room(&mut conn, room.id).await?;

    // The recipient may have no chat window open at all, so their badge
    // refresh goes out before the room broadcast.
    if let Some((other_id, _)) = room.other_participant(user.user_id) {
        if let Err(e) = push_unread_refresh(state, &mut conn, other_id).await {
            warn!(user_id = %other_id, room_id = %room.id, error = %e, "unread refresh failed");
        }
    }

    state.group_router.publish(
        GroupKey::Room(room.id),
        GroupEvent::NewMessage {
            message_id: saved.id,
            sender_id: user.user_id,
            sender_name: user.username.clone(),
            body: saved.body,
            timestamp: saved.created_at,
            delivered: saved.is_delivered,
            read: saved.is_read,
        },
    );

    Ok(())
}

async fn handle_message_read(
    state: &AppState,
    room: &ChatRoom,
    user: &UserSession,
    message_id: Uuid,
) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    let Some(updated) = queries::messages::mark_message_read(&mut conn, message_id).await? else {
        warn!(%message_id, room_id = %room.id, "mark read for unknown message");
        return Ok(());
    };
    if updated.room_id != room.id {
        warn!(%message_id, room_id = %room.id, "mark read for message outside room");
        return Ok(());
    }

    // Reading decreases the reader's own badge.
    if let Err(e) = push_unread_refresh(state, &mut conn, user.user_id).await {
        warn!(user_id = %user.user_id, room_id = %room.id, error = %e, "unread refresh failed");
    }

    state.group_router.publish(
        GroupKey::Room(room.id),
        GroupEvent::MessageRead {
            message_id: updated.id,
            message_sender_id: updated.sender_id,
            read_by_user_id: user.user_id,
            read_by_username: user.username.clone(),
            read_at: updated.read_at.unwrap_or_else(Utc::now),
        },
    );

    Ok(())
}

async fn handle_typing(
    state: &AppState,
    room: &ChatRoom,
    user: &UserSession,
    is_typing: bool,
) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    queries::presence::set_typing(&mut conn, user.user_id, is_typing.then_some(room.id)).await?;

    state.group_router.publish(
        GroupKey::Room(room.id),
        GroupEvent::Typing {
            user_id: user.user_id,
            username: user.username.clone(),
            is_typing,
        },
    );

    Ok(())
}

/// Recomputes a user's total unread count and pushes it into their
/// notification group. Nobody listening is fine; the publish is dropped.
pub async fn push_unread_refresh(
    state: &AppState,
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> AppResult<()> {
    let unread_count = queries::messages::unread_count_for_user(conn, user_id).await?;
    state.group_router.publish(
        GroupKey::UserNotifications(user_id),
        GroupEvent::UnreadCount { unread_count },
    );
    Ok(())
}
