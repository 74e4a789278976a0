use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tower_sessions::Session;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::{sessions::UserSession, websocket::ServerEvent},
    queries,
    websocket::router::GroupKey,
};

/// Upgrades the per-user notification channel. Anonymous connections are
/// refused before the upgrade.
pub async fn notifications_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    let user = session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Cannot find user session")))?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User session not found")))?;

    Ok(ws.on_upgrade(move |socket| run_notification_session(socket, state, user)))
}

/// Strictly one-way side channel: joins the user-scoped group, pushes the
/// current unread total, then forwards routed pushes until the socket closes.
async fn run_notification_session(socket: WebSocket, state: AppState, user: UserSession) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = Uuid::new_v4();
    let group = GroupKey::UserNotifications(user.user_id);

    state.group_router.join(group, connection_id, user.user_id, tx.clone());
    info!(user_id = %user.user_id, "notification session opened");

    if let Err(e) = push_initial_count(&state, user.user_id, &tx).await {
        warn!(user_id = %user.user_id, error = %e, "failed to push initial unread count");
    }

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

    // No client-originated events are defined on this channel; drain the
    // stream only to observe the close.
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                warn!(user_id = %user.user_id, "unexpected client event on notification channel");
            }
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e, "websocket error");
                break;
            }
            _ => {}
        }
    }

    state.group_router.leave(group, connection_id);
    outgoing_task.abort();

    info!(user_id = %user.user_id, "notification session closed");
}

async fn push_initial_count(
    state: &AppState,
    user_id: Uuid,
    tx: &tokio::sync::mpsc::UnboundedSender<ServerEvent>,
) -> AppResult<()> {
    let mut conn = state.db_pool.acquire().await.map_err(|_| {
        AppError::InternalServerError(anyhow::anyhow!("Database connection failed"))
    })?;

    let unread_count = queries::messages::unread_count_for_user(&mut conn, user_id).await?;
    let _ = tx.send(ServerEvent::UnreadCountUpdate { unread_count });
    Ok(())
}
