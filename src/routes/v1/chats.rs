use crate::handlers::v1::chats;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::{get, post};
use axum::{middleware, Router};

pub fn chats_routes() -> Router<AppState> {
    // Protected routes that require authentication
    Router::new()
        .route("/", get(chats::chat_list))
        .route("/start", post(chats::start_chat))
        .route(
            "/{room_id}/messages",
            get(chats::room_messages).post(chats::send_message),
        )
        .route("/{room_id}/typing", post(chats::typing_status))
        .layer(middleware::from_fn(auth_middleware))
}
