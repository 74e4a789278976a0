pub fn websocket_routes() -> axum::Router<crate::app_state::AppState> {
    // Admission (auth + room membership) is checked in the upgrade handlers
    // themselves so a refusal closes the connection with a proper status.
    axum::Router::new()
        .route(
            "/chat/{room_id}",
            axum::routing::get(crate::websocket::chat::chat_websocket_handler),
        )
        .route(
            "/notifications",
            axum::routing::get(crate::websocket::notifications::notifications_websocket_handler),
        )
}
