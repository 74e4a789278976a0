use crate::handlers::v1::notifications;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::get;
use axum::{middleware, Router};

pub fn notifications_routes() -> Router<AppState> {
    Router::new()
        .route("/unread_count", get(notifications::unread_count))
        .layer(middleware::from_fn(auth_middleware))
}
