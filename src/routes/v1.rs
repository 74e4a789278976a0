pub mod chats;
pub mod notifications;
pub mod websocket;

use crate::app_state::AppState;
use crate::handlers::v1::chats::update_activity;
use crate::middlewares::auth::auth_middleware;
use axum::routing::post;
use axum::{middleware, Router};

pub fn v1_routes() -> Router<AppState> {
    // The presence heartbeat is page-level, not tied to one conversation,
    // so it lives at the version root rather than under /chats.
    let activity_route = Router::new()
        .route("/activity", post(update_activity))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .nest("/chats", chats::chats_routes())
        .nest("/notifications", notifications::notifications_routes())
        .nest("/ws", websocket::websocket_routes())
        .merge(activity_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::router::GroupRouter;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        // connect_lazy never touches the network; these routes fail on the
        // missing session layer long before any query runs.
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/venturelink_test")
            .expect("lazy pool");
        let state = AppState {
            db_pool: pool,
            group_router: GroupRouter::new(),
        };
        v1_routes().with_state(state)
    }

    #[tokio::test]
    async fn activity_heartbeat_is_mounted_at_the_version_root() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/activity")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn activity_heartbeat_is_not_nested_under_chats() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chats/activity")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
