use crate::websocket::router::GroupRouter;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub group_router: GroupRouter,
}
