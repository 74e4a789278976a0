mod app_state;
mod config;
mod db;
mod error;
mod handlers;
mod middlewares;
mod models;
mod queries;
mod routes;
mod websocket;

use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::connect_to_db(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    let session_store = PostgresStore::new(pool.clone());
    if let Err(e) = session_store.migrate().await {
        tracing::error!("Error preparing session store: {}", e);
        std::process::exit(1);
    }
    let session_layer = SessionManagerLayer::new(session_store);

    let state = app_state::AppState {
        db_pool: pool,
        group_router: websocket::router::GroupRouter::new(),
    };
    let app = routes::create_routes().with_state(state).layer(session_layer);

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap();
    axum::serve(listener, app).await.unwrap();
}
