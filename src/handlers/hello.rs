use axum::response::IntoResponse;

pub async fn hello() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "venturelink chat backend")
}
