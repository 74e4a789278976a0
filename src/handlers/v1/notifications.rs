use anyhow::anyhow;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tower_sessions::Session;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::sessions::UserSession,
    queries,
};

/// Page-level badge snapshot. The conversation the user currently has open
/// (per their presence record) is excluded so the visible chat never counts
/// against its own badge.
pub async fn unread_count(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user = session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow!("Cannot find user session")))?
        .ok_or_else(|| AppError::Unauthorized(anyhow!("User session not found")))?;

    let mut conn = state
        .db_pool
        .acquire()
        .await
        .map_err(|_| AppError::InternalServerError(anyhow!("Failed to get connection")))?;

    let current_room = queries::presence::get_activity(&mut conn, user.user_id)
        .await?
        .and_then(|a| a.current_room_id);

    let count =
        queries::messages::unread_count_excluding_room(&mut conn, user.user_id, current_room)
            .await?;

    Ok((
        axum::http::StatusCode::OK,
        Json(json!({ "unread_count": count })),
    ))
}
