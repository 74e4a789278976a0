use crate::error::{AppError, AppResult};
use crate::models::users::User;
use uuid::Uuid;

pub async fn get_user_by_id(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, is_investor, is_staff, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        tracing::error!(%user_id, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to load user"))
    })?;

    Ok(user)
}

pub async fn get_user_by_username(
    conn: &mut sqlx::PgConnection,
    username: &str,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, is_investor, is_staff, created_at FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        tracing::error!(username, "{:?}", e);
        AppError::InternalServerError(anyhow::anyhow!("Failed to load user"))
    })?;

    Ok(user)
}
