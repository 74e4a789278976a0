use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// Accounts are managed elsewhere (registration, payment gating, profiles);
// the chat backend only reads identity and role flags from this table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub is_investor: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}
