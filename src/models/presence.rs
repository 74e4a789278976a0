use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A presence row older than this is reported offline regardless of the
/// stored flag; it compensates for disconnects the server never saw.
pub const ONLINE_FRESHNESS_SECS: i64 = 60;

/// Current live state for one user, one row each. Absence of a row means
/// "offline, never seen" and is not an error.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserActivity {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub is_typing: bool,
    pub typing_room_id: Option<Uuid>,
    pub current_room_id: Option<Uuid>,
}

impl UserActivity {
    /// The staleness override every read path must apply.
    pub fn online_now(&self, now: DateTime<Utc>) -> bool {
        self.is_online && (now - self.last_seen).num_seconds() < ONLINE_FRESHNESS_SECS
    }

    /// Typing is only reported for the room in question and only while the
    /// user still counts as online.
    pub fn typing_in(&self, room_id: Uuid, now: DateTime<Utc>) -> bool {
        self.online_now(now) && self.is_typing && self.typing_room_id == Some(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn activity(is_online: bool, seen_secs_ago: i64) -> UserActivity {
        UserActivity {
            user_id: Uuid::new_v4(),
            is_online,
            last_seen: Utc::now() - Duration::seconds(seen_secs_ago),
            is_typing: false,
            typing_room_id: None,
            current_room_id: None,
        }
    }

    #[test]
    fn fresh_row_reports_stored_flag() {
        let now = Utc::now();
        assert!(activity(true, 5).online_now(now));
        assert!(!activity(false, 5).online_now(now));
    }

    #[test]
    fn stale_row_is_offline_even_when_flagged_online() {
        let now = Utc::now();
        assert!(!activity(true, ONLINE_FRESHNESS_SECS + 1).online_now(now));
    }

    #[test]
    fn typing_requires_matching_room_and_freshness() {
        let now = Utc::now();
        let room = Uuid::new_v4();

        let mut a = activity(true, 5);
        a.is_typing = true;
        a.typing_room_id = Some(room);
        assert!(a.typing_in(room, now));
        assert!(!a.typing_in(Uuid::new_v4(), now));

        a.last_seen = Utc::now() - Duration::seconds(ONLINE_FRESHNESS_SECS + 1);
        assert!(!a.typing_in(room, now));
    }
}
