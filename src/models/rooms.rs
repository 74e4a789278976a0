use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::users::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "participant_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Investor,
    Entrepreneur,
    Admin,
}

impl ParticipantRole {
    pub fn label(&self) -> &'static str {
        match self {
            ParticipantRole::Investor => "Investor",
            ParticipantRole::Entrepreneur => "Entrepreneur",
            ParticipantRole::Admin => "Administrator",
        }
    }
}

/// Role tag derived from the account flags. Staff outranks investor status:
/// an admin pairing never counts as an investor/entrepreneur match.
pub fn role_of(user: &User) -> ParticipantRole {
    if user.is_staff {
        ParticipantRole::Admin
    } else if user.is_investor {
        ParticipantRole::Investor
    } else {
        ParticipantRole::Entrepreneur
    }
}

/// A persisted two-party conversation. The two participant slots hold an
/// unordered pair; at most one room exists per pair (per related pitch).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub participant_1: Uuid,
    pub participant_2: Uuid,
    pub participant_1_role: ParticipantRole,
    pub participant_2_role: ParticipantRole,
    pub related_pitch_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant_1 == user_id || self.participant_2 == user_id
    }

    /// The single access-control resolution used by every call site
    /// (connection admission, history fetch, send, typing). Returns the
    /// other participant and their role, or `None` when the requester does
    /// not belong to this room.
    pub fn other_participant(&self, user_id: Uuid) -> Option<(Uuid, ParticipantRole)> {
        if self.participant_1 == user_id {
            Some((self.participant_2, self.participant_2_role))
        } else if self.participant_2 == user_id {
            Some((self.participant_1, self.participant_1_role))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_investor: bool, is_staff: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            is_investor,
            is_staff,
            created_at: Utc::now(),
        }
    }

    fn room(p1: Uuid, p2: Uuid) -> ChatRoom {
        ChatRoom {
            id: Uuid::new_v4(),
            participant_1: p1,
            participant_2: p2,
            participant_1_role: ParticipantRole::Investor,
            participant_2_role: ParticipantRole::Entrepreneur,
            related_pitch_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn role_tags_follow_account_flags() {
        assert_eq!(role_of(&user(true, false)), ParticipantRole::Investor);
        assert_eq!(role_of(&user(false, false)), ParticipantRole::Entrepreneur);
        assert_eq!(role_of(&user(false, true)), ParticipantRole::Admin);
        // Staff wins over the investor flag
        assert_eq!(role_of(&user(true, true)), ParticipantRole::Admin);
    }

    #[test]
    fn other_participant_resolves_both_slots() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let room = room(a, b);

        assert!(room.is_participant(a));
        assert!(room.is_participant(b));

        let (other, role) = room.other_participant(a).unwrap();
        assert_eq!(other, b);
        assert_eq!(role, ParticipantRole::Entrepreneur);

        let (other, role) = room.other_participant(b).unwrap();
        assert_eq!(other, a);
        assert_eq!(role, ParticipantRole::Investor);
    }

    #[test]
    fn outsider_is_denied() {
        let room = room(Uuid::new_v4(), Uuid::new_v4());
        let stranger = Uuid::new_v4();
        assert!(!room.is_participant(stranger));
        assert!(room.other_participant(stranger).is_none());
    }
}
