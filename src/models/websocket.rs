use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events a client may send on the room channel. The notification channel
/// defines no client-originated events at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatMessage { message: String },
    MessageRead { message_id: Uuid },
    TypingStart,
    TypingStop,
}

/// Frames pushed to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionEstablished {
        message: String,
    },
    /// One per history item, replayed on join.
    ExistingMessage {
        message: String,
        sender_id: Uuid,
        sender_name: String,
        timestamp: DateTime<Utc>,
        message_id: Uuid,
        delivered: bool,
        read: bool,
        is_own_message: bool,
    },
    NewMessage {
        message: String,
        sender_id: Uuid,
        sender_name: String,
        timestamp: DateTime<Utc>,
        message_id: Uuid,
        delivered: bool,
        read: bool,
        is_own_message: bool,
    },
    UserStatus {
        user_id: Uuid,
        username: String,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    },
    MessageRead {
        message_id: Uuid,
        read_by_user_id: Uuid,
        read_by_username: String,
        read_at: DateTime<Utc>,
    },
    TypingStatus {
        user_id: Uuid,
        username: String,
        is_typing: bool,
    },
    UnreadCountUpdate {
        unread_count: i64,
    },
}

/// An event published into a broadcast group. Delivery is personalized:
/// the router maps each event through [`GroupEvent::for_viewer`] per member.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    NewMessage {
        message_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        body: String,
        timestamp: DateTime<Utc>,
        delivered: bool,
        read: bool,
    },
    UserStatus {
        user_id: Uuid,
        username: String,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    },
    MessageRead {
        message_id: Uuid,
        /// Sender of the original message; the receipt is delivered to them only.
        message_sender_id: Uuid,
        read_by_user_id: Uuid,
        read_by_username: String,
        read_at: DateTime<Utc>,
    },
    Typing {
        user_id: Uuid,
        username: String,
        is_typing: bool,
    },
    UnreadCount {
        unread_count: i64,
    },
}

impl GroupEvent {
    /// Maps a group event to the frame a given viewer should receive, or
    /// `None` when it is suppressed for them. A client never sees its own
    /// status or typing events; read receipts reach the original sender only.
    pub fn for_viewer(&self, viewer_id: Uuid) -> Option<ServerEvent> {
        match self {
            GroupEvent::NewMessage {
                message_id,
                sender_id,
                sender_name,
                body,
                timestamp,
                delivered,
                read,
            } => Some(ServerEvent::NewMessage {
                message: body.clone(),
                sender_id: *sender_id,
                sender_name: sender_name.clone(),
                timestamp: *timestamp,
                message_id: *message_id,
                delivered: *delivered,
                read: *read,
                is_own_message: *sender_id == viewer_id,
            }),
            GroupEvent::UserStatus {
                user_id,
                username,
                is_online,
                last_seen,
            } => {
                if *user_id == viewer_id {
                    return None;
                }
                Some(ServerEvent::UserStatus {
                    user_id: *user_id,
                    username: username.clone(),
                    is_online: *is_online,
                    last_seen: *last_seen,
                })
            }
            GroupEvent::MessageRead {
                message_id,
                message_sender_id,
                read_by_user_id,
                read_by_username,
                read_at,
            } => {
                if *message_sender_id != viewer_id {
                    return None;
                }
                Some(ServerEvent::MessageRead {
                    message_id: *message_id,
                    read_by_user_id: *read_by_user_id,
                    read_by_username: read_by_username.clone(),
                    read_at: *read_at,
                })
            }
            GroupEvent::Typing {
                user_id,
                username,
                is_typing,
            } => {
                if *user_id == viewer_id {
                    return None;
                }
                Some(ServerEvent::TypingStatus {
                    user_id: *user_id,
                    username: username.clone(),
                    is_typing: *is_typing,
                })
            }
            GroupEvent::UnreadCount { unread_count } => Some(ServerEvent::UnreadCountUpdate {
                unread_count: *unread_count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_by_tag() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type": "chat_message", "message": "hi"}"#).unwrap();
        assert!(matches!(event, ClientEvent::ChatMessage { message } if message == "hi"));

        let id = Uuid::new_v4();
        let event: ClientEvent = serde_json::from_str(&format!(
            r#"{{"type": "message_read", "message_id": "{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(event, ClientEvent::MessageRead { message_id } if message_id == id));

        assert!(matches!(
            serde_json::from_str::<ClientEvent>(r#"{"type": "typing_start"}"#).unwrap(),
            ClientEvent::TypingStart
        ));
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(r#"{"type": "typing_stop"}"#).unwrap(),
            ClientEvent::TypingStop
        ));
    }

    #[test]
    fn unknown_client_event_kind_is_an_error() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type": "ping"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"message": "no type"}"#).is_err());
    }

    #[test]
    fn server_frames_carry_expected_tags() {
        let frame = ServerEvent::UnreadCountUpdate { unread_count: 3 };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["type"], "unread_count_update");
        assert_eq!(json["unread_count"], 3);

        let frame = ServerEvent::ConnectionEstablished {
            message: "connected".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["type"], "connection_established");
    }

    fn new_message(sender_id: Uuid) -> GroupEvent {
        GroupEvent::NewMessage {
            message_id: Uuid::new_v4(),
            sender_id,
            sender_name: "alice".to_string(),
            body: "hello".to_string(),
            timestamp: Utc::now(),
            delivered: true,
            read: false,
        }
    }

    #[test]
    fn messages_reach_everyone_with_per_viewer_ownership() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let event = new_message(sender);

        match event.for_viewer(sender) {
            Some(ServerEvent::NewMessage { is_own_message, .. }) => assert!(is_own_message),
            other => panic!("unexpected frame: {other:?}"),
        }
        match event.for_viewer(other) {
            Some(ServerEvent::NewMessage { is_own_message, .. }) => assert!(!is_own_message),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn own_status_and_typing_are_suppressed() {
        let me = Uuid::new_v4();
        let status = GroupEvent::UserStatus {
            user_id: me,
            username: "alice".to_string(),
            is_online: true,
            last_seen: Some(Utc::now()),
        };
        assert!(status.for_viewer(me).is_none());
        assert!(status.for_viewer(Uuid::new_v4()).is_some());

        let typing = GroupEvent::Typing {
            user_id: me,
            username: "alice".to_string(),
            is_typing: true,
        };
        assert!(typing.for_viewer(me).is_none());
        assert!(typing.for_viewer(Uuid::new_v4()).is_some());
    }

    #[test]
    fn read_receipts_reach_only_the_original_sender() {
        let sender = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let receipt = GroupEvent::MessageRead {
            message_id: Uuid::new_v4(),
            message_sender_id: sender,
            read_by_user_id: reader,
            read_by_username: "bob".to_string(),
            read_at: Utc::now(),
        };
        assert!(receipt.for_viewer(sender).is_some());
        assert!(receipt.for_viewer(reader).is_none());
        assert!(receipt.for_viewer(Uuid::new_v4()).is_none());
    }
}
