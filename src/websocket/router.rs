use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::websocket::{GroupEvent, ServerEvent};

/// Broadcast group namespaces. The typed key keeps room groups and per-user
/// notification groups from ever colliding on a shared id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Room(Uuid),
    UserNotifications(Uuid),
}

struct GroupMember {
    user_id: Uuid,
    sender: UnboundedSender<ServerEvent>,
}

/// In-process pub-sub fan-out. Every session joins groups with its own
/// outbound channel; publishing hands the event to each member's channel and
/// returns without waiting for delivery. Dead members are pruned on the spot
/// and never surface an error to the publisher.
#[derive(Clone)]
pub struct GroupRouter {
    groups: Arc<DashMap<GroupKey, Arc<DashMap<Uuid, GroupMember>>>>,
}

impl GroupRouter {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(DashMap::new()),
        }
    }

    pub fn join(
        &self,
        group: GroupKey,
        connection_id: Uuid,
        user_id: Uuid,
        sender: UnboundedSender<ServerEvent>,
    ) {
        // Insert while the entry guard is held; a concurrent leave() dropping
        // the group's last member must not detach this map in between.
        self.groups
            .entry(group)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .insert(connection_id, GroupMember { user_id, sender });
    }

    pub fn leave(&self, group: GroupKey, connection_id: Uuid) {
        if let Some(members) = self.groups.get(&group) {
            members.remove(&connection_id);
            if members.is_empty() {
                drop(members);
                self.groups.remove_if(&group, |_, m| m.is_empty());
            }
        }
    }

    /// Fans an event out to every member of the group, personalized per
    /// viewer. Publishing to a group nobody joined is a no-op.
    pub fn publish(&self, group: GroupKey, event: GroupEvent) {
        let Some(members) = self.groups.get(&group).map(|m| m.clone()) else {
            return;
        };

        let mut dead = Vec::new();
        for member in members.iter() {
            let Some(frame) = event.for_viewer(member.user_id) else {
                continue;
            };
            if member.sender.send(frame).is_err() {
                dead.push(*member.key());
            }
        }
        for connection_id in dead {
            tracing::debug!(%connection_id, ?group, "pruning dead group member");
            members.remove(&connection_id);
        }
    }

    pub fn member_count(&self, group: GroupKey) -> usize {
        self.groups.get(&group).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for GroupRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc::unbounded_channel;

    fn message_from(sender_id: Uuid) -> GroupEvent {
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

    #[tokio::test]
    async fn publish_personalizes_per_member() {
        let router = GroupRouter::new();
        let room = GroupKey::Room(Uuid::new_v4());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_tx, mut alice_rx) = unbounded_channel();
        let (bob_tx, mut bob_rx) = unbounded_channel();
        router.join(room, Uuid::new_v4(), alice, alice_tx);
        router.join(room, Uuid::new_v4(), bob, bob_tx);

        router.publish(room, message_from(alice));

        match alice_rx.recv().await {
            Some(ServerEvent::NewMessage { is_own_message, .. }) => assert!(is_own_message),
            other => panic!("unexpected frame: {other:?}"),
        }
        match bob_rx.recv().await {
            Some(ServerEvent::NewMessage { is_own_message, .. }) => assert!(!is_own_message),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn room_and_notification_namespaces_do_not_collide() {
        let router = GroupRouter::new();
        let id = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (room_tx, mut room_rx) = unbounded_channel();
        router.join(GroupKey::Room(id), Uuid::new_v4(), user, room_tx);

        router.publish(
            GroupKey::UserNotifications(id),
            GroupEvent::UnreadCount { unread_count: 7 },
        );

        assert!(room_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_stops_delivery_and_drops_empty_groups() {
        let router = GroupRouter::new();
        let room = GroupKey::Room(Uuid::new_v4());
        let user = Uuid::new_v4();
        let connection = Uuid::new_v4();

        let (tx, mut rx) = unbounded_channel();
        router.join(room, connection, user, tx);
        assert_eq!(router.member_count(room), 1);

        router.leave(room, connection);
        assert_eq!(router.member_count(room), 0);

        router.publish(room, message_from(user));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_members_are_pruned_without_failing_the_publisher() {
        let router = GroupRouter::new();
        let room = GroupKey::Room(Uuid::new_v4());
        let sender = Uuid::new_v4();

        let (tx, rx) = unbounded_channel();
        router.join(room, Uuid::new_v4(), Uuid::new_v4(), tx);
        drop(rx);

        router.publish(room, message_from(sender));
        assert_eq!(router.member_count(room), 0);
    }

    #[tokio::test]
    async fn publish_to_unknown_group_is_a_noop() {
        let router = GroupRouter::new();
        router.publish(GroupKey::Room(Uuid::new_v4()), message_from(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn unread_count_push_reaches_user_notification_members() {
        let router = GroupRouter::new();
        let user = Uuid::new_v4();
        let group = GroupKey::UserNotifications(user);

        let (tx, mut rx) = unbounded_channel();
        router.join(group, Uuid::new_v4(), user, tx);

        router.publish(group, GroupEvent::UnreadCount { unread_count: 4 });

        match rx.recv().await {
            Some(ServerEvent::UnreadCountUpdate { unread_count }) => assert_eq!(unread_count, 4),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_after_last_member_left_still_receives() {
        let router = GroupRouter::new();
        let room = GroupKey::Room(Uuid::new_v4());
        let sender = Uuid::new_v4();

        let first = Uuid::new_v4();
        let (first_tx, _first_rx) = unbounded_channel();
        router.join(room, first, Uuid::new_v4(), first_tx);
        router.leave(room, first);

        let (second_tx, mut second_rx) = unbounded_channel();
        router.join(room, Uuid::new_v4(), Uuid::new_v4(), second_tx);

        router.publish(room, message_from(sender));
        assert!(matches!(
            second_rx.recv().await,
            Some(ServerEvent::NewMessage { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_last_leave_and_join_never_detaches_the_joiner() {
        let router = GroupRouter::new();
        let room = GroupKey::Room(Uuid::new_v4());
        let sender = Uuid::new_v4();

        for _ in 0..200 {
            let leaver = Uuid::new_v4();
            let (leaver_tx, _leaver_rx) = unbounded_channel();
            router.join(room, leaver, Uuid::new_v4(), leaver_tx);

            let joiner = Uuid::new_v4();
            let (joiner_tx, mut joiner_rx) = unbounded_channel();

            let leave_router = router.clone();
            let leave = tokio::spawn(async move {
                leave_router.leave(room, leaver);
            });
            let join_router = router.clone();
            let join = tokio::spawn(async move {
                join_router.join(room, joiner, Uuid::new_v4(), joiner_tx);
            });
            leave.await.unwrap();
            join.await.unwrap();

            // Whatever the interleaving, the joiner must be reachable. The
            // publish hands the frame over synchronously, so it is already
            // buffered here (or was lost, which is the failure).
            router.publish(room, message_from(sender));
            assert!(
                matches!(joiner_rx.try_recv(), Ok(ServerEvent::NewMessage { .. })),
                "joined member missed a broadcast"
            );

            router.leave(room, joiner);
        }
    }
}
