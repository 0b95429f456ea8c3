//! In-memory registry of live push connections.
//!
//! Nothing here is persisted; the registry rebuilds empty on restart and
//! clients reconnect on their own. Shared across connection tasks and
//! handler tasks, so both maps are concurrent.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::realtime::message::{PushEvent, ServerMessage};

/// Unique identifier for a connection (server-generated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// One registered connection.
#[derive(Debug)]
struct ConnectionInfo {
    user_id: Uuid,
    sender: UnboundedSender<Message>,
    opened_at: DateTime<Utc>,
}

/// Maps authenticated users to their live push connections.
///
/// Primary storage is keyed by connection for O(1) registration/cleanup; the
/// secondary index is keyed by user for O(1) fan-out routing.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionInfo>,
    user_index: DashMap<Uuid, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Registers a connection for a user, creating the user's set if absent.
    pub fn register(&self, user_id: Uuid, sender: UnboundedSender<Message>) -> ConnectionId {
        let connection_id = ConnectionId::new();

        self.connections.insert(
            connection_id,
            ConnectionInfo {
                user_id,
                sender,
                opened_at: Utc::now(),
            },
        );

        self.user_index
            .entry(user_id)
            .or_default()
            .insert(connection_id);

        connection_id
    }

    /// Removes a connection. The emptied per-user set is removed in the same
    /// call, so no user entry outlives its last connection.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        if let Some((_, info)) = self.connections.remove(connection_id) {
            let user_id = info.user_id;

            if let Some(mut entry) = self.user_index.get_mut(&user_id) {
                entry.remove(connection_id);

                if entry.is_empty() {
                    drop(entry); // release the shard lock before removal
                    self.user_index.remove_if(&user_id, |_, set| set.is_empty());
                }
            }

            tracing::debug!(
                "Unregistered push connection for user {} (open {}s)",
                user_id,
                (Utc::now() - info.opened_at).num_seconds()
            );
        }
    }

    /// Fans an event out to every live connection of `user_id`.
    ///
    /// A user with no connections is a silent no-op; the mutation that
    /// triggered the notification has already succeeded and delivery is
    /// best-effort. The event is serialized once per call, and connections
    /// whose transport has gone away are skipped; their removal happens in
    /// the close path, not here.
    pub fn notify(&self, user_id: Uuid, event: PushEvent) {
        let Some(connection_ids) = self.user_index.get(&user_id) else {
            return;
        };

        let message = ServerMessage::Event {
            uid: user_id,
            data: event,
            timestamp: Utc::now(),
        };
        let text = match sonic_rs::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to serialize push event: {}", e);
                return;
            }
        };

        for connection_id in connection_ids.iter() {
            if let Some(info) = self.connections.get(connection_id) {
                if info.sender.send(Message::Text(text.clone().into())).is_err() {
                    tracing::warn!(
                        "Push connection for user {} is gone; skipping delivery",
                        user_id
                    );
                }
            }
        }
    }

    /// Delivers a system-wide notice to every registered connection.
    pub fn broadcast(&self, notice: &str) {
        let message = ServerMessage::Notice {
            data: notice.to_string(),
            timestamp: Utc::now(),
        };
        let text = match sonic_rs::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to serialize broadcast notice: {}", e);
                return;
            }
        };

        for entry in self.connections.iter() {
            if entry.value().sender.send(Message::Text(text.clone().into())).is_err() {
                tracing::warn!("Push connection is gone; skipping broadcast delivery");
            }
        }
    }

    /// The number of live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The number of users with at least one live connection.
    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::message::EventKind;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn event(kind: EventKind) -> PushEvent {
        PushEvent {
            kind,
            payload: None,
        }
    }

    fn recv_kind(rx: &mut UnboundedReceiver<Message>) -> Option<String> {
        let Ok(Message::Text(text)) = rx.try_recv() else {
            return None;
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        value["data"]["kind"].as_str().map(|s| s.to_string())
    }

    #[test]
    fn registered_connection_receives_notifications() {
        let registry = ConnectionRegistry::new();
        let uid = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = registry.register(uid, tx);
        registry.notify(uid, event(EventKind::MedicationCreated));
        assert_eq!(recv_kind(&mut rx).as_deref(), Some("medication_created"));

        registry.unregister(&id);
        registry.notify(uid, event(EventKind::MedicationDeleted));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn notify_for_unknown_user_is_a_silent_noop() {
        let registry = ConnectionRegistry::new();
        registry.notify(Uuid::new_v4(), event(EventKind::Reminder));
    }

    #[test]
    fn fan_out_reaches_every_connection_exactly_once() {
        let registry = ConnectionRegistry::new();
        let uid = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let c1 = registry.register(uid, tx1);
        registry.register(uid, tx2);

        registry.notify(uid, event(EventKind::MedicationUpdated));
        assert_eq!(recv_kind(&mut rx1).as_deref(), Some("medication_updated"));
        assert_eq!(recv_kind(&mut rx2).as_deref(), Some("medication_updated"));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());

        registry.unregister(&c1);
        registry.notify(uid, event(EventKind::MedicationUpdated));
        assert!(rx1.try_recv().is_err());
        assert_eq!(recv_kind(&mut rx2).as_deref(), Some("medication_updated"));
    }

    #[test]
    fn notifications_are_delivered_in_notify_order() {
        let registry = ConnectionRegistry::new();
        let uid = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(uid, tx);

        registry.notify(uid, event(EventKind::MedicationCreated));
        registry.notify(uid, event(EventKind::MedicationTaken));
        assert_eq!(recv_kind(&mut rx).as_deref(), Some("medication_created"));
        assert_eq!(recv_kind(&mut rx).as_deref(), Some("medication_taken"));
    }

    #[test]
    fn emptied_user_entries_are_pruned() {
        let registry = ConnectionRegistry::new();
        let uid = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let c1 = registry.register(uid, tx1);
        let c2 = registry.register(uid, tx2);
        assert_eq!(registry.user_count(), 1);
        assert_eq!(registry.connection_count(), 2);

        registry.unregister(&c1);
        assert_eq!(registry.user_count(), 1);

        registry.unregister(&c2);
        assert_eq!(registry.user_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(Uuid::new_v4(), tx);

        registry.unregister(&id);
        registry.unregister(&id);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn closed_transports_are_skipped_without_removal() {
        let registry = ConnectionRegistry::new();
        let uid = Uuid::new_v4();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();

        registry.register(uid, tx_dead);
        registry.register(uid, tx_live);
        drop(rx_dead);

        registry.notify(uid, event(EventKind::Reminder));
        assert_eq!(recv_kind(&mut rx_live).as_deref(), Some("reminder"));
        // removal stays with the close path
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn broadcast_reaches_all_users() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), tx1);
        registry.register(Uuid::new_v4(), tx2);

        registry.broadcast("maintenance window");

        for rx in [&mut rx1, &mut rx2] {
            let Ok(Message::Text(text)) = rx.try_recv() else {
                panic!("expected a broadcast frame");
            };
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["type"], "notice");
            assert_eq!(value["data"], "maintenance window");
        }
    }
}
