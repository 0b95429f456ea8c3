//! Wire message types for the push channel.
//!
//! Messages are internally-tagged JSON (`{"type": "connected", ...}`). The
//! channel is server-push dominated; the only meaningful inbound message is
//! the liveness ping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of state change behind a push notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MedicationCreated,
    MedicationUpdated,
    MedicationDeleted,
    MedicationTaken,
    Reminder,
}

/// A server-side state change fanned out to a user's live connections.
///
/// Clients treat these as invalidation hints and re-fetch current state;
/// the payload is a convenience, not an authoritative delta.
#[derive(Debug, Clone, Serialize)]
pub struct PushEvent {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<sonic_rs::Value>,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Messages sent from the server to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame after a successful upgrade, carrying the resolved user.
    Connected { uid: Uuid, timestamp: DateTime<Utc> },

    /// Response to a client ping.
    Pong,

    /// A state change for the authenticated user.
    Event {
        uid: Uuid,
        data: PushEvent,
        timestamp: DateTime<Utc>,
    },

    /// System-wide notice, delivered to every connection.
    Notice { data: String, timestamp: DateTime<Utc> },
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Messages accepted from clients. Anything that does not parse into this
/// enum is ignored, not an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness ping.
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_frame_carries_type_uid_and_timestamp() {
        let uid = Uuid::new_v4();
        let msg = ServerMessage::Connected {
            uid,
            timestamp: Utc::now(),
        };
        let text = sonic_rs::to_string(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["uid"], uid.to_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn event_frame_nests_kind_under_data() {
        let msg = ServerMessage::Event {
            uid: Uuid::new_v4(),
            data: PushEvent {
                kind: EventKind::MedicationUpdated,
                payload: None,
            },
            timestamp: Utc::now(),
        };
        let text = sonic_rs::to_string(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["data"]["kind"], "medication_updated");
        assert!(value["data"].get("payload").is_none());
    }

    #[test]
    fn ping_parses_and_junk_does_not() {
        assert!(matches!(
            sonic_rs::from_str::<ClientMessage>(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        ));
        assert!(sonic_rs::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
        assert!(sonic_rs::from_str::<ClientMessage>("not json").is_err());
    }
}
