//! Wire protocol for multi-peer state synchronization
//!
//! Messages are self-contained JSON frames broadcast to every peer on the
//! channel. There are no sequence numbers and no ordering assumption; every
//! handler must tolerate loss, duplication, and arbitrary delay.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A partial state snapshot: only the keys that changed are present.
pub type StateMap = Map<String, Value>;

/// Opaque identifier for one participant, unique for the lifetime of its
/// process and never reused after it exits.
pub type PeerId = String;

/// Generate a fresh peer id at startup.
pub fn generate_peer_id() -> PeerId {
    uuid::Uuid::new_v4().to_string()
}

/// Type of a sync protocol message (closed set)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Partial state snapshot of keys that changed locally
    StateUpdate,
    /// Ask every peer for its full synchronized snapshot
    StateRequest,
    /// Full snapshot reply to a `StateRequest`
    StateResponse,
    /// Election candidacy with the sender's priority
    LeaderElection,
    /// The elected leader declaring itself
    LeaderAnnounce,
    /// Discovery probe sent at startup
    PeerPing,
    /// Reply to a `PeerPing`
    PeerPong,
    /// Periodic leader liveness signal
    Heartbeat,
}

/// Optional message payload; which fields are present depends on the type
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<PeerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// A single protocol message exchanged between peers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub peer_id: PeerId,
    /// Wall-clock milliseconds at the sender; informational only
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SyncPayload>,
}

impl SyncMessage {
    pub fn new(message_type: MessageType, peer_id: &str) -> Self {
        Self {
            message_type,
            peer_id: peer_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: SyncPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Partial state snapshot of changed keys
    pub fn state_update(peer_id: &str, state: StateMap) -> Self {
        Self::new(MessageType::StateUpdate, peer_id).with_payload(SyncPayload {
            keys: Some(state.keys().cloned().collect()),
            state: Some(state),
            ..Default::default()
        })
    }

    pub fn state_request(peer_id: &str) -> Self {
        Self::new(MessageType::StateRequest, peer_id)
    }

    /// Full synchronized snapshot in reply to a request
    pub fn state_response(peer_id: &str, state: StateMap) -> Self {
        Self::new(MessageType::StateResponse, peer_id).with_payload(SyncPayload {
            keys: Some(state.keys().cloned().collect()),
            state: Some(state),
            ..Default::default()
        })
    }

    pub fn leader_election(peer_id: &str, priority: i64) -> Self {
        Self::new(MessageType::LeaderElection, peer_id).with_payload(SyncPayload {
            priority: Some(priority),
            ..Default::default()
        })
    }

    pub fn leader_announce(peer_id: &str, leader_id: &str, priority: i64) -> Self {
        Self::new(MessageType::LeaderAnnounce, peer_id).with_payload(SyncPayload {
            leader_id: Some(leader_id.to_string()),
            priority: Some(priority),
            ..Default::default()
        })
    }

    pub fn peer_ping(peer_id: &str) -> Self {
        Self::new(MessageType::PeerPing, peer_id)
    }

    pub fn peer_pong(peer_id: &str) -> Self {
        Self::new(MessageType::PeerPong, peer_id)
    }

    pub fn heartbeat(peer_id: &str) -> Self {
        Self::new(MessageType::Heartbeat, peer_id)
    }

    /// Encode message to a JSON frame
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Failed to serialize SyncMessage")
    }

    /// Decode message from a raw frame
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_round_trip() {
        let mut state = StateMap::new();
        state.insert("theme".to_string(), json!("dark"));

        let msg = SyncMessage::state_update("peer-1", state);
        let decoded = SyncMessage::decode(&msg.encode()).unwrap();

        assert_eq!(decoded.message_type, MessageType::StateUpdate);
        assert_eq!(decoded.peer_id, "peer-1");
        let payload = decoded.payload.unwrap();
        assert_eq!(payload.keys.unwrap(), vec!["theme".to_string()]);
        assert_eq!(payload.state.unwrap()["theme"], json!("dark"));
    }

    #[test]
    fn test_wire_field_names() {
        let msg = SyncMessage::leader_announce("peer-a", "peer-b", 42);
        let value: Value = serde_json::from_slice(&msg.encode()).unwrap();

        assert_eq!(value["type"], json!("LEADER_ANNOUNCE"));
        assert_eq!(value["peerId"], json!("peer-a"));
        assert_eq!(value["payload"]["leaderId"], json!("peer-b"));
        assert_eq!(value["payload"]["priority"], json!(42));
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_decode_accepts_missing_payload() {
        let raw = br#"{"type":"PEER_PING","peerId":"p1","timestamp":1}"#;
        let msg = SyncMessage::decode(raw).unwrap();
        assert_eq!(msg.message_type, MessageType::PeerPing);
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let raw = br#"{"type":"GOSSIP","peerId":"p1","timestamp":1}"#;
        assert!(SyncMessage::decode(raw).is_err());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let raw = br#"{"type":"HEARTBEAT","timestamp":1}"#;
        assert!(SyncMessage::decode(raw).is_err());

        let raw = br#"{"peerId":"p1","timestamp":1}"#;
        assert!(SyncMessage::decode(raw).is_err());
    }

    #[test]
    fn test_decode_tolerates_unknown_payload_fields() {
        let raw = br#"{"type":"HEARTBEAT","peerId":"p1","timestamp":1,"payload":{"priority":3,"extra":true}}"#;
        let msg = SyncMessage::decode(raw).unwrap();
        assert_eq!(msg.payload.unwrap().priority, Some(3));
    }

    #[test]
    fn test_generate_peer_id_unique() {
        let a = generate_peer_id();
        let b = generate_peer_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }
}
