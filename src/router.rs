//! Inbound message routing
//!
//! Every raw frame off the channel passes through the router before a
//! handler sees it. Malformed payloads, unknown message types, and missing
//! required fields are discarded silently (logged only in debug mode): a
//! malicious or buggy peer must not be able to crash the others. Frames
//! carrying the local peer id are discarded too, which guards against
//! channels that echo sends back to the sender.

use tracing::debug;

use crate::protocol::SyncMessage;

/// Counters kept by the router for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub accepted: u64,
    pub discarded_malformed: u64,
    pub discarded_self: u64,
}

/// Parses and filters inbound frames for one peer
pub struct MessageRouter {
    local_peer_id: String,
    debug_log: bool,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new(local_peer_id: &str, debug_log: bool) -> Self {
        Self {
            local_peer_id: local_peer_id.to_string(),
            debug_log,
            stats: RouterStats::default(),
        }
    }

    /// Decode a raw frame, dropping anything malformed or self-originated.
    /// Never returns an error: peer-originated garbage is not an error here.
    pub fn accept(&mut self, raw: &[u8]) -> Option<SyncMessage> {
        let message = match SyncMessage::decode(raw) {
            Ok(m) => m,
            Err(e) => {
                self.stats.discarded_malformed += 1;
                if self.debug_log {
                    debug!("Discarding malformed frame: {}", e);
                }
                return None;
            }
        };

        if message.peer_id == self.local_peer_id {
            self.stats.discarded_self += 1;
            if self.debug_log {
                debug!("Discarding echoed frame from self");
            }
            return None;
        }

        self.stats.accepted += 1;
        Some(message)
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}
