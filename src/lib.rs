//! peersync: multi-peer state synchronization over a broadcast medium
//!
//! Keeps a replicated key/value state set loosely consistent across
//! co-located peers (browser tabs, local processes) without a central server
//! and without any ordering guarantee from the transport.
//!
//! This crate provides:
//! - A self-contained JSON message protocol with no sequence numbers
//! - Leader election by priority min-comparison with heartbeats
//! - Pluggable conflict resolution (last/first-write-wins, deep merge,
//!   custom)
//! - Throttled or debounced outgoing update scheduling
//! - A coordinator that funnels all mutation through one event loop per peer
//!
//! Architecture:
//! - Peers share nothing but an abstract `PeerChannel` (at-most-once,
//!   unordered delivery; duplication tolerated via idempotent application)
//! - Consistency is eventual, achieved purely through repeated
//!   re-synchronization
//! - Peer-originated anomalies self-heal silently; only local
//!   misconfiguration surfaces, and only at `start()`

pub mod bridge;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod election;
pub mod error;
pub mod peers;
pub mod protocol;
pub mod resolver;
pub mod router;
pub mod scheduler;

// Re-export key types
pub use bridge::{MemoryStateBridge, StateBridge, StateChange, StateChangeNotifier};
pub use channel::{LocalChannel, PeerChannel, UnsupportedChannel};
pub use config::{ShouldSyncFn, SyncConfig};
pub use coordinator::{ConnectionState, SyncCoordinator, SyncStats};
pub use election::{ElectionOutcome, LeaderElector, LeaderRole, LeaderState};
pub use error::{SyncError, SyncResult};
pub use peers::PeerTracker;
pub use protocol::{generate_peer_id, MessageType, PeerId, StateMap, SyncMessage, SyncPayload};
pub use resolver::{ConflictResolver, ConflictStrategy, CustomResolverFn};
pub use router::{MessageRouter, RouterStats};
pub use scheduler::{ScheduleMode, SyncScheduler};
