//! Configuration for the sync coordinator
//!
//! A `SyncConfig` is immutable for the coordinator's lifetime. Everything is
//! optional except the channel name. Validation happens once at `start()`:
//! configuration mistakes are programmer errors and fail fast, unlike
//! peer-originated anomalies which are always absorbed at runtime.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::protocol::StateMap;
use crate::resolver::{ConflictStrategy, CustomResolverFn};

/// Predicate gating outgoing change notifications: `(prev, next) -> bool`.
/// Returning false drops the change entirely (not even queued).
pub type ShouldSyncFn = dyn Fn(&StateMap, &StateMap) -> bool + Send + Sync + 'static;

/// Immutable configuration held for the coordinator's lifetime
#[derive(Clone)]
pub struct SyncConfig {
    /// Name of the broadcast channel joining the peer group
    pub channel_name: String,
    /// Whitelist of keys to replicate; empty means every key
    pub sync_keys: Vec<String>,
    /// Blacklist of keys; always wins over `sync_keys` for a given key
    pub exclude_keys: Vec<String>,
    /// Emit at most one update per interval (latest-value semantics)
    pub throttle: Option<Duration>,
    /// Emit only after this much silence; ignored when throttle is set
    pub debounce: Option<Duration>,
    pub strategy: ConflictStrategy,
    pub custom_resolver: Option<Arc<CustomResolverFn>>,
    pub enable_leader_election: bool,
    /// Leader heartbeat period; a leader silent for twice this is lost
    pub heartbeat_interval: Duration,
    /// How long to collect `LEADER_ELECTION` candidacies before deciding
    pub election_window: Duration,
    /// Override for the peer start ordinal used as election priority
    pub election_priority: Option<i64>,
    /// Bound on the `Connecting` phase when no peers answer
    pub discovery_timeout: Duration,
    /// Rolling window for the approximate connected-peer count;
    /// defaults to three heartbeat intervals
    pub peer_window: Option<Duration>,
    pub should_sync: Option<Arc<ShouldSyncFn>>,
    /// Log discarded inbound frames at debug level
    pub debug: bool,
}

impl SyncConfig {
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            sync_keys: Vec::new(),
            exclude_keys: Vec::new(),
            throttle: None,
            debounce: None,
            strategy: ConflictStrategy::default(),
            custom_resolver: None,
            enable_leader_election: true,
            heartbeat_interval: Duration::from_secs(5),
            election_window: Duration::from_millis(300),
            election_priority: None,
            discovery_timeout: Duration::from_secs(1),
            peer_window: None,
            should_sync: None,
            debug: false,
        }
    }

    pub fn with_sync_keys(mut self, keys: &[&str]) -> Self {
        self.sync_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_exclude_keys(mut self, keys: &[&str]) -> Self {
        self.exclude_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_throttle(mut self, interval: Duration) -> Self {
        self.throttle = Some(interval);
        self
    }

    pub fn with_debounce(mut self, interval: Duration) -> Self {
        self.debounce = Some(interval);
        self
    }

    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_custom_resolver(mut self, resolver: Arc<CustomResolverFn>) -> Self {
        self.strategy = ConflictStrategy::Custom;
        self.custom_resolver = Some(resolver);
        self
    }

    pub fn with_leader_election(mut self, enabled: bool) -> Self {
        self.enable_leader_election = enabled;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_election_window(mut self, window: Duration) -> Self {
        self.election_window = window;
        self
    }

    pub fn with_election_priority(mut self, priority: i64) -> Self {
        self.election_priority = Some(priority);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_peer_window(mut self, window: Duration) -> Self {
        self.peer_window = Some(window);
        self
    }

    pub fn with_should_sync(mut self, predicate: Arc<ShouldSyncFn>) -> Self {
        self.should_sync = Some(predicate);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the configuration; called once at `start()`
    pub fn validate(&self) -> SyncResult<()> {
        if self.channel_name.is_empty() {
            return Err(SyncError::InvalidConfig(
                "channel name is empty".to_string(),
            ));
        }
        if self.strategy == ConflictStrategy::Custom && self.custom_resolver.is_none() {
            return Err(SyncError::InvalidConfig(
                "conflict strategy 'custom' requires a resolver function".to_string(),
            ));
        }
        if self.throttle.is_some_and(|d| d.is_zero()) {
            return Err(SyncError::InvalidConfig(
                "throttle interval must be greater than zero".to_string(),
            ));
        }
        if self.debounce.is_some_and(|d| d.is_zero()) {
            return Err(SyncError::InvalidConfig(
                "debounce interval must be greater than zero".to_string(),
            ));
        }
        if self.enable_leader_election {
            if self.heartbeat_interval.is_zero() {
                return Err(SyncError::InvalidConfig(
                    "heartbeat interval must be greater than zero".to_string(),
                ));
            }
            if self.election_window.is_zero() {
                return Err(SyncError::InvalidConfig(
                    "election window must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether a key participates in replication. Exclusion always wins.
    pub fn allows_key(&self, key: &str) -> bool {
        if self.exclude_keys.iter().any(|k| k == key) {
            return false;
        }
        self.sync_keys.is_empty() || self.sync_keys.iter().any(|k| k == key)
    }

    /// The whitelist minus the blacklist; empty means every non-excluded key
    pub fn allowed_keys(&self) -> Vec<String> {
        self.sync_keys
            .iter()
            .filter(|k| self.allows_key(k))
            .cloned()
            .collect()
    }

    /// Drop keys that are not allowed to cross the channel
    pub fn filter_state(&self, state: StateMap) -> StateMap {
        state
            .into_iter()
            .filter(|(key, _)| self.allows_key(key))
            .collect()
    }

    pub fn effective_peer_window(&self) -> Duration {
        self.peer_window.unwrap_or(self.heartbeat_interval * 3)
    }
}
