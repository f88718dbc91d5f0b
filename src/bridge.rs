//! State bridge
//!
//! The only point of contact with the application's state store. The store
//! implements `StateBridge` (extract the synchronized subset, apply a merged
//! partial) and pushes local transitions to the coordinator through a
//! `StateChangeNotifier`, which funnels all mutation through the
//! coordinator's single event loop.

use std::sync::RwLock;

use tokio::sync::mpsc;

use crate::protocol::StateMap;

/// Contract implemented by the real application state store
pub trait StateBridge: Send + Sync {
    /// Extract the synchronized subset of the current state.
    /// An empty key list means every key.
    fn extract_syncable(&self, keys: &[String]) -> StateMap;

    /// Apply a merged partial state. Must be idempotent: applying the same
    /// partial twice yields the same state as applying it once.
    fn apply(&self, partial: &StateMap);
}

/// A local state transition as reported by the host
#[derive(Debug, Clone)]
pub struct StateChange {
    pub prev: StateMap,
    pub next: StateMap,
}

/// Handle for pushing local state transitions into the coordinator loop.
/// Cheap to clone; delivery is fire-and-forget.
#[derive(Clone)]
pub struct StateChangeNotifier {
    tx: mpsc::Sender<StateChange>,
}

impl StateChangeNotifier {
    pub(crate) fn new(tx: mpsc::Sender<StateChange>) -> Self {
        Self { tx }
    }

    /// Report a transition. Changes offered after `stop()` are dropped.
    pub fn notify(&self, prev: StateMap, next: StateMap) {
        let _ = self.tx.try_send(StateChange { prev, next });
    }
}

/// In-memory `StateBridge` backed by a flat key/value map, used by tests
/// and demos
#[derive(Default)]
pub struct MemoryStateBridge {
    state: RwLock<StateMap>,
}

impl MemoryStateBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StateMap) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Set one key, returning the (prev, next) snapshots to hand to a
    /// `StateChangeNotifier`
    pub fn set(&self, key: &str, value: serde_json::Value) -> (StateMap, StateMap) {
        let mut state = self.state.write().unwrap();
        let prev = state.clone();
        state.insert(key.to_string(), value);
        (prev, state.clone())
    }

    pub fn snapshot(&self) -> StateMap {
        self.state.read().unwrap().clone()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().unwrap().get(key).cloned()
    }
}

impl StateBridge for MemoryStateBridge {
    fn extract_syncable(&self, keys: &[String]) -> StateMap {
        let state = self.state.read().unwrap();
        if keys.is_empty() {
            return state.clone();
        }
        keys.iter()
            .filter_map(|key| state.get(key).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    fn apply(&self, partial: &StateMap) {
        let mut state = self.state.write().unwrap();
        for (key, value) in partial {
            state.insert(key.clone(), value.clone());
        }
    }
}
