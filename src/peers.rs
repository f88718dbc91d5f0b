//! Peer presence tracking
//!
//! There is no authoritative membership list on a broadcast medium, so the
//! connected-peer count is approximate by design: the distinct peer ids
//! observed within a recent rolling window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocol::PeerId;

pub struct PeerTracker {
    window: Duration,
    last_seen: HashMap<PeerId, Instant>,
}

impl PeerTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Record any inbound message from a peer
    pub fn observe(&mut self, peer_id: &str, now: Instant) {
        self.last_seen.insert(peer_id.to_string(), now);
    }

    /// Distinct peers seen within the rolling window
    pub fn connected_count(&self, now: Instant) -> usize {
        self.last_seen
            .values()
            .filter(|at| now.duration_since(**at) <= self.window)
            .count()
    }

    /// Peer ids currently inside the window
    pub fn connected_peers(&self, now: Instant) -> Vec<PeerId> {
        self.last_seen
            .iter()
            .filter(|(_, at)| now.duration_since(**at) <= self.window)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop entries that fell out of the window
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.last_seen
            .retain(|_, at| now.duration_since(*at) <= window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_count() {
        let mut tracker = PeerTracker::new(Duration::from_millis(100));
        let now = Instant::now();

        assert_eq!(tracker.connected_count(now), 0);

        tracker.observe("peer-a", now);
        tracker.observe("peer-b", now);
        // Re-observing the same peer does not double-count
        tracker.observe("peer-a", now);

        assert_eq!(tracker.connected_count(now), 2);
    }

    #[test]
    fn test_stale_peers_fall_out_of_window() {
        let mut tracker = PeerTracker::new(Duration::from_millis(100));
        let t0 = Instant::now();

        tracker.observe("peer-a", t0);
        tracker.observe("peer-b", t0 + Duration::from_millis(80));

        let later = t0 + Duration::from_millis(150);
        assert_eq!(tracker.connected_count(later), 1);
        assert_eq!(tracker.connected_peers(later), vec!["peer-b".to_string()]);
    }

    #[test]
    fn test_prune_removes_entries() {
        let mut tracker = PeerTracker::new(Duration::from_millis(50));
        let t0 = Instant::now();

        tracker.observe("peer-a", t0);
        tracker.prune(t0 + Duration::from_millis(100));

        assert_eq!(tracker.connected_count(t0 + Duration::from_millis(100)), 0);
        assert!(tracker.last_seen.is_empty());
    }

    #[test]
    fn test_reappearing_peer_counts_again() {
        let mut tracker = PeerTracker::new(Duration::from_millis(50));
        let t0 = Instant::now();

        tracker.observe("peer-a", t0);
        let later = t0 + Duration::from_millis(200);
        assert_eq!(tracker.connected_count(later), 0);

        tracker.observe("peer-a", later);
        assert_eq!(tracker.connected_count(later), 1);
    }
}
