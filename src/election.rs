//! Leader election
//!
//! A timestamp-ordinal min-comparison election: every peer broadcasts its
//! start priority, collects candidacies for a short window, and then each
//! peer independently picks the lowest `(priority, peer_id)` pair it has
//! observed, itself included. No consensus round-trip is needed and the
//! outcome self-stabilizes under message loss, at the cost of only eventual
//! agreement during overlapping elections. Leadership here only gates
//! optional coordination work, never state-sync correctness.
//!
//! The elector is a pure state machine: the coordinator loop owns every
//! timer (window close, heartbeat send, silence watchdog) and calls in.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::PeerId;

/// Where this peer currently stands in the election protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderRole {
    Unknown,
    Electing,
    Leader,
    Follower,
}

/// Snapshot of the elector's view, read by consumers via `is_leader()`
#[derive(Debug, Clone)]
pub struct LeaderState {
    pub current_leader_id: Option<PeerId>,
    pub self_priority: i64,
    pub last_heartbeat_at: Option<Instant>,
    pub role: LeaderRole,
}

/// Result of closing an election window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionOutcome {
    pub leader_id: PeerId,
    pub is_self: bool,
}

pub struct LeaderElector {
    local_peer_id: PeerId,
    self_priority: i64,
    heartbeat_interval: Duration,
    /// Set by `force_leader()`; a forced leader announces with the minimum
    /// possible priority so other peers deterministically yield
    forced: bool,
    role: LeaderRole,
    current_leader_id: Option<PeerId>,
    last_heartbeat_at: Option<Instant>,
    /// Candidacies observed during the current window
    candidates: HashMap<PeerId, i64>,
}

impl LeaderElector {
    pub fn new(local_peer_id: &str, self_priority: i64, heartbeat_interval: Duration) -> Self {
        Self {
            local_peer_id: local_peer_id.to_string(),
            self_priority,
            heartbeat_interval,
            forced: false,
            role: LeaderRole::Unknown,
            current_leader_id: None,
            last_heartbeat_at: None,
            candidates: HashMap::new(),
        }
    }

    /// The priority this peer competes (and announces) with
    pub fn effective_priority(&self) -> i64 {
        if self.forced {
            i64::MIN
        } else {
            self.self_priority
        }
    }

    /// Open a new election window with this peer as the first candidate
    pub fn begin_election(&mut self) {
        self.role = LeaderRole::Electing;
        self.candidates.clear();
        self.candidates
            .insert(self.local_peer_id.clone(), self.effective_priority());
    }

    /// Record a `LEADER_ELECTION` candidacy observed during the window
    pub fn record_candidate(&mut self, peer_id: &str, priority: i64) {
        self.candidates
            .entry(peer_id.to_string())
            .and_modify(|p| *p = (*p).min(priority))
            .or_insert(priority);
    }

    /// Close the window: the lowest `(priority, peer_id)` pair observed wins.
    /// Every peer computes this independently from the same observed set.
    pub fn close_window(&mut self, now: Instant) -> ElectionOutcome {
        let winner = self
            .candidates
            .iter()
            .min_by(|(id_a, prio_a), (id_b, prio_b)| (prio_a, id_a).cmp(&(prio_b, id_b)))
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| self.local_peer_id.clone());

        let is_self = winner == self.local_peer_id;
        self.current_leader_id = Some(winner.clone());
        if is_self {
            self.role = LeaderRole::Leader;
        } else {
            self.role = LeaderRole::Follower;
            // Grace period: the watchdog starts counting from the window
            // close, not from before the leader ever had a chance to beat
            self.last_heartbeat_at = Some(now);
        }
        debug!(
            "Election window closed: leader={} (self={})",
            winner, is_self
        );
        ElectionOutcome {
            leader_id: winner,
            is_self,
        }
    }

    /// Record a `HEARTBEAT` from a peer
    pub fn record_heartbeat(&mut self, peer_id: &str, now: Instant) {
        match &self.current_leader_id {
            Some(leader) if leader == peer_id => {
                self.last_heartbeat_at = Some(now);
            }
            None if self.role != LeaderRole::Leader => {
                // No known leader yet: a heartbeat can only come from one
                self.current_leader_id = Some(peer_id.to_string());
                self.last_heartbeat_at = Some(now);
                if self.role == LeaderRole::Unknown {
                    self.role = LeaderRole::Follower;
                }
            }
            _ => {}
        }
    }

    /// Handle a `LEADER_ANNOUNCE` for `leader_id` carrying the announcer's
    /// priority. Returns true when the announced leader was adopted.
    pub fn adopt_announce(
        &mut self,
        leader_id: &str,
        priority: Option<i64>,
        now: Instant,
    ) -> bool {
        if leader_id == self.local_peer_id {
            // Someone repeating our own leadership back at us
            return false;
        }
        let announced_priority = priority.unwrap_or(i64::MIN);

        match self.role {
            LeaderRole::Leader => {
                // Overlapping elections or a forced override elsewhere:
                // yield only to a strictly better pair, so both sides land
                // on the same answer
                let theirs = (announced_priority, leader_id);
                let ours = (self.effective_priority(), self.local_peer_id.as_str());
                if theirs < ours {
                    self.role = LeaderRole::Follower;
                    self.forced = false;
                    self.current_leader_id = Some(leader_id.to_string());
                    self.last_heartbeat_at = Some(now);
                    true
                } else {
                    false
                }
            }
            LeaderRole::Electing => {
                // Keep the window open; the announcer competes like any
                // candidate and the recomputation stays deterministic
                self.record_candidate(leader_id, announced_priority);
                self.current_leader_id = Some(leader_id.to_string());
                self.last_heartbeat_at = Some(now);
                true
            }
            LeaderRole::Follower | LeaderRole::Unknown => {
                self.role = LeaderRole::Follower;
                self.current_leader_id = Some(leader_id.to_string());
                self.last_heartbeat_at = Some(now);
                true
            }
        }
    }

    /// A follower that has heard nothing from its leader for twice the
    /// heartbeat interval treats it as lost and must re-elect
    pub fn leader_lost(&self, now: Instant) -> bool {
        if self.role != LeaderRole::Follower {
            return false;
        }
        match self.last_heartbeat_at {
            Some(at) => now.duration_since(at) > self.heartbeat_interval * 2,
            None => true,
        }
    }

    /// Unconditionally declare this peer leader (manual override). Another
    /// peer may momentarily disagree until its next heartbeat timeout.
    pub fn force_leader(&mut self) {
        self.forced = true;
        self.role = LeaderRole::Leader;
        self.current_leader_id = Some(self.local_peer_id.clone());
    }

    pub fn is_leader(&self) -> bool {
        self.role == LeaderRole::Leader
    }

    pub fn role(&self) -> LeaderRole {
        self.role
    }

    pub fn current_leader(&self) -> Option<&str> {
        self.current_leader_id.as_deref()
    }

    pub fn state(&self) -> LeaderState {
        LeaderState {
            current_leader_id: self.current_leader_id.clone(),
            self_priority: self.self_priority,
            last_heartbeat_at: self.last_heartbeat_at,
            role: self.role,
        }
    }
}
