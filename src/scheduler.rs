//! Outgoing update scheduling
//!
//! Rate-limits local change notifications before they become `STATE_UPDATE`
//! traffic. Throttle caps frequency (at most one emission per interval, with
//! a leading emission when idle); debounce waits for quiescence. Exactly one
//! discipline is active at a time; throttle takes precedence when both are
//! configured. Newer changes inside a window overwrite the queued payload
//! per key rather than stacking (latest-value semantics).
//!
//! The scheduler is deliberately time-free: callers pass `now` in and drive
//! the emission deadline themselves, which keeps every path testable without
//! sleeping.

use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::protocol::StateMap;

/// Which rate-limiting discipline is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// No rate limiting: every offered change emits immediately
    Immediate,
    /// At most one emission per interval
    Throttle(Duration),
    /// Emit only after an interval of silence
    Debounce(Duration),
}

pub struct SyncScheduler {
    mode: ScheduleMode,
    /// Changes queued for the next emission, latest value per key
    pending: Option<StateMap>,
    deadline: Option<Instant>,
    /// Throttle only: when the last emission happened
    last_emit: Option<Instant>,
}

impl SyncScheduler {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            pending: None,
            deadline: None,
            last_emit: None,
        }
    }

    /// Throttle wins over debounce when both are configured
    pub fn from_config(config: &SyncConfig) -> Self {
        let mode = match (config.throttle, config.debounce) {
            (Some(interval), _) => ScheduleMode::Throttle(interval),
            (None, Some(interval)) => ScheduleMode::Debounce(interval),
            (None, None) => ScheduleMode::Immediate,
        };
        Self::new(mode)
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Offer a changed-keys snapshot. Returns a payload to emit right now
    /// (leading edge), or queues it for `take_due` at `next_deadline`.
    pub fn offer(&mut self, changed: StateMap, now: Instant) -> Option<StateMap> {
        if changed.is_empty() {
            return None;
        }
        match self.mode {
            ScheduleMode::Immediate => Some(changed),
            ScheduleMode::Throttle(interval) => {
                let window_open = self
                    .last_emit
                    .map_or(true, |at| now.duration_since(at) >= interval);
                if window_open && self.pending.is_none() {
                    self.last_emit = Some(now);
                    Some(changed)
                } else {
                    self.queue(changed);
                    let base = self.last_emit.unwrap_or(now);
                    self.deadline = Some(base + interval);
                    None
                }
            }
            ScheduleMode::Debounce(interval) => {
                self.queue(changed);
                self.deadline = Some(now + interval);
                None
            }
        }
    }

    /// Next instant at which `take_due` would yield a payload
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.pending.is_some() {
            self.deadline
        } else {
            None
        }
    }

    /// Emit the queued payload if its deadline has passed
    pub fn take_due(&mut self, now: Instant) -> Option<StateMap> {
        let deadline = self.next_deadline()?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        if matches!(self.mode, ScheduleMode::Throttle(_)) {
            self.last_emit = Some(now);
        }
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any queued payload (used on shutdown)
    pub fn clear(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    fn queue(&mut self, changed: StateMap) {
        let pending = self.pending.get_or_insert_with(StateMap::new);
        for (key, value) in changed {
            pending.insert(key, value);
        }
    }
}
