//! Peer channel abstraction
//!
//! The synchronizer never talks to a concrete transport directly; it only
//! assumes a broadcast medium with no ordering or delivery guarantee. Any
//! same-origin fan-out (browser broadcast primitive, UNIX socket fan-out,
//! local pub/sub topic) can implement `PeerChannel`.
//!
//! `LocalChannel` is the in-process reference transport: every channel with
//! the same name inside the process shares one fan-out, which is also what
//! the integration tests run on. `UnsupportedChannel` models an unavailable
//! medium; the coordinator degrades to a leader of one without erroring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tokio::sync::broadcast;
use tracing::debug;

/// Frames buffered per subscriber before the oldest are dropped. Losing
/// frames is acceptable: delivery is at-most-once by contract.
const CHANNEL_CAPACITY: usize = 256;

/// Abstract broadcast medium connecting co-located peers.
///
/// `send` is fire-and-forget with no delivery confirmation. Subscribers may
/// receive frames with arbitrary delay, duplication, or loss. Channels that
/// echo a send back to the sender are allowed; the router filters loopback.
pub trait PeerChannel: Send + Sync {
    /// Broadcast a raw frame to every peer on the channel
    fn send(&self, raw: Vec<u8>);

    /// Subscribe to frames from other peers
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Whether the underlying medium is available at all
    fn is_supported(&self) -> bool;

    /// Tear down; subsequent sends become no-ops
    fn close(&self);
}

/// Process-global fan-out registry: one broadcast sender per channel name
static CHANNELS: Lazy<Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// In-process broadcast transport keyed by channel name
pub struct LocalChannel {
    name: String,
    tx: broadcast::Sender<Vec<u8>>,
    closed: AtomicBool,
}

impl LocalChannel {
    /// Join (or create) the process-wide channel with this name.
    ///
    /// The registry entry lives until some handle for the name is closed
    /// while no subscriber remains; hosts cycling through many names should
    /// close their handles.
    pub fn connect(name: &str) -> Self {
        let tx = {
            let mut channels = CHANNELS.lock().unwrap();
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .clone()
        };
        Self {
            name: name.to_string(),
            tx,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PeerChannel for LocalChannel {
    fn send(&self, raw: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // No subscribers is not an error: fire-and-forget
        if let Err(e) = self.tx.send(raw) {
            debug!("Channel '{}' has no subscribers: {}", self.name, e);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.tx.subscribe()
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Release the registry entry once nobody listens on the name, so
        // hosts cycling through many channel names do not accumulate senders
        let mut channels = CHANNELS.lock().unwrap();
        if let Some(tx) = channels.get(&self.name) {
            if tx.receiver_count() == 0 {
                channels.remove(&self.name);
            }
        }
    }
}

/// Stand-in for an unavailable medium: every operation is a no-op and
/// `is_supported()` reports false
pub struct UnsupportedChannel {
    // Kept alive so subscribers pend forever instead of observing a close
    tx: broadcast::Sender<Vec<u8>>,
}

impl UnsupportedChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }
}

impl Default for UnsupportedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerChannel for UnsupportedChannel {
    fn send(&self, _raw: Vec<u8>) {}

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.tx.subscribe()
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn close(&self) {}
}
