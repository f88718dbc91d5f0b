//! Sync coordinator
//!
//! Owns the local view of the synchronized keys and orchestrates the other
//! components: local state changes flow in through the `StateChangeNotifier`,
//! inbound frames through the channel subscription, and both are funneled
//! into one sequential event loop per peer. Nothing is processed
//! concurrently within a peer, so no component below this needs locking.
//!
//! Handles:
//! - Startup discovery (`PEER_PING` + `STATE_REQUEST`)
//! - Leader election windows, heartbeats, and the silence watchdog
//! - Scheduled and out-of-band `STATE_UPDATE` emission
//! - Conflict resolution and idempotent state application

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{StateBridge, StateChange, StateChangeNotifier};
use crate::channel::PeerChannel;
use crate::config::SyncConfig;
use crate::election::{LeaderElector, LeaderRole};
use crate::error::{SyncError, SyncResult};
use crate::peers::PeerTracker;
use crate::protocol::{generate_peer_id, MessageType, PeerId, StateMap, SyncMessage};
use crate::resolver::ConflictResolver;
use crate::router::MessageRouter;
use crate::scheduler::SyncScheduler;

/// Connection lifecycle of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Channel open, first discovery round still in flight
    Connecting,
    Connected,
}

/// Counters for observability, readable at any time via `stats()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_discarded: u64,
    pub updates_applied: u64,
    pub conflicts_resolved: u64,
    pub elections_run: u64,
}

/// Leader view published by the event loop for lock-free-ish reads
#[derive(Debug, Clone)]
struct LeaderView {
    role: LeaderRole,
    leader_id: Option<PeerId>,
}

/// State shared between the public handle and the event loop
struct Shared {
    peer_id: PeerId,
    active: AtomicBool,
    connection: RwLock<ConnectionState>,
    leader: RwLock<LeaderView>,
    tracker: RwLock<PeerTracker>,
    stats: RwLock<SyncStats>,
}

/// Command sent from the public handle to the event loop
enum Command {
    BroadcastState(Option<Vec<String>>),
    RequestState,
    ForceLeader,
    Shutdown,
}

/// Public control surface of the synchronizer.
///
/// Explicitly constructed and owned by the caller; `start()` spawns the
/// event loop, `stop()` tears it down and guarantees no further callbacks.
pub struct SyncCoordinator {
    config: SyncConfig,
    bridge: Arc<dyn StateBridge>,
    channel: Arc<dyn PeerChannel>,
    shared: Arc<Shared>,
    command_tx: Option<mpsc::Sender<Command>>,
    change_tx: Option<mpsc::Sender<StateChange>>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        bridge: Arc<dyn StateBridge>,
        channel: Arc<dyn PeerChannel>,
    ) -> Self {
        let peer_id = generate_peer_id();
        let peer_window = config.effective_peer_window().max(Duration::from_millis(1));
        let shared = Arc::new(Shared {
            peer_id,
            active: AtomicBool::new(false),
            connection: RwLock::new(ConnectionState::Disconnected),
            leader: RwLock::new(LeaderView {
                role: LeaderRole::Unknown,
                leader_id: None,
            }),
            tracker: RwLock::new(PeerTracker::new(peer_window)),
            stats: RwLock::new(SyncStats::default()),
        });
        Self {
            config,
            bridge,
            channel,
            shared,
            command_tx: None,
            change_tx: None,
            task: None,
            stopped: false,
        }
    }

    /// Open the channel and spawn the event loop. Configuration mistakes
    /// fail here, before anything runs.
    pub fn start(&mut self) -> SyncResult<()> {
        if self.shared.active.load(Ordering::Acquire) {
            return Err(SyncError::AlreadyRunning);
        }
        if self.stopped {
            return Err(SyncError::InvalidConfig(
                "coordinator cannot be restarted; create a new instance".to_string(),
            ));
        }
        self.config.validate()?;
        let resolver = self
            .config
            .strategy
            .create_resolver(self.config.custom_resolver.clone())?;

        let supported = self.channel.is_supported();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (change_tx, change_rx) = mpsc::channel(256);
        let channel_rx = self.channel.subscribe();

        // Priority is a per-peer start ordinal: lower started earlier, ties
        // broken by peer id
        let priority = self
            .config
            .election_priority
            .unwrap_or_else(next_start_ordinal);
        let heartbeat_interval = if self.config.heartbeat_interval.is_zero() {
            Duration::from_secs(5)
        } else {
            self.config.heartbeat_interval
        };

        self.shared.active.store(true, Ordering::Release);
        *self.shared.connection.write().unwrap() = if supported {
            ConnectionState::Connecting
        } else {
            // Transport unavailable: leader of one, every send a no-op
            ConnectionState::Connected
        };
        if !supported {
            *self.shared.leader.write().unwrap() = LeaderView {
                role: LeaderRole::Leader,
                leader_id: Some(self.shared.peer_id.clone()),
            };
        }

        let event_loop = EventLoop {
            router: MessageRouter::new(&self.shared.peer_id, self.config.debug),
            elector: LeaderElector::new(&self.shared.peer_id, priority, heartbeat_interval),
            scheduler: SyncScheduler::from_config(&self.config),
            resolver,
            config: self.config.clone(),
            bridge: self.bridge.clone(),
            channel: self.channel.clone(),
            channel_rx,
            channel_open: supported,
            command_rx,
            change_rx,
            shared: self.shared.clone(),
            supported,
            heartbeat_interval,
            election_deadline: None,
            discovery_deadline: None,
        };
        self.task = Some(tokio::spawn(event_loop.run()));
        self.command_tx = Some(command_tx);
        self.change_tx = Some(change_tx);
        Ok(())
    }

    /// Tear down: close the channel, cancel every pending timer, and discard
    /// in-memory peer/leader state. No callback fires after this returns.
    pub async fn stop(&mut self) -> SyncResult<()> {
        let command_tx = self.command_tx.take().ok_or(SyncError::NotRunning)?;
        self.change_tx = None;
        let _ = command_tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.stopped = true;
        Ok(())
    }

    pub fn peer_id(&self) -> &str {
        &self.shared.peer_id
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.read().unwrap()
    }

    pub fn is_leader(&self) -> bool {
        self.shared.leader.read().unwrap().role == LeaderRole::Leader
    }

    pub fn leader_role(&self) -> LeaderRole {
        self.shared.leader.read().unwrap().role
    }

    pub fn current_leader(&self) -> Option<PeerId> {
        self.shared.leader.read().unwrap().leader_id.clone()
    }

    /// Approximate: distinct peer ids observed within the rolling window
    pub fn connected_peer_count(&self) -> usize {
        self.shared
            .tracker
            .read()
            .unwrap()
            .connected_count(Instant::now())
    }

    pub fn stats(&self) -> SyncStats {
        *self.shared.stats.read().unwrap()
    }

    /// Handle for the host to report local state transitions
    pub fn change_notifier(&self) -> SyncResult<StateChangeNotifier> {
        self.change_tx
            .clone()
            .map(StateChangeNotifier::new)
            .ok_or(SyncError::NotRunning)
    }

    /// Broadcast `STATE_REQUEST`; responses are merged as they arrive,
    /// first received first merged. Returns immediately.
    pub fn request_state(&self) -> SyncResult<()> {
        self.send_command(Command::RequestState)
    }

    /// Force an immediate out-of-band `STATE_UPDATE`, bypassing the
    /// scheduler. `keys` restricts the snapshot; `None` sends every
    /// synchronized key.
    pub fn broadcast_state(&self, keys: Option<&[String]>) -> SyncResult<()> {
        self.send_command(Command::BroadcastState(keys.map(|k| k.to_vec())))
    }

    /// Unconditionally declare this peer leader (manual override)
    pub fn force_leader(&self) -> SyncResult<()> {
        self.send_command(Command::ForceLeader)
    }

    fn send_command(&self, command: Command) -> SyncResult<()> {
        let tx = self.command_tx.as_ref().ok_or(SyncError::NotRunning)?;
        tx.try_send(command).map_err(|_| SyncError::ChannelClosed)
    }
}

/// The single sequential event loop of one peer
struct EventLoop {
    config: SyncConfig,
    bridge: Arc<dyn StateBridge>,
    channel: Arc<dyn PeerChannel>,
    channel_rx: broadcast::Receiver<Vec<u8>>,
    channel_open: bool,
    command_rx: mpsc::Receiver<Command>,
    change_rx: mpsc::Receiver<StateChange>,
    router: MessageRouter,
    elector: LeaderElector,
    scheduler: SyncScheduler,
    resolver: Arc<dyn ConflictResolver>,
    shared: Arc<Shared>,
    supported: bool,
    heartbeat_interval: Duration,
    election_deadline: Option<Instant>,
    discovery_deadline: Option<Instant>,
}

impl EventLoop {
    async fn run(mut self) {
        info!(
            "Starting sync coordinator {} on channel '{}'",
            self.shared.peer_id, self.config.channel_name
        );

        if self.supported {
            self.send_message(SyncMessage::peer_ping(&self.shared.peer_id));
            self.send_message(SyncMessage::state_request(&self.shared.peer_id));
            let now = Instant::now();
            self.discovery_deadline = Some(now + self.config.discovery_timeout);
            if self.config.enable_leader_election {
                self.start_election(now);
            }
        }

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut watchdog = tokio::time::interval(self.heartbeat_interval / 2);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let prune_period = self
            .config
            .effective_peer_window()
            .max(Duration::from_millis(1));
        let mut prune = tokio::time::interval(prune_period);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let timer_deadline = [
                self.election_deadline,
                self.discovery_deadline,
                self.scheduler.next_deadline(),
            ]
            .into_iter()
            .flatten()
            .min();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::BroadcastState(keys)) => {
                            self.broadcast_snapshot(keys.as_deref());
                        }
                        Some(Command::RequestState) => {
                            self.send_message(SyncMessage::state_request(&self.shared.peer_id));
                        }
                        Some(Command::ForceLeader) => self.handle_force_leader(),
                        Some(Command::Shutdown) | None => break,
                    }
                }
                Some(change) = self.change_rx.recv() => {
                    self.handle_local_change(change);
                }
                frame = self.channel_rx.recv(), if self.channel_open => {
                    match frame {
                        Ok(raw) => self.handle_frame(&raw, Instant::now()).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("Channel receiver lagged, {} frames dropped", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            // Medium went away mid-run: degrade, don't crash
                            warn!("Peer channel closed, continuing as leader of one");
                            self.channel_open = false;
                        }
                    }
                }
                _ = heartbeat.tick(), if self.supported && self.config.enable_leader_election => {
                    if self.elector.is_leader() {
                        self.send_message(SyncMessage::heartbeat(&self.shared.peer_id));
                    }
                }
                _ = watchdog.tick(), if self.supported && self.config.enable_leader_election => {
                    let now = Instant::now();
                    if self.elector.leader_lost(now) {
                        info!(
                            "Leader {} went silent, re-electing",
                            self.elector.current_leader().unwrap_or("?")
                        );
                        self.start_election(now);
                    }
                }
                _ = prune.tick() => {
                    let now = Instant::now();
                    self.shared.tracker.write().unwrap().prune(now);
                }
                _ = sleep_deadline(timer_deadline) => {
                    self.on_deadline(Instant::now()).await;
                }
            }
        }

        // Teardown: every timer dies with this loop, the channel
        // subscription drops with self
        self.scheduler.clear();
        self.channel.close();
        *self.shared.connection.write().unwrap() = ConnectionState::Disconnected;
        self.shared.active.store(false, Ordering::Release);
        info!("Sync coordinator {} stopped", self.shared.peer_id);
    }

    fn start_election(&mut self, now: Instant) {
        self.elector.begin_election();
        self.send_message(SyncMessage::leader_election(
            &self.shared.peer_id,
            self.elector.effective_priority(),
        ));
        self.election_deadline = Some(now + self.config.election_window);
        self.shared.stats.write().unwrap().elections_run += 1;
        self.publish_leader();
    }

    async fn on_deadline(&mut self, now: Instant) {
        if self.election_deadline.is_some_and(|d| now >= d) {
            self.election_deadline = None;
            let outcome = self.elector.close_window(now);
            if outcome.is_self {
                self.send_message(SyncMessage::leader_announce(
                    &self.shared.peer_id,
                    &self.shared.peer_id,
                    self.elector.effective_priority(),
                ));
            }
            self.publish_leader();
            self.mark_connected();
        }

        if self.discovery_deadline.is_some_and(|d| now >= d) {
            self.discovery_deadline = None;
            self.mark_connected();
            let alone = self
                .shared
                .tracker
                .read()
                .unwrap()
                .connected_count(now)
                == 0;
            if alone && !self.config.enable_leader_election {
                // Nobody answered the discovery round: the single peer is
                // leader by default even without the election protocol
                self.elector.force_leader();
                self.publish_leader();
            }
        }

        if let Some(payload) = self.scheduler.take_due(now) {
            self.emit_state_update(payload);
        }
    }

    async fn handle_frame(&mut self, raw: &[u8], now: Instant) {
        let Some(msg) = self.router.accept(raw) else {
            self.shared.stats.write().unwrap().messages_discarded += 1;
            return;
        };
        self.shared.stats.write().unwrap().messages_received += 1;
        self.shared
            .tracker
            .write()
            .unwrap()
            .observe(&msg.peer_id, now);
        // Hearing any peer completes the discovery round
        self.mark_connected();

        match msg.message_type {
            MessageType::StateUpdate | MessageType::StateResponse => {
                self.handle_state_payload(msg).await;
            }
            MessageType::StateRequest => {
                let snapshot = self.local_snapshot();
                self.send_message(SyncMessage::state_response(&self.shared.peer_id, snapshot));
            }
            MessageType::PeerPing => {
                self.send_message(SyncMessage::peer_pong(&self.shared.peer_id));
            }
            MessageType::PeerPong => {}
            MessageType::Heartbeat => {
                if self.config.enable_leader_election {
                    self.elector.record_heartbeat(&msg.peer_id, now);
                    self.publish_leader();
                }
            }
            MessageType::LeaderElection => {
                if self.config.enable_leader_election {
                    let Some(priority) = msg.payload.as_ref().and_then(|p| p.priority) else {
                        debug!("Ignoring LEADER_ELECTION without priority from {}", msg.peer_id);
                        return;
                    };
                    // A candidacy while settled re-opens the window for
                    // everyone; the late joiner either wins the
                    // recomputation or adopts the announce that follows
                    if self.elector.role() != LeaderRole::Electing {
                        self.start_election(now);
                    }
                    self.elector.record_candidate(&msg.peer_id, priority);
                }
            }
            MessageType::LeaderAnnounce => {
                if self.config.enable_leader_election {
                    let payload = msg.payload.unwrap_or_default();
                    let leader_id = payload.leader_id.unwrap_or(msg.peer_id);
                    self.elector.adopt_announce(&leader_id, payload.priority, now);
                    self.publish_leader();
                }
            }
        }
    }

    /// Merge a remote partial snapshot into local state via the configured
    /// resolver and apply it (idempotently) through the bridge
    async fn handle_state_payload(&mut self, msg: SyncMessage) {
        let Some(remote_raw) = msg.payload.and_then(|p| p.state) else {
            return;
        };
        // Exclusions hold inbound too: a peer cannot push an excluded key
        let remote = self.config.filter_state(remote_raw);
        if remote.is_empty() {
            return;
        }
        let keys: Vec<String> = remote.keys().cloned().collect();
        let local = self.bridge.extract_syncable(&keys);

        let merged = self.resolver.resolve(&local, &remote).await;
        self.bridge.apply(&merged);

        let mut stats = self.shared.stats.write().unwrap();
        stats.updates_applied += 1;
        if !local.is_empty() {
            stats.conflicts_resolved += 1;
        }
    }

    fn handle_local_change(&mut self, change: StateChange) {
        if let Some(predicate) = &self.config.should_sync {
            if !predicate(&change.prev, &change.next) {
                return;
            }
        }
        let changed = changed_allowed_keys(&self.config, &change.prev, &change.next);
        if changed.is_empty() {
            return;
        }
        if let Some(payload) = self.scheduler.offer(changed, Instant::now()) {
            self.emit_state_update(payload);
        }
    }

    fn handle_force_leader(&mut self) {
        self.elector.force_leader();
        self.election_deadline = None;
        self.send_message(SyncMessage::leader_announce(
            &self.shared.peer_id,
            &self.shared.peer_id,
            self.elector.effective_priority(),
        ));
        self.publish_leader();
    }

    /// Out-of-band snapshot broadcast, bypassing the scheduler
    fn broadcast_snapshot(&mut self, keys: Option<&[String]>) {
        let snapshot = match keys {
            Some(requested) => {
                let allowed: Vec<String> = requested
                    .iter()
                    .filter(|k| self.config.allows_key(k))
                    .cloned()
                    .collect();
                if allowed.is_empty() {
                    return;
                }
                self.bridge.extract_syncable(&allowed)
            }
            None => self.local_snapshot(),
        };
        self.emit_state_update(snapshot);
    }

    /// Full synchronized-key snapshot of local state
    fn local_snapshot(&self) -> StateMap {
        let snapshot = self.bridge.extract_syncable(&self.config.allowed_keys());
        self.config.filter_state(snapshot)
    }

    fn emit_state_update(&mut self, state: StateMap) {
        if state.is_empty() {
            return;
        }
        self.send_message(SyncMessage::state_update(&self.shared.peer_id, state));
    }

    fn send_message(&mut self, message: SyncMessage) {
        if !self.supported {
            return;
        }
        self.channel.send(message.encode());
        self.shared.stats.write().unwrap().messages_sent += 1;
    }

    fn publish_leader(&self) {
        *self.shared.leader.write().unwrap() = LeaderView {
            role: self.elector.role(),
            leader_id: self.elector.current_leader().map(|s| s.to_string()),
        };
    }

    fn mark_connected(&self) {
        let mut connection = self.shared.connection.write().unwrap();
        if *connection == ConnectionState::Connecting {
            *connection = ConnectionState::Connected;
        }
    }
}

/// Diff of a local transition restricted to replicable keys: only keys whose
/// value actually changed are retransmitted
fn changed_allowed_keys(config: &SyncConfig, prev: &StateMap, next: &StateMap) -> StateMap {
    next.iter()
        .filter(|(key, value)| config.allows_key(key) && prev.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Default election priority: a process-monotonic start ordinal. Unlike a
/// wall-clock timestamp it cannot move backwards, and it stays comparable
/// because the winner is the minimum over the observed candidate set with
/// the peer id breaking ties.
static NEXT_START_ORDINAL: AtomicI64 = AtomicI64::new(0);

fn next_start_ordinal() -> i64 {
    NEXT_START_ORDINAL.fetch_add(1, Ordering::Relaxed)
}

async fn sleep_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryStateBridge;
    use crate::channel::{LocalChannel, UnsupportedChannel};
    use serde_json::json;

    fn quick_config(channel: &str) -> SyncConfig {
        SyncConfig::new(channel)
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_election_window(Duration::from_millis(40))
            .with_discovery_timeout(Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let bridge = Arc::new(MemoryStateBridge::new());
        let channel = Arc::new(LocalChannel::connect("coord-lifecycle"));
        let mut coordinator =
            SyncCoordinator::new(quick_config("coord-lifecycle"), bridge, channel);

        assert!(!coordinator.is_active());
        assert!(!coordinator.peer_id().is_empty());
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);

        coordinator.start().unwrap();
        assert!(coordinator.is_active());
        assert!(matches!(
            coordinator.connection_state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ));

        // Second start while running is a lifecycle error
        assert!(matches!(
            coordinator.start(),
            Err(SyncError::AlreadyRunning)
        ));

        coordinator.stop().await.unwrap();
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);

        // Stopped coordinators are single-use
        assert!(coordinator.start().is_err());
        assert!(matches!(
            coordinator.stop().await,
            Err(SyncError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_at_start() {
        let bridge = Arc::new(MemoryStateBridge::new());
        let channel = Arc::new(UnsupportedChannel::new());
        let config = SyncConfig::new("")
            .with_leader_election(false);
        let mut coordinator = SyncCoordinator::new(config, bridge, channel);

        assert!(matches!(
            coordinator.start(),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(!coordinator.is_active());
    }

    #[tokio::test]
    async fn test_unsupported_medium_degrades_to_leader_of_one() {
        let bridge = Arc::new(MemoryStateBridge::new());
        bridge.set("theme", json!("dark"));
        let channel = Arc::new(UnsupportedChannel::new());
        let mut coordinator =
            SyncCoordinator::new(quick_config("unused"), bridge, channel);

        coordinator.start().unwrap();
        assert_eq!(coordinator.connection_state(), ConnectionState::Connected);
        assert!(coordinator.is_leader());
        assert_eq!(coordinator.connected_peer_count(), 0);

        // Every send is a no-op, never an error
        coordinator.broadcast_state(None).unwrap();
        coordinator.request_state().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.stats().messages_sent, 0);

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_api_errors_when_not_running() {
        let bridge = Arc::new(MemoryStateBridge::new());
        let channel = Arc::new(UnsupportedChannel::new());
        let coordinator = SyncCoordinator::new(quick_config("unused"), bridge, channel);

        assert!(matches!(
            coordinator.request_state(),
            Err(SyncError::NotRunning)
        ));
        assert!(matches!(
            coordinator.broadcast_state(None),
            Err(SyncError::NotRunning)
        ));
        assert!(matches!(
            coordinator.force_leader(),
            Err(SyncError::NotRunning)
        ));
        assert!(coordinator.change_notifier().is_err());
    }

    #[tokio::test]
    async fn test_lone_peer_with_election_becomes_leader() {
        let bridge = Arc::new(MemoryStateBridge::new());
        let channel = Arc::new(LocalChannel::connect("coord-lone-election"));
        let mut coordinator =
            SyncCoordinator::new(quick_config("coord-lone-election"), bridge, channel);

        coordinator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(coordinator.is_leader());
        assert_eq!(
            coordinator.current_leader().as_deref(),
            Some(coordinator.peer_id())
        );
        assert_eq!(coordinator.connection_state(), ConnectionState::Connected);

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lone_peer_without_election_becomes_leader_by_default() {
        let bridge = Arc::new(MemoryStateBridge::new());
        let channel = Arc::new(LocalChannel::connect("coord-lone-noelect"));
        let config = quick_config("coord-lone-noelect").with_leader_election(false);
        let mut coordinator = SyncCoordinator::new(config, bridge, channel);

        coordinator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(coordinator.is_leader());
        coordinator.stop().await.unwrap();
    }

    #[test]
    fn test_default_priorities_are_monotonic() {
        let first = next_start_ordinal();
        let second = next_start_ordinal();
        assert!(second > first);
    }

    #[test]
    fn test_changed_allowed_keys_diff() {
        let config = SyncConfig::new("c").with_exclude_keys(&["sessionToken"]);
        let prev = json!({"theme": "dark", "locale": "en"})
            .as_object()
            .unwrap()
            .clone();
        let next = json!({"theme": "light", "locale": "en", "sessionToken": "x"})
            .as_object()
            .unwrap()
            .clone();

        let changed = changed_allowed_keys(&config, &prev, &next);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["theme"], json!("light"));
    }
}
