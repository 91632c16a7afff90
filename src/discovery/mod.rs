//! # Discovery Module
//!
//! UDP-multicast peer discovery with access-token admission.
//!
//! ## Protocol
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DISCOVERY PROTOCOL                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Announce (every 10s ± 2s jitter, to 239.255.255.250:4445):            │
//! │                                                                         │
//! │  {                                                                      │
//! │    "peer_id":   "<base64 SHA-256 of Ed25519 pubkey>",                  │
//! │    "networks":  [ { "network_id": "<base64 pubkey>",                   │
//! │                     "token": "<base64 AccessToken>" } ],               │
//! │    "ip": "...", "port": ...,                                           │
//! │    "timestamp": <unix seconds>, "version": "1.0"                       │
//! │  }                                                                      │
//! │                                                                         │
//! │  Receive path, per datagram:                                           │
//! │    1. decode JSON            → MalformedDiscoveryMessage               │
//! │    2. drop our own messages                                            │
//! │    3. timestamp freshness    → StaleTimestamp (replay defense)         │
//! │    4. intersect with known networks → UnknownNetwork if empty          │
//! │    5. verify each token: signature, expiry, peer binding               │
//! │    6. upsert PeerRecord, notify listeners / transport                  │
//! │                                                                         │
//! │  Expiry sweep: records idle longer than 30s are removed.               │
//! │                                                                         │
//! │  Failures never crash the receive loop and never blacklist a          │
//! │  sender; a later valid message is accepted.                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Task Model
//!
//! Send, receive, and sweep run as independent tokio tasks over one
//! shared socket. The peer table is a `parking_lot::RwLock` map:
//! upserts and sweeps serialize on the write lock, queries take
//! snapshots. Shutdown is cooperative through a `watch` signal; each
//! loop finishes its in-flight step before exiting.
//!
//! The replay freshness window is configurable
//! ([`DiscoveryConfig::freshness_window`], default 60 s) and is applied
//! symmetrically around the local clock, tolerating the same amount of
//! forward skew from peers.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::identity::{NetworkId, PeerId};
use crate::token::AccessToken;

/// Discovery protocol version carried in every message
pub const DISCOVERY_VERSION: &str = "1.0";

/// Default multicast group
pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Default multicast port
pub const DEFAULT_PORT: u16 = 4445;

/// Configuration for the discovery service
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Multicast group to announce to and listen on
    pub multicast_addr: Ipv4Addr,
    /// Multicast port
    pub port: u16,
    /// Local interface address to bind
    pub bind_addr: Ipv4Addr,
    /// Base interval between announcements
    pub announce_interval: Duration,
    /// Uniform jitter applied to each interval (±)
    pub announce_jitter: Duration,
    /// Idle time after which a peer record is dropped
    pub peer_timeout: Duration,
    /// Replay freshness window, applied symmetrically around local time
    pub freshness_window: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_addr: DEFAULT_MULTICAST_ADDR,
            port: DEFAULT_PORT,
            bind_addr: Ipv4Addr::UNSPECIFIED,
            announce_interval: Duration::from_secs(10),
            announce_jitter: Duration::from_secs(2),
            peer_timeout: Duration::from_secs(30),
            freshness_window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// One network membership advertised in a discovery message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAnnouncement {
    /// The network being advertised
    pub network_id: NetworkId,
    /// The sender's access token for that network
    pub token: AccessToken,
}

/// The JSON wire format, one message per datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    /// Sender's peer id
    pub peer_id: PeerId,
    /// Advertised network memberships
    pub networks: Vec<NetworkAnnouncement>,
    /// Address the sender's transport listens on
    pub ip: String,
    /// Port the sender's transport listens on
    pub port: u16,
    /// Sender's clock at send time (Unix seconds)
    pub timestamp: i64,
    /// Protocol version
    pub version: String,
}

/// A discovered peer's reachability info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// The peer's id
    pub peer_id: PeerId,
    /// Last advertised address
    pub ip: String,
    /// Last advertised port
    pub port: u16,
    /// Networks the peer proved membership of
    pub networks: Vec<NetworkId>,
    /// Last time a valid message arrived (Unix seconds)
    pub last_seen: i64,
}

/// Peer-table change notifications for subscribed listeners.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// First valid message from a peer
    PeerDiscovered(PeerRecord),
    /// Refreshed record for an already known peer
    PeerUpdated(PeerRecord),
    /// Peer removed by the expiry sweep
    PeerExpired(PeerId),
}

/// Transport collaborator: receives validated peer endpoints to attempt
/// connection establishment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt a connection to a newly discovered peer on a network.
    async fn connect(
        &self,
        peer_id: PeerId,
        network_id: NetworkId,
        ip: &str,
        port: u16,
    ) -> Result<()>;
}

/// UDP-multicast discovery service.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    local_peer_id: PeerId,
    announce_ip: String,
    announce_port: u16,
    /// Memberships we broadcast (network id + our token)
    announcements: RwLock<Vec<NetworkAnnouncement>>,
    /// Networks whose tokens we can validate
    known_networks: RwLock<HashSet<NetworkId>>,
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DiscoveryEvent>>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryService {
    /// Create a service for a local node.
    ///
    /// `announce_ip`/`announce_port` are the transport endpoint
    /// advertised to peers, not the multicast socket address.
    pub fn new(
        local_peer_id: PeerId,
        announce_ip: impl Into<String>,
        announce_port: u16,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            config,
            local_peer_id,
            announce_ip: announce_ip.into(),
            announce_port,
            announcements: RwLock::new(Vec::new()),
            known_networks: RwLock::new(HashSet::new()),
            peers: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            transport: RwLock::new(None),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Advertise membership of a network. The network also becomes
    /// known for validating inbound messages.
    pub fn announce_network(&self, announcement: NetworkAnnouncement) {
        self.known_networks.write().insert(announcement.network_id);
        let mut announcements = self.announcements.write();
        announcements.retain(|a| a.network_id != announcement.network_id);
        announcements.push(announcement);
    }

    /// Add a network we validate inbound tokens for without
    /// advertising membership ourselves.
    pub fn add_known_network(&self, network_id: NetworkId) {
        self.known_networks.write().insert(network_id);
    }

    /// Stop advertising and validating a network.
    pub fn remove_network(&self, network_id: &NetworkId) {
        self.known_networks.write().remove(network_id);
        self.announcements
            .write()
            .retain(|a| &a.network_id != network_id);
    }

    /// Register the transport collaborator notified of new peers.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    /// Subscribe to peer-table change events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start the announce, receive, and sweep tasks.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let socket = UdpSocket::bind((self.config.bind_addr, self.config.port)).await?;
        socket.join_multicast_v4(self.config.multicast_addr, self.config.bind_addr)?;
        socket.set_multicast_loop_v4(true)?;
        let socket = Arc::new(socket);

        let shutdown_rx = {
            let mut shutdown = self.shutdown.lock();
            if shutdown.is_some() {
                return Err(Error::Service("Discovery service already running".into()));
            }
            let (tx, rx) = watch::channel(false);
            *shutdown = Some(tx);
            rx
        };

        tracing::info!(
            peer = %self.local_peer_id.short(),
            group = %self.config.multicast_addr,
            port = self.config.port,
            "discovery service starting"
        );

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(Self::announce_loop(
            Arc::clone(&self),
            Arc::clone(&socket),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(Self::receive_loop(
            Arc::clone(&self),
            socket,
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(Self::sweep_loop(
            Arc::clone(&self),
            shutdown_rx,
        )));

        Ok(())
    }

    /// Signal the loops to stop and wait for in-flight work to finish.
    pub async fn stop(&self) -> Result<()> {
        let shutdown = self
            .shutdown
            .lock()
            .take()
            .ok_or_else(|| Error::Service("Discovery service not running".into()))?;
        let _ = shutdown.send(true);

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }

        tracing::info!(peer = %self.local_peer_id.short(), "discovery service stopped");
        Ok(())
    }

    /// Whether the service loops are running.
    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Snapshot of all live peer records.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers.read().values().cloned().collect()
    }

    /// Snapshot of live peers proven members of `network_id`.
    pub fn peers_for_network(&self, network_id: &NetworkId) -> Vec<PeerRecord> {
        self.peers
            .read()
            .values()
            .filter(|record| record.networks.contains(network_id))
            .cloned()
            .collect()
    }

    /// Number of live peer records.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    // ========================================================================
    // SEND PATH
    // ========================================================================

    async fn announce_loop(
        service: Arc<Self>,
        socket: Arc<UdpSocket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // First announcement goes out immediately; peers should not
        // wait a full interval to learn about us.
        service.announce(&socket).await;

        loop {
            let delay = service.jittered_interval();
            tokio::select! {
                _ = tokio::time::sleep(delay) => service.announce(&socket).await,
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("announce loop stopped");
    }

    async fn announce(&self, socket: &UdpSocket) {
        let message = {
            let announcements = self.announcements.read();
            if announcements.is_empty() {
                tracing::debug!("no network memberships to announce");
                return;
            }
            DiscoveryMessage {
                peer_id: self.local_peer_id,
                networks: announcements.clone(),
                ip: self.announce_ip.clone(),
                port: self.announce_port,
                timestamp: crate::time::now_timestamp(),
                version: DISCOVERY_VERSION.to_string(),
            }
        };

        let destination =
            SocketAddrV4::new(self.config.multicast_addr, self.config.port);

        match serde_json::to_vec(&message) {
            Ok(datagram) => {
                if let Err(e) = socket.send_to(&datagram, destination).await {
                    tracing::warn!(error = %e, "failed to send discovery announcement");
                } else {
                    tracing::debug!(
                        networks = message.networks.len(),
                        "sent discovery announcement"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode discovery announcement"),
        }
    }

    fn jittered_interval(&self) -> Duration {
        let base = self.config.announce_interval.as_millis() as i64;
        let jitter = self.config.announce_jitter.as_millis() as i64;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        Duration::from_millis((base + offset).max(0) as u64)
    }

    // ========================================================================
    // RECEIVE PATH
    // ========================================================================

    async fn receive_loop(
        service: Arc<Self>,
        socket: Arc<UdpSocket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buffer) => match result {
                    Ok((len, source)) => {
                        service.handle_datagram(&buffer[..len], source).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "discovery receive failed");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("receive loop stopped");
    }

    /// Decode, validate, and apply one datagram. Never fails outward:
    /// bad messages are logged and discarded, and the sender is never
    /// marked permanently invalid.
    async fn handle_datagram(&self, datagram: &[u8], source: SocketAddr) {
        match self.process_datagram(datagram, crate::time::now_timestamp()) {
            Ok(Some((record, true))) => {
                tracing::info!(
                    peer = %record.peer_id.short(),
                    ip = %record.ip,
                    port = record.port,
                    networks = record.networks.len(),
                    "discovered peer"
                );
                self.notify_transport(&record).await;
            }
            Ok(Some((record, false))) => {
                tracing::trace!(peer = %record.peer_id.short(), "refreshed peer");
            }
            Ok(None) => {} // our own announcement
            Err(e) if e.is_recoverable() => {
                tracing::debug!(%source, error = %e, "discarding discovery message");
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "error processing discovery message");
            }
        }
    }

    /// Pure message processing against an explicit clock. Returns the
    /// upserted record and whether it is new, or `None` for our own
    /// messages.
    pub(crate) fn process_datagram(
        &self,
        datagram: &[u8],
        now: i64,
    ) -> Result<Option<(PeerRecord, bool)>> {
        let message: DiscoveryMessage = serde_json::from_slice(datagram)
            .map_err(|e| Error::MalformedDiscoveryMessage(e.to_string()))?;

        let networks = match self.validate_message(&message, now)? {
            Some(networks) => networks,
            None => return Ok(None),
        };

        let (record, is_new) = {
            let mut peers = self.peers.write();
            upsert_peer(&mut peers, &message, networks, now)
        };

        self.emit(if is_new {
            DiscoveryEvent::PeerDiscovered(record.clone())
        } else {
            DiscoveryEvent::PeerUpdated(record.clone())
        });

        Ok(Some((record, is_new)))
    }

    /// Validate a decoded message. Returns the proven network
    /// memberships, or `None` when the message is our own.
    fn validate_message(
        &self,
        message: &DiscoveryMessage,
        now: i64,
    ) -> Result<Option<Vec<NetworkId>>> {
        if message.peer_id == self.local_peer_id {
            return Ok(None);
        }

        if message.version != DISCOVERY_VERSION {
            return Err(Error::MalformedDiscoveryMessage(format!(
                "Unsupported version '{}'",
                message.version
            )));
        }

        let window = self.config.freshness_window.as_secs() as i64;
        let age = now - message.timestamp;
        if age.abs() > window {
            return Err(Error::StaleTimestamp { age, window });
        }

        let known = self.known_networks.read();
        let mut proven = Vec::new();
        let mut first_failure: Option<Error> = None;

        for announcement in &message.networks {
            if !known.contains(&announcement.network_id) {
                continue;
            }

            match announcement.token.verify_for_peer(
                announcement.network_id.public_key(),
                &message.peer_id,
                now,
            ) {
                Ok(()) => proven.push(announcement.network_id),
                Err(e) => {
                    tracing::debug!(
                        peer = %message.peer_id.short(),
                        network = %announcement.network_id.short(),
                        error = %e,
                        "rejecting network announcement"
                    );
                    first_failure.get_or_insert(e);
                }
            }
        }

        if proven.is_empty() {
            return Err(first_failure.unwrap_or_else(|| {
                Error::UnknownNetwork("no shared networks in announcement".into())
            }));
        }

        Ok(Some(proven))
    }

    async fn notify_transport(&self, record: &PeerRecord) {
        let transport = self.transport.read().clone();
        let Some(transport) = transport else { return };

        for network_id in &record.networks {
            if let Err(e) = transport
                .connect(record.peer_id, *network_id, &record.ip, record.port)
                .await
            {
                tracing::warn!(
                    peer = %record.peer_id.short(),
                    network = %network_id.short(),
                    error = %e,
                    "transport connect failed"
                );
            }
        }
    }

    // ========================================================================
    // EXPIRY SWEEP
    // ========================================================================

    async fn sweep_loop(service: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(service.config.sweep_interval) => {
                    service.sweep(crate::time::now_timestamp());
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("sweep loop stopped");
    }

    /// Remove peer records idle longer than the timeout, against an
    /// explicit clock.
    pub(crate) fn sweep(&self, now: i64) {
        let timeout = self.config.peer_timeout.as_secs() as i64;
        let expired = {
            let mut peers = self.peers.write();
            expire_peers(&mut peers, now, timeout)
        };

        for peer_id in expired {
            tracing::info!(peer = %peer_id.short(), "peer expired");
            self.emit(DiscoveryEvent::PeerExpired(peer_id));
        }
    }

    fn emit(&self, event: DiscoveryEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Insert or refresh a peer record. Returns the record and whether the
/// peer was previously unknown.
fn upsert_peer(
    peers: &mut HashMap<PeerId, PeerRecord>,
    message: &DiscoveryMessage,
    networks: Vec<NetworkId>,
    now: i64,
) -> (PeerRecord, bool) {
    let record = PeerRecord {
        peer_id: message.peer_id,
        ip: message.ip.clone(),
        port: message.port,
        networks,
        last_seen: now,
    };

    let is_new = peers.insert(message.peer_id, record.clone()).is_none();
    (record, is_new)
}

/// Remove records with `now - last_seen > timeout`, returning the
/// expired peer ids.
fn expire_peers(
    peers: &mut HashMap<PeerId, PeerRecord>,
    now: i64,
    timeout: i64,
) -> Vec<PeerId> {
    let expired: Vec<PeerId> = peers
        .values()
        .filter(|record| now - record.last_seen > timeout)
        .map(|record| record.peer_id)
        .collect();

    for peer_id in &expired {
        peers.remove(peer_id);
    }

    expired
}

// ============================================================================
// TESTS
// ============================================================================
