//! Connection registry
//!
//! ```text
//!                      Arc<ConnectionRegistry>
//!               ┌──────────────────────────────────┐
//!               │ connections: RwLock<HashMap<     │
//!               │   ConnectionKey,                 │
//!               │   Arc<Connection> {              │
//!               │     queue:     Mutex<..>,        │
//!               │     link:      Mutex<..>,        │
//!               │     transport: Mutex<..>,        │
//!               │   }                              │
//!               │ >>                               │
//!               └───────────────┬──────────────────┘
//!     lease rescan ──► sync     │     ◄── TCP accept / serial open
//!     liveness     ──► on_liveness
//!                               ▼
//!                     dispatcher: connections()
//! ```
//!
//! The index lock only guards membership. Per-connection state has its
//! own locks so the dispatcher never holds the index while writing.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::server::capabilities::Capabilities;
use crate::server::config::NetworkConfig;
use crate::server::connection::{Connection, ConnectionKey};
use crate::server::lease::{LeaseSource, SystemLeases};
use crate::server::link::{LinkStatus, LivenessEvent};
use crate::server::transport::Transport;
use crate::stats::DeliveryStats;

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

/// Index of live output destinations
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionKey, Arc<Connection>>>,
    udp_socket: Arc<UdpSocket>,
    leases: Arc<dyn LeaseSource>,
    config: NetworkConfig,
    stats: Arc<DeliveryStats>,
}

impl ConnectionRegistry {
    /// Bind the shared outbound UDP socket and discover clients from the
    /// host's lease tables
    pub async fn bind(config: NetworkConfig, stats: Arc<DeliveryStats>) -> Result<Arc<Self>> {
        let leases = Arc::new(SystemLeases::from_config(&config));
        Self::with_leases(config, leases, stats).await
    }

    /// Like [`bind`](Self::bind) with a custom discovery source
    pub async fn with_leases(
        config: NetworkConfig,
        leases: Arc<dyn LeaseSource>,
        stats: Arc<DeliveryStats>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(config.udp_bind_addr).await?;
        socket.set_broadcast(true)?;
        tracing::info!(addr = %socket.local_addr()?, "Output socket bound");

        Ok(Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            udp_socket: Arc::new(socket),
            leases,
            config,
            stats,
        }))
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Rescan leases and reconcile the UDP destinations
    pub async fn sync_leases(&self) -> Result<SyncReport> {
        let leases = Arc::clone(&self.leases);
        let ips = tokio::task::spawn_blocking(move || leases.client_ips())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        Ok(self.sync_ips(&ips).await)
    }

    /// Make the UDP destinations match `ips` × configured outputs.
    /// Stream and serial destinations are not touched.
    pub async fn sync_ips(&self, ips: &[IpAddr]) -> SyncReport {
        let wanted: HashMap<ConnectionKey, Capabilities> = ips
            .iter()
            .flat_map(|ip| {
                self.config.outputs.iter().map(move |out| {
                    (ConnectionKey::Udp(SocketAddr::new(*ip, out.port)), out.capabilities)
                })
            })
            .collect();

        let mut report = SyncReport::default();
        let now = Instant::now();
        let mut connections = self.connections.write().await;

        let stale: Vec<ConnectionKey> = connections
            .keys()
            .filter(|k| matches!(k, ConnectionKey::Udp(_)) && !wanted.contains_key(*k))
            .cloned()
            .collect();
        for key in stale {
            if let Some(conn) = connections.remove(&key) {
                conn.close();
                report.removed += 1;
            }
        }

        for (key, capabilities) in wanted {
            if connections.contains_key(&key) {
                continue;
            }
            let ConnectionKey::Udp(target) = key else {
                continue;
            };
            let transport = Transport::Udp {
                socket: Arc::clone(&self.udp_socket),
                target,
            };
            let conn = self.make_connection(key.clone(), capabilities, transport, now);
            connections.insert(key, conn);
            report.added += 1;
        }

        if report.added > 0 || report.removed > 0 {
            tracing::debug!(
                added = report.added,
                removed = report.removed,
                total = connections.len(),
                "Destinations rescanned"
            );
        }
        report
    }

    fn make_connection(
        &self,
        key: ConnectionKey,
        capabilities: Capabilities,
        transport: Transport,
        now: Instant,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(
            key.clone(),
            capabilities,
            transport,
            &self.config,
            Arc::clone(&self.stats),
            now,
        ));
        conn.spawn_writer();
        tracing::info!(client = %key, capabilities = %capabilities, "Connection added");
        conn
    }

    /// Add a destination. An existing live connection with the same key is
    /// kept and returned instead.
    pub async fn register(
        &self,
        key: ConnectionKey,
        capabilities: Capabilities,
        transport: Transport,
    ) -> Arc<Connection> {
        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(&key) {
            if !existing.is_closed() {
                return Arc::clone(existing);
            }
        }
        let conn = self.make_connection(key.clone(), capabilities, transport, Instant::now());
        connections.insert(key, Arc::clone(&conn));
        conn
    }

    /// Open a serial output device for writing and register it
    pub async fn register_serial(
        &self,
        path: impl AsRef<Path>,
        capabilities: Capabilities,
    ) -> Result<Arc<Connection>> {
        let path = path.as_ref();
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        let key = ConnectionKey::Serial(path.to_path_buf());
        Ok(self.register(key, capabilities, Transport::Serial(file)).await)
    }

    /// Register an in-process consumer fed through a bounded channel
    pub async fn register_channel(
        &self,
        name: impl Into<String>,
        capabilities: Capabilities,
        capacity: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<bytes::Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = self
            .register(ConnectionKey::Local(name.into()), capabilities, Transport::Channel(tx))
            .await;
        (conn, rx)
    }

    /// Close and forget a destination
    pub async fn remove(&self, key: &ConnectionKey) -> bool {
        let removed = self.connections.write().await.remove(key);
        match removed {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Route a liveness signal to every UDP destination at `ip`
    /// (optionally only the one on `port`). Returns how many matched.
    pub async fn on_liveness(&self, ip: IpAddr, port: Option<u16>, event: LivenessEvent) -> usize {
        let now = Instant::now();
        let connections = self.connections.read().await;
        let mut matched = 0;
        for (key, conn) in connections.iter() {
            let ConnectionKey::Udp(addr) = key else {
                continue;
            };
            if addr.ip() == ip && port.map_or(true, |p| p == addr.port()) {
                conn.on_liveness(event, now);
                matched += 1;
            }
        }
        matched
    }

    /// Re-evaluate every link and drop connections closed by write errors.
    /// Returns the number of awake connections.
    pub async fn refresh(&self, now: Instant) -> usize {
        let closed: Vec<ConnectionKey> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, c)| c.is_closed())
                .map(|(k, _)| k.clone())
                .collect()
        };
        if !closed.is_empty() {
            let mut connections = self.connections.write().await;
            for key in &closed {
                connections.remove(key);
            }
        }

        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.refresh(now) == LinkStatus::Awake)
            .count()
    }

    /// Point-in-time list of destinations
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn get(&self, key: &ConnectionKey) -> Option<Arc<Connection>> {
        self.connections.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every destination
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for conn in drained {
            conn.close();
        }
    }

    /// Spawn the periodic lease rescan
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_rescan_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.rescan_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.sync_leases().await {
                    tracing::warn!(error = %e, "Destination rescan failed");
                }
            }
        })
    }
}
