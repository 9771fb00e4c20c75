//! A single output destination
//!
//! Each connection owns its queue, link state and transport, each behind
//! its own lock, so a slow or sleeping client never stalls another.
//!
//! ```text
//!   dispatcher ──deliver()──► stream/serial ──► queue ──► writer task
//!                             awake?        ──► transport.write()
//!                             throttled?    ──► write 1-in-N / queue
//!                             asleep?       ──► queue (queueable) / drop
//!
//!   writer task: wait ──► while awake: pop_first ─► write ─► pace
//! ```
//!
//! Datagram and in-process writes complete without waiting on the peer,
//! so the dispatcher performs them inline. Stream and serial writes can
//! stall for as long as the peer stops reading; those frames always go
//! through the queue and only the writer task touches the transport.
//! A stalled peer then costs at most one bounded queue.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::dispatch::MessagePolicy;
use crate::error::{Error, Result};
use crate::queue::PriorityQueue;
use crate::server::capabilities::Capabilities;
use crate::server::config::NetworkConfig;
use crate::server::link::{LinkState, LinkStatus, LivenessEvent};
use crate::server::transport::Transport;
use crate::stats::DeliveryStats;

/// Transport-specific identity of a destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    Udp(SocketAddr),
    Tcp(SocketAddr),
    Serial(PathBuf),
    Local(String),
}

impl ConnectionKey {
    /// Client IP for network destinations
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            ConnectionKey::Udp(addr) | ConnectionKey::Tcp(addr) => Some(addr.ip()),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKey::Udp(addr) => write!(f, "UDP:{}", addr),
            ConnectionKey::Tcp(addr) => write!(f, "TCP:{}", addr),
            ConnectionKey::Serial(path) => write!(f, "SERIAL:{}", path.display()),
            ConnectionKey::Local(name) => write!(f, "LOCAL:{}", name),
        }
    }
}

/// Outcome of offering a frame to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the transport
    Sent,
    /// Passed to the connection's writer task
    Handed,
    /// Parked in the connection's queue
    Queued,
    /// Not queueable and the link is not free
    Dropped,
    /// Capability mask excludes this kind
    Filtered,
    /// Connection is closed
    Closed,
}

pub struct Connection {
    key: ConnectionKey,
    capabilities: Capabilities,
    queue: PriorityQueue<Bytes>,
    link: Mutex<LinkState>,
    transport: tokio::sync::Mutex<Transport>,
    closed: AtomicBool,
    /// Writes may stall on the peer; all frames go through the writer
    via_writer: bool,
    throttle_counter: AtomicU32,
    throttle_pass_every: u32,
    drain_pacing: Duration,
    stats: Arc<DeliveryStats>,
}

impl Connection {
    pub fn new(
        key: ConnectionKey,
        capabilities: Capabilities,
        transport: Transport,
        config: &NetworkConfig,
        stats: Arc<DeliveryStats>,
        now: Instant,
    ) -> Self {
        let link = if transport.is_lossy() {
            LinkState::lossy(config.link_policy(), now)
        } else {
            LinkState::reliable(now)
        };
        let via_writer = transport.can_stall();
        // Pacing spreads a post-wake burst over a lossy link
        let drain_pacing = if transport.is_lossy() {
            config.queue.drain_pacing
        } else {
            Duration::ZERO
        };

        Self {
            key,
            capabilities,
            queue: PriorityQueue::new(config.queue.max_size),
            link: Mutex::new(link),
            transport: tokio::sync::Mutex::new(transport),
            closed: AtomicBool::new(false),
            via_writer,
            throttle_counter: AtomicU32::new(0),
            throttle_pass_every: config.throttle_pass_every.max(1),
            drain_pacing,
            stats,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn status(&self, now: Instant) -> LinkStatus {
        self.link.lock().status(now)
    }

    /// Apply a liveness signal and wake the writer if the link freed up
    pub fn on_liveness(&self, event: LivenessEvent, now: Instant) {
        self.link.lock().on_event(event, now);
        tracing::debug!(client = %self.key, event = ?event, "Liveness signal");
        self.refresh(now);
    }

    /// Re-evaluate sleep/throttle state. On a transition to awake the
    /// writer is woken to drain the queue.
    pub fn refresh(&self, now: Instant) -> LinkStatus {
        let (transition, status) = {
            let mut link = self.link.lock();
            let transition = link.update(now);
            (transition, link.status(now))
        };

        if let Some((old, new)) = transition {
            tracing::debug!(
                client = %self.key,
                from = old.as_str(),
                to = new.as_str(),
                queued = self.queue.len(),
                "Link state changed"
            );
            if new == LinkStatus::Awake {
                self.queue.wake();
            }
        }
        status
    }

    /// Offer a frame. Never waits on the peer: the only inline writes are
    /// datagram and in-process ones, which do not block.
    pub async fn deliver(&self, frame: &Bytes, policy: &MessagePolicy, now: Instant) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }
        if !self.capabilities.accepts(policy.capability) {
            return Delivery::Filtered;
        }
        if self.via_writer {
            let dropped = self.queue.put_at(policy.priority, policy.ttl, frame.clone(), now);
            if dropped > 0 {
                self.stats.record_overflow(dropped);
                tracing::debug!(client = %self.key, dropped, "Writer backlog full");
            }
            return Delivery::Handed;
        }

        let status = self.status(now);
        let send_now = match status {
            LinkStatus::Awake => true,
            LinkStatus::Throttled => {
                policy.critical
                    || self.throttle_counter.fetch_add(1, Ordering::Relaxed) % self.throttle_pass_every == 0
            }
            LinkStatus::Asleep => false,
        };

        if send_now {
            return match self.write(frame).await {
                Ok(()) => Delivery::Sent,
                Err(_) => Delivery::Closed,
            };
        }

        if policy.queueable {
            let dropped = self.queue.put_at(policy.priority, policy.ttl, frame.clone(), now);
            self.stats.record_queued();
            if dropped > 0 {
                self.stats.record_overflow(dropped);
            }
            Delivery::Queued
        } else {
            match status {
                LinkStatus::Asleep => self.stats.record_dropped_sleeping(),
                _ => self.stats.record_dropped_throttled(),
            }
            tracing::trace!(client = %self.key, status = status.as_str(), "Dropped non-queueable frame");
            Delivery::Dropped
        }
    }

    /// Write one frame. UDP errors are ignored; any other transport error
    /// closes the connection.
    async fn write(&self, frame: &Bytes) -> Result<()> {
        let mut transport = self.transport.lock().await;
        match transport.write(frame).await {
            Ok(()) => {
                self.stats.record_sent(frame.len());
                tracing::trace!(client = %self.key, bytes = frame.len(), "Frame sent");
                Ok(())
            }
            Err(e) => {
                self.stats.record_write_error();
                if !transport.errors_are_fatal() {
                    tracing::trace!(client = %self.key, error = %e, "Datagram write failed");
                    return Ok(());
                }
                drop(transport);
                tracing::debug!(client = %self.key, error = %e, "Write failed, closing connection");
                self.close();
                Err(Error::ConnectionClosed(self.key.clone()))
            }
        }
    }

    /// Close the connection and discard its queue. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        tracing::info!(client = %self.key, "Connection closed");
    }

    /// Spawn the queue drain task
    ///
    /// The task sleeps on the queue's wake signal and drains it, one frame
    /// per write (paced on UDP links), while the link is awake. It
    /// exits when the connection closes.
    pub fn spawn_writer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let conn = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                conn.queue.wait().await;
                loop {
                    if conn.is_closed() {
                        tracing::trace!(client = %conn.key, "Writer exiting");
                        return;
                    }
                    if conn.status(Instant::now()) != LinkStatus::Awake {
                        break;
                    }
                    let Some(entry) = conn.queue.pop_first() else {
                        break;
                    };
                    if let Err(e) = conn.write(&entry.payload).await {
                        tracing::debug!(error = %e, "Writer stopped");
                        return;
                    }
                    if !conn.drain_pacing.is_zero() {
                        tokio::time::sleep(conn.drain_pacing).await;
                    }
                }
            }
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("capabilities", &self.capabilities)
            .field("queued", &self.queue.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream, UdpSocket};
    use tokio::sync::mpsc;

    use super::*;
    use crate::dispatch::MessageKind;

    async fn udp_pair(config: &NetworkConfig) -> (Arc<Connection>, UdpSocket, Arc<DeliveryStats>) {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tx = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let target = rx.local_addr().unwrap();
        let stats = Arc::new(DeliveryStats::new());
        let conn = Connection::new(
            ConnectionKey::Udp(target),
            Capabilities::GDL90,
            Transport::Udp { socket: tx, target },
            config,
            Arc::clone(&stats),
            Instant::now(),
        );
        (Arc::new(conn), rx, stats)
    }

    /// Stream connection plus the peer's end of the socket
    async fn tcp_pair(config: &NetworkConfig) -> (Arc<Connection>, TcpStream, Arc<DeliveryStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        let (_read, write) = server.into_split();
        let stats = Arc::new(DeliveryStats::new());
        let conn = Connection::new(
            ConnectionKey::Tcp(addr),
            Capabilities::GDL90,
            Transport::Tcp(write),
            config,
            Arc::clone(&stats),
            Instant::now(),
        );
        (Arc::new(conn), peer, stats)
    }

    async fn recv(rx: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv_from(&mut buf))
            .await
            .expect("datagram")
            .unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_key_display() {
        let addr: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        assert_eq!(ConnectionKey::Udp(addr).to_string(), "UDP:10.0.0.2:4000");
        assert_eq!(ConnectionKey::Tcp(addr).to_string(), "TCP:10.0.0.2:4000");
        assert_eq!(
            ConnectionKey::Serial(PathBuf::from("/dev/serialout0")).to_string(),
            "SERIAL:/dev/serialout0"
        );
        assert_eq!(ConnectionKey::Udp(addr).ip(), Some(addr.ip()));
        assert_eq!(ConnectionKey::Local("ui".into()).ip(), None);
    }

    #[tokio::test]
    async fn test_awake_writes_immediately() {
        let config = NetworkConfig::default().disable_throttle();
        let (conn, rx, stats) = udp_pair(&config).await;

        let frame = Bytes::from_static(&[0x7E, 0x14, 0x7E]);
        let result = conn.deliver(&frame, MessageKind::Traffic.policy(), Instant::now()).await;
        assert_eq!(result, Delivery::Sent);
        assert_eq!(recv(&rx).await, frame.to_vec());
        assert_eq!(stats.snapshot().frames_sent, 1);
    }

    #[tokio::test]
    async fn test_capability_filter() {
        let config = NetworkConfig::default().disable_throttle();
        let (conn, _rx, stats) = udp_pair(&config).await;

        let result = conn
            .deliver(&Bytes::from_static(b"x"), MessageKind::Ahrs.policy(), Instant::now())
            .await;
        assert_eq!(result, Delivery::Filtered);
        assert_eq!(stats.snapshot().frames_sent, 0);
        assert_eq!(conn.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_asleep_queues_or_drops() {
        let config = NetworkConfig::default().disable_throttle();
        let (conn, _rx, stats) = udp_pair(&config).await;
        let now = Instant::now();
        conn.on_liveness(LivenessEvent::CannotReceive, now);

        let frame = Bytes::from_static(b"x");
        assert_eq!(conn.deliver(&frame, MessageKind::Heartbeat.policy(), now).await, Delivery::Dropped);
        assert_eq!(conn.deliver(&frame, MessageKind::Traffic.policy(), now).await, Delivery::Queued);
        assert_eq!(conn.deliver(&frame, MessageKind::Ownship.policy(), now).await, Delivery::Queued);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 0);
        assert_eq!(snap.frames_queued, 2);
        assert_eq!(snap.dropped_sleeping, 1);
        assert_eq!(conn.queue_len(), 2);
    }

    #[tokio::test]
    async fn test_throttled_passes_critical_and_one_in_n() {
        let config = NetworkConfig::default().throttle_pass_every(3);
        let (conn, _rx, stats) = udp_pair(&config).await;
        let now = Instant::now();
        assert_eq!(conn.status(now), LinkStatus::Throttled);

        let frame = Bytes::from_static(b"x");
        assert_eq!(conn.deliver(&frame, MessageKind::Ownship.policy(), now).await, Delivery::Sent);
        assert_eq!(conn.deliver(&frame, MessageKind::Heartbeat.policy(), now).await, Delivery::Sent);

        let traffic: Vec<Delivery> = {
            let mut out = Vec::new();
            for _ in 0..6 {
                out.push(conn.deliver(&frame, MessageKind::Traffic.policy(), now).await);
            }
            out
        };
        assert_eq!(
            traffic,
            vec![
                Delivery::Sent,
                Delivery::Queued,
                Delivery::Queued,
                Delivery::Sent,
                Delivery::Queued,
                Delivery::Queued
            ]
        );

        assert_eq!(stats.snapshot().frames_sent, 4);
        assert_eq!(stats.snapshot().frames_queued, 4);
    }

    #[tokio::test]
    async fn test_wake_drains_queue_in_priority_order() {
        let config = NetworkConfig::default()
            .disable_throttle()
            .drain_pacing(Duration::from_millis(1));
        let (conn, rx, stats) = udp_pair(&config).await;
        let _writer = conn.spawn_writer();

        let now = Instant::now();
        conn.on_liveness(LivenessEvent::CannotReceive, now);
        conn.refresh(now);

        conn.deliver(&Bytes::from_static(b"uplink"), MessageKind::Uplink.policy(), now).await;
        conn.deliver(&Bytes::from_static(b"traffic"), MessageKind::Traffic.policy(), now).await;
        conn.deliver(&Bytes::from_static(b"ownship"), MessageKind::Ownship.policy(), now).await;
        assert_eq!(conn.queue_len(), 3);

        conn.on_liveness(LivenessEvent::CanReceive, Instant::now());

        assert_eq!(recv(&rx).await, b"ownship");
        assert_eq!(recv(&rx).await, b"traffic");
        assert_eq!(recv(&rx).await, b"uplink");
        assert_eq!(conn.queue_len(), 0);
        assert_eq!(stats.snapshot().frames_sent, 3);
    }

    #[tokio::test]
    async fn test_channel_close_on_consumer_drop() {
        let (tx, rx) = mpsc::channel(4);
        let stats = Arc::new(DeliveryStats::new());
        let conn = Connection::new(
            ConnectionKey::Local("ui".into()),
            Capabilities::GDL90,
            Transport::Channel(tx),
            &NetworkConfig::default(),
            Arc::clone(&stats),
            Instant::now(),
        );
        let now = Instant::now();
        assert_eq!(conn.status(now), LinkStatus::Awake);

        drop(rx);
        let frame = Bytes::from_static(b"x");
        assert_eq!(conn.deliver(&frame, MessageKind::Traffic.policy(), now).await, Delivery::Closed);
        assert!(conn.is_closed());
        assert_eq!(conn.deliver(&frame, MessageKind::Traffic.policy(), now).await, Delivery::Closed);
        assert_eq!(stats.snapshot().write_errors, 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_writer() {
        let config = NetworkConfig::default().disable_throttle();
        let (conn, _rx, _stats) = udp_pair(&config).await;
        let writer = conn.spawn_writer();

        conn.close();
        conn.close();
        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer exits")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_frames_go_through_writer() {
        let (conn, mut peer, stats) = tcp_pair(&NetworkConfig::default()).await;
        let _writer = conn.spawn_writer();
        let now = Instant::now();
        assert_eq!(conn.status(now), LinkStatus::Awake);

        let frame = Bytes::from_static(&[0x7E, 0x00, 0x7E]);
        assert_eq!(conn.deliver(&frame, MessageKind::Heartbeat.policy(), now).await, Delivery::Handed);

        let mut buf = [0u8; 3];
        tokio::time::timeout(Duration::from_secs(2), peer.read_exact(&mut buf))
            .await
            .expect("frame")
            .unwrap();
        assert_eq!(&buf, &[0x7E, 0x00, 0x7E]);
        assert_eq!(stats.snapshot().frames_sent, 1);
        assert_eq!(stats.snapshot().frames_queued, 0);
    }

    #[tokio::test]
    async fn test_stalled_stream_peer_never_blocks_deliver() {
        let config = NetworkConfig::default().queue_size(16);
        // The peer never reads, so the writer stalls once the socket buffers fill
        let (conn, _peer, stats) = tcp_pair(&config).await;
        let _writer = conn.spawn_writer();

        let frame = Bytes::from(vec![0x55u8; 256 * 1024]);
        for i in 0..128 {
            let result = tokio::time::timeout(
                Duration::from_secs(2),
                conn.deliver(&frame, MessageKind::Traffic.policy(), Instant::now()),
            )
            .await
            .unwrap_or_else(|_| panic!("deliver {} blocked", i));
            assert_eq!(result, Delivery::Handed);
        }

        assert!(conn.queue_len() <= 16);
        assert!(stats.snapshot().queue_overflow > 0);
        assert!(!conn.is_closed());
    }
}
