//! Network configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::constants::{DEFAULT_GDL90_PORT, DEFAULT_LIVENESS_PORT};
use crate::queue::DEFAULT_QUEUE_SIZE;
use crate::server::capabilities::Capabilities;
use crate::server::link::LinkPolicy;

/// One UDP output: every discovered client IP gets a destination on `port`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOutput {
    pub port: u16,
    pub capabilities: Capabilities,
}

impl NetworkOutput {
    pub fn new(port: u16, capabilities: Capabilities) -> Self {
        Self { port, capabilities }
    }
}

/// Per-connection queue options
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum entries per connection queue
    pub max_size: usize,

    /// Delay between frames while draining a UDP client's queue after a wake
    pub drain_pacing: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_SIZE,
            drain_pacing: Duration::from_millis(25),
        }
    }
}

/// Network configuration options
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// UDP outputs crossed with every discovered client IP
    pub outputs: Vec<NetworkOutput>,

    /// Local address for the shared outbound UDP socket
    pub udp_bind_addr: SocketAddr,

    /// Address for the client receive/sleep signaling listener
    pub liveness_addr: SocketAddr,

    /// dnsmasq lease file (None = not scanned)
    pub dhcp_lease_file: Option<PathBuf>,

    /// Kernel ARP table (None = not scanned)
    pub arp_table: Option<PathBuf>,

    /// Clients that always receive output
    pub static_ips: Vec<IpAddr>,

    /// How often destinations are rediscovered
    pub rescan_interval: Duration,

    /// Queue options
    pub queue: QueueConfig,

    /// Disable sleep detection entirely
    pub no_sleep: bool,

    /// An external reachability monitor feeds acks; enables the
    /// missing-ack sleep rule
    pub reachability_monitor: bool,

    /// No ack for this long means asleep
    pub sleep_timeout: Duration,

    /// An unreachable notification keeps the link asleep for this long
    pub unreachable_window: Duration,

    /// Warm-up window after first contact
    pub throttle_window: Duration,

    /// Enable the warm-up throttle
    pub throttle_enabled: bool,

    /// While throttled, every Nth non-critical frame is sent immediately
    pub throttle_pass_every: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            outputs: vec![NetworkOutput::new(
                DEFAULT_GDL90_PORT,
                Capabilities::GDL90 | Capabilities::AHRS_GDL90,
            )],
            udp_bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            liveness_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LIVENESS_PORT),
            dhcp_lease_file: Some(PathBuf::from("/var/lib/misc/dnsmasq.leases")),
            arp_table: Some(PathBuf::from("/proc/net/arp")),
            static_ips: Vec::new(),
            rescan_interval: Duration::from_secs(30),
            queue: QueueConfig::default(),
            no_sleep: false,
            reachability_monitor: false,
            sleep_timeout: Duration::from_secs(10),
            unreachable_window: Duration::from_secs(5),
            throttle_window: Duration::from_secs(15),
            throttle_enabled: true,
            throttle_pass_every: 10,
        }
    }
}

impl NetworkConfig {
    /// Replace the UDP outputs
    pub fn outputs(mut self, outputs: Vec<NetworkOutput>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn udp_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.udp_bind_addr = addr;
        self
    }

    pub fn liveness_addr(mut self, addr: SocketAddr) -> Self {
        self.liveness_addr = addr;
        self
    }

    pub fn dhcp_lease_file(mut self, path: Option<PathBuf>) -> Self {
        self.dhcp_lease_file = path;
        self
    }

    pub fn arp_table(mut self, path: Option<PathBuf>) -> Self {
        self.arp_table = path;
        self
    }

    /// Add a client that always receives output
    pub fn static_ip(mut self, ip: IpAddr) -> Self {
        if !self.static_ips.contains(&ip) {
            self.static_ips.push(ip);
        }
        self
    }

    pub fn rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    pub fn queue_size(mut self, max_size: usize) -> Self {
        self.queue.max_size = max_size;
        self
    }

    pub fn drain_pacing(mut self, pacing: Duration) -> Self {
        self.queue.drain_pacing = pacing;
        self
    }

    /// Disable sleep detection
    pub fn no_sleep(mut self) -> Self {
        self.no_sleep = true;
        self
    }

    pub fn reachability_monitor(mut self, enabled: bool) -> Self {
        self.reachability_monitor = enabled;
        self
    }

    /// Disable the warm-up throttle
    pub fn disable_throttle(mut self) -> Self {
        self.throttle_enabled = false;
        self
    }

    pub fn throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    pub fn throttle_pass_every(mut self, n: u32) -> Self {
        self.throttle_pass_every = n.max(1);
        self
    }

    /// Sleep/throttle rules for lossy links
    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            sleep_enabled: !self.no_sleep,
            require_ack: self.reachability_monitor,
            sleep_timeout: self.sleep_timeout,
            unreachable_window: self.unreachable_window,
            throttle_enabled: self.throttle_enabled,
            throttle_window: self.throttle_window,
        }
    }
}
