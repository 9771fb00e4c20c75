//! Output side: destinations, their links and how they are discovered

pub mod capabilities;
pub mod config;
pub mod connection;
pub mod lease;
pub mod link;
pub mod listener;
pub mod registry;
pub mod transport;

pub use capabilities::Capabilities;
pub use config::{NetworkConfig, NetworkOutput, QueueConfig};
pub use connection::{Connection, ConnectionKey, Delivery};
pub use lease::{LeaseSource, StaticLeases, SystemLeases};
pub use link::{LinkPolicy, LinkState, LinkStatus, LivenessEvent};
pub use listener::{LivenessListener, TcpOutputListener};
pub use registry::{ConnectionRegistry, SyncReport};
pub use transport::Transport;
