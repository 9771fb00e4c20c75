//! GDL90 traffic hub
//!
//! Fuses traffic reports from several receivers (1090ES, UAT, FLARM, ...)
//! into one table, encodes them as GDL90 and delivers the result to every
//! connected EFB app, adapting to each client's sleep and warm-up state.
//!
//! ```text
//!   receivers ──► TrafficTable::upsert
//!                      │
//!                 [1 Hz Dispatcher]──► GDL90 encode ──► ConnectionRegistry
//!                                                          │
//!                                  ┌───────────────────────┼──────────────┐
//!                                  ▼                       ▼              ▼
//!                             UDP client              TCP client     serial/local
//!                         (sleep/throttle,
//!                          priority queue)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use traffic_hub::{
//!     ConnectionRegistry, DeliveryStats, Dispatcher, DispatcherConfig, NetworkConfig,
//!     SituationStore, TrafficTable,
//! };
//!
//! # async fn run() -> traffic_hub::Result<()> {
//! let registry = ConnectionRegistry::bind(NetworkConfig::default(), Arc::new(DeliveryStats::new())).await?;
//! registry.spawn_rescan_task();
//!
//! let table = Arc::new(TrafficTable::new());
//! let (dispatcher, _handle) = Dispatcher::new(
//!     Arc::clone(&table),
//!     SituationStore::new(),
//!     registry,
//!     DispatcherConfig::default(),
//! );
//! dispatcher.run().await;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod ownship;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod stats;
pub mod traffic;

pub use dispatch::{DispatchHandle, Dispatcher, DispatcherConfig, MessageKind, OutboundMessage};
pub use error::{Error, Result};
pub use ownship::{Attitude, OwnshipConfig, Situation, SituationStore};
pub use queue::PriorityQueue;
pub use server::{
    Capabilities, ConnectionKey, ConnectionRegistry, LivenessListener, NetworkConfig, NetworkOutput,
    TcpOutputListener,
};
pub use stats::{DeliveryStats, StatsSnapshot};
pub use traffic::{GeoPoint, TrafficConfig, TrafficKey, TrafficRecord, TrafficSource, TrafficTable, TrafficUpdate};
