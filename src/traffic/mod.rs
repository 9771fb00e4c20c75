//! Traffic fusion
//!
//! Normalized reports from every ingestion source are merged into one
//! table keyed by address space and 24-bit address.

pub mod config;
pub mod geo;
pub mod record;
pub mod table;

pub use config::TrafficConfig;
pub use geo::GeoPoint;
pub use record::{AddressSpace, AddressType, TrafficKey, TrafficRecord, TrafficSource, TrafficUpdate};
pub use table::TrafficTable;
