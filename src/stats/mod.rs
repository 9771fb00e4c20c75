//! Statistics

pub mod metrics;

pub use metrics::{DeliveryStats, StatsSnapshot};
