//! Traffic table configuration

use std::collections::HashMap;
use std::time::Duration;

use super::record::TrafficSource;

/// Traffic table configuration options
#[derive(Debug, Clone)]
pub struct TrafficConfig {
    /// Records not seen for this long are evicted
    pub timeout: Duration,

    /// Per-source eviction windows overriding `timeout`
    pub source_timeouts: HashMap<TrafficSource, Duration>,

    /// Reject positions farther than this from ownship (meters)
    pub max_range_m: f64,

    /// Reject reports whose timestamp is older than this
    pub max_report_age: Duration,

    /// Reject reports whose timestamp is further in the future than this
    pub max_future_skew: Duration,

    /// A faster source's position/velocity wins over slower sources for this long
    pub source_preference_window: Duration,

    /// Only records fresher than this are encoded as traffic reports
    pub report_max_age: Duration,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            source_timeouts: HashMap::new(),
            max_range_m: 150_000.0,
            max_report_age: Duration::from_secs(30),
            max_future_skew: Duration::from_secs(2),
            source_preference_window: Duration::from_secs(5),
            report_max_age: Duration::from_secs(6),
        }
    }
}

impl TrafficConfig {
    /// Set the default eviction timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an eviction timeout for one source
    pub fn source_timeout(mut self, source: TrafficSource, timeout: Duration) -> Self {
        self.source_timeouts.insert(source, timeout);
        self
    }

    /// Set the maximum plausible range from ownship in kilometers
    pub fn max_range_km(mut self, km: f64) -> Self {
        self.max_range_m = km * 1000.0;
        self
    }

    pub fn max_report_age(mut self, age: Duration) -> Self {
        self.max_report_age = age;
        self
    }

    pub fn max_future_skew(mut self, skew: Duration) -> Self {
        self.max_future_skew = skew;
        self
    }

    pub fn source_preference_window(mut self, window: Duration) -> Self {
        self.source_preference_window = window;
        self
    }

    pub fn report_max_age(mut self, age: Duration) -> Self {
        self.report_max_age = age;
        self
    }

    /// Eviction timeout that applies to records last updated by `source`
    pub fn timeout_for(&self, source: TrafficSource) -> Duration {
        self.source_timeouts
            .get(&source)
            .copied()
            .unwrap_or(self.timeout)
    }
}
