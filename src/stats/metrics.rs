//! Delivery statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Counters shared by every connection and the dispatcher
///
/// All updates are relaxed atomics; readers take a [`StatsSnapshot`].
#[derive(Debug)]
pub struct DeliveryStats {
    started_at: Instant,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_errors: AtomicU64,
    frames_queued: AtomicU64,
    dropped_sleeping: AtomicU64,
    dropped_throttled: AtomicU64,
    queue_overflow: AtomicU64,
    handoff_dropped: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            frames_queued: AtomicU64::new(0),
            dropped_sleeping: AtomicU64::new(0),
            dropped_throttled: AtomicU64::new(0),
            queue_overflow: AtomicU64::new(0),
            handoff_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.frames_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_sleeping(&self) {
        self.dropped_sleeping.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_throttled(&self) {
        self.dropped_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self, dropped: usize) {
        self.queue_overflow.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn record_handoff_dropped(&self) {
        self.handoff_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            dropped_sleeping: self.dropped_sleeping.load(Ordering::Relaxed),
            dropped_throttled: self.dropped_throttled.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            handoff_dropped: self.handoff_dropped.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`DeliveryStats`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Frames written to a transport
    pub frames_sent: u64,
    /// Bytes written to a transport
    pub bytes_sent: u64,
    /// Failed writes (any transport)
    pub write_errors: u64,
    /// Frames parked in a connection queue
    pub frames_queued: u64,
    /// Non-queueable frames dropped for sleeping links
    pub dropped_sleeping: u64,
    /// Non-queueable frames dropped for throttled links
    pub dropped_throttled: u64,
    /// Queued frames dropped to keep a queue within capacity
    pub queue_overflow: u64,
    /// Frames dropped because the hand-off channel was full
    pub handoff_dropped: u64,
    /// Time since the counters were created
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Average output bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }

    /// Counters accumulated since `earlier`
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.saturating_sub(earlier.frames_sent),
            bytes_sent: self.bytes_sent.saturating_sub(earlier.bytes_sent),
            write_errors: self.write_errors.saturating_sub(earlier.write_errors),
            frames_queued: self.frames_queued.saturating_sub(earlier.frames_queued),
            dropped_sleeping: self.dropped_sleeping.saturating_sub(earlier.dropped_sleeping),
            dropped_throttled: self.dropped_throttled.saturating_sub(earlier.dropped_throttled),
            queue_overflow: self.queue_overflow.saturating_sub(earlier.queue_overflow),
            handoff_dropped: self.handoff_dropped.saturating_sub(earlier.handoff_dropped),
            uptime: self.uptime.saturating_sub(earlier.uptime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let snap = DeliveryStats::new().snapshot();
        assert_eq!(snap.frames_sent, 0);
        assert_eq!(snap.bytes_sent, 0);
        assert_eq!(snap.write_errors, 0);
        assert_eq!(snap.frames_queued, 0);
        assert_eq!(snap.queue_overflow, 0);
    }

    #[test]
    fn test_counters() {
        let stats = DeliveryStats::new();
        stats.record_sent(100);
        stats.record_sent(28);
        stats.record_write_error();
        stats.record_queued();
        stats.record_dropped_sleeping();
        stats.record_dropped_throttled();
        stats.record_overflow(3);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.bytes_sent, 128);
        assert_eq!(snap.write_errors, 1);
        assert_eq!(snap.frames_queued, 1);
        assert_eq!(snap.dropped_sleeping, 1);
        assert_eq!(snap.dropped_throttled, 1);
        assert_eq!(snap.queue_overflow, 3);
    }

    #[test]
    fn test_bitrate() {
        let snap = StatsSnapshot {
            bytes_sent: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };
        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(snap.bitrate(), 800_000);

        let zero = StatsSnapshot {
            bytes_sent: 1_000_000,
            ..Default::default()
        };
        assert_eq!(zero.bitrate(), 0);
    }

    #[test]
    fn test_since() {
        let earlier = StatsSnapshot {
            frames_sent: 10,
            bytes_sent: 500,
            uptime: Duration::from_secs(5),
            ..Default::default()
        };
        let later = StatsSnapshot {
            frames_sent: 15,
            bytes_sent: 800,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };

        let delta = later.since(&earlier);
        assert_eq!(delta.frames_sent, 5);
        assert_eq!(delta.bytes_sent, 300);
        assert_eq!(delta.uptime, Duration::from_secs(5));
    }
}
