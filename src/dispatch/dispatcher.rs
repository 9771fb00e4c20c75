//! The 1 Hz output cycle
//!
//! ```text
//!   tick ──► table.evict ──► registry.refresh
//!        ──► heartbeat / device id / ownship / AHRS
//!        ──► table.snapshot ─► filter ─► encode ─► batch (35 per datagram)
//!        ──► for each connection: deliver()
//!
//!   hand-off rx ──► deliver()        (uplinks, out-of-band frames)
//!   stats tick  ──► log counters
//! ```
//!
//! All outbound frames pass through this one task.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::handle::DispatchHandle;
use crate::dispatch::message::{MessageKind, OutboundMessage};
use crate::ownship::{OwnshipConfig, Situation, SituationStore};
use crate::protocol::{
    encode_device_heartbeat, encode_foreflight_ahrs, encode_foreflight_id, encode_heartbeat,
    encode_ownship_geo_altitude, encode_ownship_report, encode_traffic_report,
};
use crate::server::{ConnectionRegistry, Delivery};
use crate::stats::{DeliveryStats, StatsSnapshot};
use crate::traffic::{AddressSpace, TrafficRecord, TrafficTable};

/// Traffic reports packed into one datagram
pub const TRAFFIC_BATCH_SIZE: usize = 35;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Output cycle period
    pub tick_interval: Duration,
    /// Stats log period
    pub stats_interval: Duration,
    /// Bounded hand-off channel capacity
    pub handoff_capacity: usize,
    /// Max traffic reports per datagram
    pub traffic_batch_size: usize,
    pub ownship: OwnshipConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            stats_interval: Duration::from_secs(5),
            handoff_capacity: 1024,
            traffic_batch_size: TRAFFIC_BATCH_SIZE,
            ownship: OwnshipConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity.max(1);
        self
    }

    pub fn traffic_batch_size(mut self, size: usize) -> Self {
        self.traffic_batch_size = size.max(1);
        self
    }

    pub fn ownship(mut self, ownship: OwnshipConfig) -> Self {
        self.ownship = ownship;
        self
    }
}

/// Per-message fan-out result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub sent: usize,
    /// Passed to a stream or serial client's writer task
    pub handed: usize,
    pub queued: usize,
    pub dropped: usize,
    pub filtered: usize,
    pub closed: usize,
}

pub struct Dispatcher {
    table: Arc<TrafficTable>,
    situation: SituationStore,
    registry: Arc<ConnectionRegistry>,
    config: DispatcherConfig,
    stats: Arc<DeliveryStats>,
    rx: mpsc::Receiver<OutboundMessage>,
}

impl Dispatcher {
    pub fn new(
        table: Arc<TrafficTable>,
        situation: SituationStore,
        registry: Arc<ConnectionRegistry>,
        config: DispatcherConfig,
    ) -> (Self, DispatchHandle) {
        let stats = Arc::clone(registry.stats());
        let (tx, rx) = mpsc::channel(config.handoff_capacity.max(1));
        let handle = DispatchHandle::new(tx, Arc::clone(&stats));

        let dispatcher = Self {
            table,
            situation,
            registry,
            config,
            stats,
            rx,
        };
        (dispatcher, handle)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Build every message for one cycle, in send order
    pub fn build_cycle(&self, situation: &Situation, now: Instant, wall: DateTime<Utc>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();

        out.push(OutboundMessage::new(
            MessageKind::Heartbeat,
            encode_heartbeat(wall, situation.gps_valid),
        ));
        out.push(OutboundMessage::new(
            MessageKind::DeviceHeartbeat,
            encode_device_heartbeat(situation.gps_valid, situation.attitude.is_some()),
        ));
        out.push(OutboundMessage::new(
            MessageKind::DeviceId,
            encode_foreflight_id(&self.config.ownship.device_name, &self.config.ownship.device_long_name),
        ));

        if let Some(frame) = encode_ownship_report(situation, &self.config.ownship) {
            out.push(OutboundMessage::new(MessageKind::Ownship, frame));
        }
        if let Some(frame) = encode_ownship_geo_altitude(situation) {
            out.push(OutboundMessage::new(MessageKind::OwnshipGeoAltitude, frame));
        }
        if let Some(attitude) = &situation.attitude {
            out.push(OutboundMessage::new(MessageKind::Ahrs, encode_foreflight_ahrs(attitude)));
        }

        out.extend(self.traffic_messages(situation, now));
        out
    }

    /// Traffic reports for fresh, positioned, non-ownship targets, batched
    fn traffic_messages(&self, situation: &Situation, now: Instant) -> Vec<OutboundMessage> {
        let max_age = self.table.config().report_max_age;
        let baro_offset = baro_offset_ft(situation);

        let frames: Vec<Bytes> = self
            .table
            .snapshot_at(now)
            .into_iter()
            .filter(|r| r.position_valid() && r.age <= max_age)
            .filter(|r| !self.is_ownship(r))
            .map(|mut r| {
                if let Some(offset) = baro_offset {
                    to_pressure_altitude(&mut r, offset);
                }
                encode_traffic_report(&r)
            })
            .collect();

        frames
            .chunks(self.config.traffic_batch_size.max(1))
            .map(|chunk| {
                let mut batch = BytesMut::with_capacity(chunk.iter().map(Bytes::len).sum());
                for frame in chunk {
                    batch.extend_from_slice(frame);
                }
                OutboundMessage::new(MessageKind::Traffic, batch.freeze())
            })
            .collect()
    }

    fn is_ownship(&self, record: &TrafficRecord) -> bool {
        record.key.space == AddressSpace::Icao && self.config.ownship.is_ownship(record.address())
    }

    /// Offer one message to every destination. Connections reported
    /// closed are removed from the registry.
    pub async fn deliver(&self, msg: &OutboundMessage, now: Instant) -> FanOut {
        let policy = msg.policy();
        let mut fan_out = FanOut::default();

        for conn in self.registry.connections().await {
            match conn.deliver(&msg.frame, policy, now).await {
                Delivery::Sent => fan_out.sent += 1,
                Delivery::Handed => fan_out.handed += 1,
                Delivery::Queued => fan_out.queued += 1,
                Delivery::Dropped => fan_out.dropped += 1,
                Delivery::Filtered => fan_out.filtered += 1,
                Delivery::Closed => {
                    fan_out.closed += 1;
                    self.registry.remove(conn.key()).await;
                }
            }
        }
        fan_out
    }

    /// One output cycle
    pub async fn tick(&self, now: Instant, wall: DateTime<Utc>) {
        let situation = self.situation.get();
        self.table.set_ownship_position(situation.valid_position());

        let evicted = self.table.evict(now);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.table.len(), "Evicted stale traffic");
        }
        self.registry.refresh(now).await;

        for msg in self.build_cycle(&situation, now, wall) {
            self.deliver(&msg, now).await;
        }
    }

    fn log_stats(&self, previous: &mut StatsSnapshot, connections: usize, awake: usize) {
        let current = self.stats.snapshot();
        let delta = current.since(previous);

        let mut counts: Vec<_> = self.table.count_by_source().into_iter().collect();
        counts.sort_by_key(|(source, _)| source.latency_rank());
        let traffic = counts
            .iter()
            .map(|(source, n)| format!("{}={}", source.tag(), n))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            traffic = %traffic,
            tracked = self.table.len(),
            connections,
            awake,
            frames = delta.frames_sent,
            bytes = delta.bytes_sent,
            queued = delta.frames_queued,
            dropped = delta.dropped_sleeping + delta.dropped_throttled,
            overflow = delta.queue_overflow,
            write_errors = delta.write_errors,
            bitrate = current.bitrate(),
            "Stats"
        );
        *previous = current;
    }

    /// Run until the task is dropped
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_tick = tokio::time::interval(self.config.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous = self.stats.snapshot();

        tracing::info!(interval = ?self.config.tick_interval, "Dispatcher started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick(Instant::now(), Utc::now()).await;
                }
                Some(msg) = self.rx.recv() => {
                    let fan_out = self.deliver(&msg, Instant::now()).await;
                    tracing::trace!(
                        kind = %msg.kind,
                        sent = fan_out.sent,
                        handed = fan_out.handed,
                        queued = fan_out.queued,
                        "Out-of-band message"
                    );
                }
                _ = stats_tick.tick() => {
                    let connections = self.registry.len().await;
                    let now = Instant::now();
                    let awake = self
                        .registry
                        .connections()
                        .await
                        .iter()
                        .filter(|c| c.status(now) == crate::server::LinkStatus::Awake)
                        .count();
                    self.log_stats(&mut previous, connections, awake);
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Offset from a traffic GNSS height to pressure altitude at ownship
///
/// Traffic GNSS altitudes are ellipsoid heights: the geoid separation
/// (HAE - MSL) comes off first, then the MSL to pressure difference is
/// applied. Without a HAE the separation is taken as zero.
fn baro_offset_ft(situation: &Situation) -> Option<f64> {
    let (baro, msl) = match (situation.pressure_altitude_ft, situation.msl_altitude_ft) {
        (Some(baro), Some(msl)) if situation.gps_valid && baro.is_finite() && msl.is_finite() => (baro, msl),
        _ => return None,
    };
    let geoid_sep = situation
        .hae_altitude_ft
        .filter(|hae| hae.is_finite())
        .map_or(0.0, |hae| hae - msl);
    Some(baro - msl - geoid_sep)
}

/// Shift a GNSS altitude onto the pressure altitude scale used for display
fn to_pressure_altitude(record: &mut TrafficRecord, offset_ft: f64) {
    if !record.altitude_is_gnss {
        return;
    }
    if let Some(alt) = record.altitude_ft {
        record.altitude_ft = Some((alt as f64 + offset_ft).round() as i32);
        record.altitude_is_gnss = false;
    }
}
