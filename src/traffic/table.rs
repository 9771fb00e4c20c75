//! Traffic fusion table
//!
//! The single writer-of-record for live traffic. Ingestion adapters hand
//! in [`TrafficUpdate`] values; the table validates them, resolves the
//! record they belong to and merges them field by field under one lock.
//!
//! ```text
//!  1090ES ──┐
//!  UAT    ──┤                   Mutex<TableInner>
//!  FLARM  ──┼─► upsert() ──►  ┌───────────────────────┐ ──► snapshot()
//!  OGN    ──┤                 │ records: HashMap<Key, │ ──► evict(now)
//!  AIS    ──┘                 │          Record>      │
//!                             │ ownship: GeoPoint     │
//!                             └───────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::config::TrafficConfig;
use super::geo::GeoPoint;
use super::record::{TrafficKey, TrafficRecord, TrafficSource, TrafficUpdate};

/// Largest magnitude accepted for latitude or longitude
const MAX_COORDINATE: f64 = 360.0;

/// Why an update was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Empty,
    BadCoordinates,
    OutOfRange,
    Stale,
    FromFuture,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Rejection::Empty => "no substantive fields",
            Rejection::BadCoordinates => "coordinates out of bounds",
            Rejection::OutOfRange => "too far from ownship",
            Rejection::Stale => "timestamp too old",
            Rejection::FromFuture => "timestamp in the future",
        }
    }
}

struct TableInner {
    records: HashMap<TrafficKey, TrafficRecord>,
    ownship: Option<GeoPoint>,
}

/// Address-keyed store of merged traffic records
pub struct TrafficTable {
    inner: Mutex<TableInner>,
    config: TrafficConfig,
}

impl TrafficTable {
    /// Create an empty table with default configuration
    pub fn new() -> Self {
        Self::with_config(TrafficConfig::default())
    }

    /// Create an empty table with custom configuration
    pub fn with_config(config: TrafficConfig) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                records: HashMap::new(),
                ownship: None,
            }),
            config,
        }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Update the ownship position used for range checks and derived
    /// distance/bearing. `None` disables the range check.
    pub fn set_ownship_position(&self, position: Option<GeoPoint>) {
        self.inner.lock().ownship = position;
    }

    /// Merge a report into the table
    ///
    /// Implausible or empty reports are dropped silently.
    pub fn upsert(&self, update: TrafficUpdate) {
        self.upsert_at(update, Instant::now(), Utc::now());
    }

    /// [`upsert`](Self::upsert) against explicit monotonic and wall clocks.
    /// Returns whether the update was accepted.
    pub fn upsert_at(&self, update: TrafficUpdate, now: Instant, wall: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();

        let seen_at = match self.validate(&update, inner.ownship, now, wall) {
            Ok(seen_at) => seen_at,
            Err(reason) => {
                tracing::debug!(
                    key = %update.natural_key(),
                    source = %update.source,
                    reason = reason.as_str(),
                    "Traffic update rejected"
                );
                return false;
            }
        };

        let key = resolve_key(&inner.records, &update);
        let window = self.config.source_preference_window;

        let record = inner.records.entry(key).or_insert_with(|| {
            let address_type = update
                .address_type
                .unwrap_or_else(|| key.space.default_type());
            tracing::debug!(key = %key, source = %update.source, "New traffic target");
            TrafficRecord::new(key, address_type, update.source, seen_at)
        });
        merge(record, &update, seen_at, window);

        tracing::trace!(key = %key, source = %update.source, "Traffic updated");
        true
    }

    /// Check plausibility and compute when the target was actually seen
    fn validate(
        &self,
        update: &TrafficUpdate,
        ownship: Option<GeoPoint>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Instant, Rejection> {
        if !update.is_substantive() {
            return Err(Rejection::Empty);
        }

        for v in [update.lat, update.lon].into_iter().flatten() {
            if !v.is_finite() || v.abs() > MAX_COORDINATE {
                return Err(Rejection::BadCoordinates);
            }
        }

        if let (Some(point), Some(own)) = (update.point(), ownship) {
            if own.distance_to(&point) > self.config.max_range_m {
                return Err(Rejection::OutOfRange);
            }
        }

        let Some(ts) = update.timestamp else {
            return Ok(now);
        };
        let age = wall.signed_duration_since(ts);
        match age.to_std() {
            // Not negative
            Ok(age) if age > self.config.max_report_age => Err(Rejection::Stale),
            Ok(age) => Ok(now.checked_sub(age).unwrap_or(now)),
            Err(_) => {
                let ahead = ts.signed_duration_since(wall).to_std().unwrap_or_default();
                if ahead > self.config.max_future_skew {
                    Err(Rejection::FromFuture)
                } else {
                    Ok(now)
                }
            }
        }
    }

    /// Point-in-time copy of every live record, sorted by key
    ///
    /// Age and distance/bearing are filled in relative to `now` and the
    /// current ownship position.
    pub fn snapshot(&self) -> Vec<TrafficRecord> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<TrafficRecord> {
        let inner = self.inner.lock();
        let mut out: Vec<TrafficRecord> = inner
            .records
            .values()
            .filter(|r| now.saturating_duration_since(r.last_seen) <= self.config.timeout_for(r.source))
            .map(|r| {
                let mut r = r.clone();
                r.age = now.saturating_duration_since(r.last_seen);
                match (inner.ownship, r.position) {
                    (Some(own), Some(pos)) => {
                        let (dist, bearing) = own.distance_bearing(&pos);
                        r.distance_m = Some(dist);
                        r.bearing_deg = Some(bearing);
                    }
                    _ => {
                        r.distance_m = None;
                        r.bearing_deg = None;
                    }
                }
                r
            })
            .collect();
        drop(inner);

        out.sort_by_key(|r| r.key);
        out
    }

    /// Remove every record not seen within its timeout. Returns the number removed.
    pub fn evict(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|key, r| {
            let keep = now.saturating_duration_since(r.last_seen) <= self.config.timeout_for(r.source);
            if !keep {
                tracing::debug!(key = %key, source = %r.source, "Traffic target expired");
            }
            keep
        });
        before - inner.records.len()
    }

    /// Number of tracked targets per last-reporting source
    pub fn count_by_source(&self) -> HashMap<TrafficSource, usize> {
        let inner = self.inner.lock();
        let mut counts = HashMap::new();
        for r in inner.records.values() {
            *counts.entry(r.source).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TrafficTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the record an update belongs to
///
/// Sources with a reliable address-type bit always use their own key.
/// Others merge onto the opposite address space when a record already
/// lives there, so one aircraft does not show up twice.
fn resolve_key(records: &HashMap<TrafficKey, TrafficRecord>, update: &TrafficUpdate) -> TrafficKey {
    let natural = update.natural_key();
    if update.source.has_reliable_address_type() || records.contains_key(&natural) {
        return natural;
    }
    let flipped = natural.flipped();
    if records.contains_key(&flipped) {
        flipped
    } else {
        natural
    }
}

/// Partial merge: fields absent from `update` keep their previous value
fn merge(record: &mut TrafficRecord, update: &TrafficUpdate, seen_at: Instant, window: std::time::Duration) {
    let has_kinematics = update.has_position() || update.has_velocity();

    // A slower source may not overwrite a recent fix from a faster one,
    // and a back-dated report never replaces a newer fix
    let kinematics_allowed = match (record.kinematics_source, record.kinematics_updated) {
        (_, Some(at)) if seen_at < at => false,
        (Some(prev), Some(at)) => {
            prev.latency_rank() >= update.source.latency_rank()
                || seen_at.saturating_duration_since(at) >= window
        }
        _ => true,
    };
    let mut merged = false;

    if has_kinematics && kinematics_allowed {
        merged = true;
        if let Some(point) = update.point() {
            record.position = Some(point);
        }
        if let Some(alt) = update.altitude_ft {
            record.altitude_ft = Some(alt);
            record.altitude_is_gnss = update.altitude_is_gnss;
        }
        if update.track_deg.is_some() {
            record.track_deg = update.track_deg;
        }
        if update.speed_kt.is_some() {
            record.speed_kt = update.speed_kt;
        }
        if update.vertical_rate_fpm.is_some() {
            record.vertical_rate_fpm = update.vertical_rate_fpm;
        }
        if let Some(on_ground) = update.on_ground {
            record.on_ground = on_ground;
        }
        if let Some(nic) = update.nic {
            record.nic = nic;
        }
        if let Some(nacp) = update.nacp {
            record.nacp = nacp;
        }
        record.kinematics_source = Some(update.source);
        record.kinematics_updated = Some(
            record
                .kinematics_updated
                .map_or(seen_at, |prev| prev.max(seen_at)),
        );
    }

    if let Some(callsign) = update.callsign.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let may_replace = record.callsign.is_none() || record.callsign_source == Some(update.source);
        if may_replace {
            record.callsign = Some(callsign.to_string());
            record.callsign_source = Some(update.source);
            merged = true;
        }
    }
    if let Some(category) = update.emitter_category.filter(|&c| c != 0) {
        record.emitter_category = category;
    }
    if let Some(code) = update.emergency {
        record.emergency = code;
    }
    if let Some(address_type) = update.address_type {
        if update.source.has_reliable_address_type() && address_type.space() == record.key.space {
            record.address_type = address_type;
        }
    }

    if merged {
        record.source = update.source;
    }
    record.last_seen = record.last_seen.max(seen_at);
}
