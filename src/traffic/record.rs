//! Traffic record and update types
//!
//! A [`TrafficUpdate`] is the normalized value every ingestion adapter
//! (1090ES, UAT, FLARM, OGN, AIS, Cursor-on-Target) produces. The table
//! merges it into a [`TrafficRecord`] keyed by [`TrafficKey`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::geo::GeoPoint;

/// GDL90 traffic address type (low nibble of report byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// ADS-B with ICAO address
    AdsbIcao = 0,
    /// ADS-B with self-assigned address
    AdsbSelfAssigned = 1,
    /// TIS-B with ICAO address
    TisbIcao = 2,
    /// TIS-B with track file ID
    TisbTrackFile = 3,
    /// Surface vehicle
    SurfaceVehicle = 4,
    /// Ground station beacon
    GroundStationBeacon = 5,
}

impl AddressType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(AddressType::AdsbIcao),
            1 => Some(AddressType::AdsbSelfAssigned),
            2 => Some(AddressType::TisbIcao),
            3 => Some(AddressType::TisbTrackFile),
            4 => Some(AddressType::SurfaceVehicle),
            5 => Some(AddressType::GroundStationBeacon),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Which 24-bit address space this type draws from
    pub fn space(self) -> AddressSpace {
        match self {
            AddressType::AdsbIcao | AddressType::TisbIcao => AddressSpace::Icao,
            _ => AddressSpace::NonIcao,
        }
    }
}

/// The two 24-bit address spaces
///
/// The same raw value in different spaces identifies different targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressSpace {
    Icao,
    NonIcao,
}

impl AddressSpace {
    pub fn other(self) -> Self {
        match self {
            AddressSpace::Icao => AddressSpace::NonIcao,
            AddressSpace::NonIcao => AddressSpace::Icao,
        }
    }

    /// Address type used when a report only tells us the space
    pub fn default_type(self) -> AddressType {
        match self {
            AddressSpace::Icao => AddressType::AdsbIcao,
            AddressSpace::NonIcao => AddressType::AdsbSelfAssigned,
        }
    }
}

/// Table key: address space + 24-bit address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrafficKey {
    pub space: AddressSpace,
    pub address: u32,
}

impl TrafficKey {
    pub fn new(space: AddressSpace, address: u32) -> Self {
        Self {
            space,
            address: address & 0x00FF_FFFF,
        }
    }

    pub fn icao(address: u32) -> Self {
        Self::new(AddressSpace::Icao, address)
    }

    pub fn non_icao(address: u32) -> Self {
        Self::new(AddressSpace::NonIcao, address)
    }

    /// Same raw address in the other space
    pub fn flipped(&self) -> Self {
        Self::new(self.space.other(), self.address)
    }
}

impl fmt::Display for TrafficKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.space {
            AddressSpace::Icao => write!(f, "ICAO:{:06X}", self.address),
            AddressSpace::NonIcao => write!(f, "OTHER:{:06X}", self.address),
        }
    }
}

/// Where a report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficSource {
    /// 1090 MHz extended squitter / Mode S
    Es1090,
    /// 978 MHz UAT
    Uat,
    /// FLARM (serial NMEA or decoded radio)
    Flarm,
    /// Open Glider Network
    Ogn,
    /// PilotAware
    Paw,
    /// FANET
    Fanet,
    /// AIS (vessels)
    Ais,
    /// Cursor-on-Target
    CursorOnTarget,
}

impl TrafficSource {
    /// Lower is fresher. Used to prefer low-latency receivers for
    /// position and velocity.
    pub fn latency_rank(self) -> u8 {
        match self {
            TrafficSource::Es1090 | TrafficSource::Uat => 0,
            TrafficSource::Flarm => 1,
            _ => 2,
        }
    }

    /// PilotAware and FANET carry no trustworthy ICAO/non-ICAO bit.
    pub fn has_reliable_address_type(self) -> bool {
        !matches!(self, TrafficSource::Paw | TrafficSource::Fanet)
    }

    pub fn tag(self) -> &'static str {
        match self {
            TrafficSource::Es1090 => "1090ES",
            TrafficSource::Uat => "UAT",
            TrafficSource::Flarm => "FLARM",
            TrafficSource::Ogn => "OGN",
            TrafficSource::Paw => "PAW",
            TrafficSource::Fanet => "FANET",
            TrafficSource::Ais => "AIS",
            TrafficSource::CursorOnTarget => "COT",
        }
    }
}

impl fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A normalized, partial position report from any source
///
/// Every field except `source` and `address` is optional. Fields left
/// `None` never overwrite what the table already knows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficUpdate {
    pub source: TrafficSource,
    /// 24-bit address (upper bits are ignored)
    pub address: u32,
    /// Source's opinion on the address type
    pub address_type: Option<AddressType>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Altitude in feet
    pub altitude_ft: Option<i32>,
    /// `altitude_ft` is GNSS rather than pressure altitude
    pub altitude_is_gnss: bool,
    /// Degrees true
    pub track_deg: Option<f64>,
    /// Knots
    pub speed_kt: Option<f64>,
    /// Feet per minute
    pub vertical_rate_fpm: Option<f64>,
    pub callsign: Option<String>,
    pub emitter_category: Option<u8>,
    pub on_ground: Option<bool>,
    pub nic: Option<u8>,
    pub nacp: Option<u8>,
    /// Emergency/priority code (0 = none)
    pub emergency: Option<u8>,
    /// Time the source observed the target, if it says
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrafficUpdate {
    /// Create an empty update for an address
    pub fn new(source: TrafficSource, address: u32) -> Self {
        Self {
            source,
            address: address & 0x00FF_FFFF,
            address_type: None,
            lat: None,
            lon: None,
            altitude_ft: None,
            altitude_is_gnss: false,
            track_deg: None,
            speed_kt: None,
            vertical_rate_fpm: None,
            callsign: None,
            emitter_category: None,
            on_ground: None,
            nic: None,
            nacp: None,
            emergency: None,
            timestamp: None,
        }
    }

    pub fn address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = Some(address_type);
        self
    }

    pub fn position(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn altitude(mut self, feet: i32, is_gnss: bool) -> Self {
        self.altitude_ft = Some(feet);
        self.altitude_is_gnss = is_gnss;
        self
    }

    pub fn velocity(mut self, track_deg: f64, speed_kt: f64) -> Self {
        self.track_deg = Some(track_deg);
        self.speed_kt = Some(speed_kt);
        self
    }

    pub fn vertical_rate(mut self, fpm: f64) -> Self {
        self.vertical_rate_fpm = Some(fpm);
        self
    }

    pub fn callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = Some(callsign.into());
        self
    }

    pub fn emitter_category(mut self, category: u8) -> Self {
        self.emitter_category = Some(category);
        self
    }

    pub fn on_ground(mut self, on_ground: bool) -> Self {
        self.on_ground = Some(on_ground);
        self
    }

    pub fn accuracy(mut self, nic: u8, nacp: u8) -> Self {
        self.nic = Some(nic);
        self.nacp = Some(nacp);
        self
    }

    pub fn emergency(mut self, code: u8) -> Self {
        self.emergency = Some(code);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Position as a point, if both halves are present and not (0,0)
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if !(lat == 0.0 && lon == 0.0) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    pub fn has_position(&self) -> bool {
        self.point().is_some() || self.altitude_ft.is_some()
    }

    pub fn has_velocity(&self) -> bool {
        self.track_deg.is_some() || self.speed_kt.is_some() || self.vertical_rate_fpm.is_some()
    }

    pub fn has_identity(&self) -> bool {
        self.callsign.as_deref().is_some_and(|c| !c.trim().is_empty())
            || self.emitter_category.is_some_and(|c| c != 0)
    }

    /// Whether the update carries anything worth merging
    pub fn is_substantive(&self) -> bool {
        self.has_position() || self.has_velocity() || self.has_identity()
    }

    /// The key this update would use on its own, without collision handling
    pub fn natural_key(&self) -> TrafficKey {
        let space = self
            .address_type
            .map(AddressType::space)
            .unwrap_or(AddressSpace::Icao);
        TrafficKey::new(space, self.address)
    }
}

/// Merged view of one aircraft/vessel
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    pub key: TrafficKey,
    pub address_type: AddressType,
    /// Last accepted position; `None` until one is reported
    pub position: Option<GeoPoint>,
    pub altitude_ft: Option<i32>,
    pub altitude_is_gnss: bool,
    pub track_deg: Option<f64>,
    /// `None` means speed is not valid
    pub speed_kt: Option<f64>,
    pub vertical_rate_fpm: Option<f64>,
    pub callsign: Option<String>,
    pub emitter_category: u8,
    pub on_ground: bool,
    pub nic: u8,
    pub nacp: u8,
    pub emergency: u8,
    /// Source of the most recent accepted update
    pub source: TrafficSource,
    /// Source that supplied `callsign`
    pub callsign_source: Option<TrafficSource>,
    /// Source and time of the last position/velocity fix
    pub kinematics_source: Option<TrafficSource>,
    pub kinematics_updated: Option<Instant>,
    pub last_seen: Instant,

    // Derived at snapshot time
    pub age: Duration,
    pub distance_m: Option<f64>,
    pub bearing_deg: Option<f64>,
}

impl TrafficRecord {
    pub(crate) fn new(key: TrafficKey, address_type: AddressType, source: TrafficSource, now: Instant) -> Self {
        Self {
            key,
            address_type,
            position: None,
            altitude_ft: None,
            altitude_is_gnss: false,
            track_deg: None,
            speed_kt: None,
            vertical_rate_fpm: None,
            callsign: None,
            emitter_category: 0,
            on_ground: false,
            nic: 0,
            nacp: 0,
            emergency: 0,
            source,
            callsign_source: None,
            kinematics_source: None,
            kinematics_updated: None,
            last_seen: now,
            age: Duration::ZERO,
            distance_m: None,
            bearing_deg: None,
        }
    }

    pub fn address(&self) -> u32 {
        self.key.address
    }

    pub fn position_valid(&self) -> bool {
        self.position.is_some()
    }

    pub fn speed_valid(&self) -> bool {
        self.speed_kt.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_space() {
        assert_eq!(AddressType::AdsbIcao.space(), AddressSpace::Icao);
        assert_eq!(AddressType::TisbIcao.space(), AddressSpace::Icao);
        assert_eq!(AddressType::AdsbSelfAssigned.space(), AddressSpace::NonIcao);
        assert_eq!(AddressType::TisbTrackFile.space(), AddressSpace::NonIcao);
        assert_eq!(AddressType::from_u8(3), Some(AddressType::TisbTrackFile));
        assert_eq!(AddressType::from_u8(9), None);
    }

    #[test]
    fn test_key_masks_address_and_formats() {
        let key = TrafficKey::icao(0x01AB_CDEF);
        assert_eq!(key.address, 0xABCDEF);
        assert_eq!(key.to_string(), "ICAO:ABCDEF");
        assert_eq!(key.flipped().to_string(), "OTHER:ABCDEF");
    }

    #[test]
    fn test_update_substance() {
        let empty = TrafficUpdate::new(TrafficSource::Es1090, 0xABCDEF);
        assert!(!empty.is_substantive());

        let blank_callsign = TrafficUpdate::new(TrafficSource::Ogn, 1).callsign("   ");
        assert!(!blank_callsign.is_substantive());

        let null_island = TrafficUpdate::new(TrafficSource::Ogn, 1).position(0.0, 0.0);
        assert!(!null_island.is_substantive());

        assert!(TrafficUpdate::new(TrafficSource::Flarm, 1).position(42.0, -83.0).is_substantive());
        assert!(TrafficUpdate::new(TrafficSource::Flarm, 1).vertical_rate(500.0).is_substantive());
        assert!(TrafficUpdate::new(TrafficSource::Flarm, 1).callsign("N123AB").is_substantive());
    }

    #[test]
    fn test_natural_key() {
        let icao = TrafficUpdate::new(TrafficSource::Es1090, 0xABCDEF);
        assert_eq!(icao.natural_key(), TrafficKey::icao(0xABCDEF));

        let flarm = TrafficUpdate::new(TrafficSource::Flarm, 0xABCDEF)
            .address_type(AddressType::AdsbSelfAssigned);
        assert_eq!(flarm.natural_key(), TrafficKey::non_icao(0xABCDEF));
    }

    #[test]
    fn test_source_ranking() {
        assert!(TrafficSource::Es1090.latency_rank() < TrafficSource::Flarm.latency_rank());
        assert!(TrafficSource::Flarm.latency_rank() < TrafficSource::Ogn.latency_rank());
        assert!(!TrafficSource::Paw.has_reliable_address_type());
        assert!(TrafficSource::Flarm.has_reliable_address_type());
    }
}
