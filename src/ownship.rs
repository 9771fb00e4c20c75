//! Ownship state
//!
//! GPS and AHRS drivers are external; they push their latest fix into a
//! shared [`SituationStore`]. The dispatcher reads a copy once per cycle to
//! build heartbeat, ownship and AHRS messages.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::traffic::GeoPoint;

/// Attitude from an AHRS, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub heading_deg: f64,
    pub heading_is_magnetic: bool,
    pub indicated_airspeed_kt: Option<f64>,
    pub true_airspeed_kt: Option<f64>,
}

/// Latest known ownship state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Situation {
    /// GPS has a usable fix
    pub gps_valid: bool,
    pub position: Option<GeoPoint>,
    /// Pressure altitude from a baro sensor
    pub pressure_altitude_ft: Option<f64>,
    /// GPS altitude above mean sea level
    pub msl_altitude_ft: Option<f64>,
    /// GPS altitude above the WGS-84 ellipsoid
    pub hae_altitude_ft: Option<f64>,
    /// Vertical accuracy in meters
    pub vertical_accuracy_m: Option<f64>,
    /// Degrees true
    pub track_deg: Option<f64>,
    /// Knots
    pub ground_speed_kt: Option<f64>,
    /// Feet per minute
    pub vertical_speed_fpm: Option<f64>,
    pub nacp: u8,
    pub on_ground: bool,
    pub attitude: Option<Attitude>,
}

impl Situation {
    /// Position when the GPS fix is valid
    pub fn valid_position(&self) -> Option<GeoPoint> {
        if self.gps_valid {
            self.position
        } else {
            None
        }
    }

    /// Altitude used for the ownship report: baro if present, else GPS MSL
    pub fn report_altitude_ft(&self) -> Option<f64> {
        self.pressure_altitude_ft.or(self.msl_altitude_ft)
    }
}

/// Identity settings for the ownship report
#[derive(Debug, Clone)]
pub struct OwnshipConfig {
    /// Our own ICAO address; self-assigned 0xF00000 is used when unset
    pub icao_address: Option<u32>,
    /// Callsign for the ownship report
    pub callsign: String,
    /// ICAO addresses that belong to ownship and are never sent as traffic
    pub ownship_addresses: Vec<u32>,
    /// Short device name for the ForeFlight ID message (8 chars max)
    pub device_name: String,
    /// Long device name for the ForeFlight ID message (16 chars max)
    pub device_long_name: String,
}

impl Default for OwnshipConfig {
    fn default() -> Self {
        Self {
            icao_address: None,
            callsign: String::from("HUB"),
            ownship_addresses: Vec::new(),
            device_name: String::from("TrafHub"),
            device_long_name: String::from("Traffic Hub"),
        }
    }
}

impl OwnshipConfig {
    pub fn icao_address(mut self, address: u32) -> Self {
        let address = address & 0x00FF_FFFF;
        self.icao_address = Some(address);
        if !self.ownship_addresses.contains(&address) {
            self.ownship_addresses.push(address);
        }
        self
    }

    pub fn callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = callsign.into();
        self
    }

    /// Mark another address as ownship (e.g. a portable transponder)
    pub fn ownship_address(mut self, address: u32) -> Self {
        let address = address & 0x00FF_FFFF;
        if !self.ownship_addresses.contains(&address) {
            self.ownship_addresses.push(address);
        }
        self
    }

    pub fn device_name(mut self, short: impl Into<String>, long: impl Into<String>) -> Self {
        self.device_name = short.into();
        self.device_long_name = long.into();
        self
    }

    pub fn is_ownship(&self, address: u32) -> bool {
        self.ownship_addresses.contains(&(address & 0x00FF_FFFF))
    }
}

/// Shared, cloneable handle to the current [`Situation`]
#[derive(Debug, Clone, Default)]
pub struct SituationStore {
    inner: Arc<RwLock<Situation>>,
}

impl SituationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole situation
    pub fn set(&self, situation: Situation) {
        *self.inner.write() = situation;
    }

    /// Apply a partial change under the lock
    pub fn update<F: FnOnce(&mut Situation)>(&self, f: F) {
        f(&mut self.inner.write());
    }

    /// Copy of the current situation
    pub fn get(&self) -> Situation {
        self.inner.read().clone()
    }
}
