//! Destination capability mask

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Which message families a destination wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    /// Standard GDL90 (heartbeat, ownship, traffic, uplink)
    pub const GDL90: Capabilities = Capabilities(0x01);
    /// AHRS in flight-simulator (X-Plane) format
    pub const AHRS_FFSIM: Capabilities = Capabilities(0x02);
    /// AHRS as a GDL90 extension message
    pub const AHRS_GDL90: Capabilities = Capabilities(0x04);
    /// FLARM-compatible NMEA
    pub const FLARM_NMEA: Capabilities = Capabilities(0x08);
    /// Position in flight-simulator format
    pub const POSITION_FFSIM: Capabilities = Capabilities(0x10);

    pub const fn from_bits(bits: u8) -> Self {
        Capabilities(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if any bit of `other` is set in `self`
    pub const fn accepts(self, other: Capabilities) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self {
        Capabilities(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Capabilities, &str); 5] = [
            (Capabilities::GDL90, "GDL90"),
            (Capabilities::AHRS_FFSIM, "AHRS_FFSIM"),
            (Capabilities::AHRS_GDL90, "AHRS_GDL90"),
            (Capabilities::FLARM_NMEA, "FLARM_NMEA"),
            (Capabilities::POSITION_FFSIM, "POSITION_FFSIM"),
        ];
        let mut first = true;
        for (cap, name) in NAMES {
            if self.accepts(cap) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}
