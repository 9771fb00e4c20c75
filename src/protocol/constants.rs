//! GDL90 protocol constants
//!
//! Values from the GDL 90 Data Interface Specification (560-1058-00 Rev A)
//! and the ForeFlight GDL90 extension.

/// Frame delimiter
pub const FLAG_BYTE: u8 = 0x7E;

/// Escape prefix for stuffed bytes
pub const CONTROL_ESCAPE: u8 = 0x7D;

/// XOR mask applied to an escaped byte
pub const ESCAPE_XOR: u8 = 0x20;

/// CRC-16-CCITT generator polynomial
pub const CRC16_POLY: u16 = 0x1021;

// Message IDs
pub const MSG_HEARTBEAT: u8 = 0x00;
pub const MSG_UPLINK: u8 = 0x07;
pub const MSG_OWNSHIP_REPORT: u8 = 0x0A;
pub const MSG_OWNSHIP_GEO_ALTITUDE: u8 = 0x0B;
pub const MSG_TRAFFIC_REPORT: u8 = 0x14;
pub const MSG_FOREFLIGHT: u8 = 0x65;
pub const MSG_DEVICE_HEARTBEAT: u8 = 0xCC;

// ForeFlight sub-IDs
pub const FOREFLIGHT_ID: u8 = 0x00;
pub const FOREFLIGHT_AHRS: u8 = 0x01;

// Payload sizes (before CRC and stuffing)
pub const HEARTBEAT_LEN: usize = 7;
pub const REPORT_LEN: usize = 28;
pub const GEO_ALTITUDE_LEN: usize = 5;
pub const FOREFLIGHT_ID_LEN: usize = 39;
pub const FOREFLIGHT_AHRS_LEN: usize = 12;
pub const DEVICE_HEARTBEAT_LEN: usize = 2;

/// Uplink payload carried by one UAT ground uplink frame
pub const UPLINK_PAYLOAD_LEN: usize = 432;

// Heartbeat status byte 1
pub const HB_UAT_INITIALIZED: u8 = 0x01;
pub const HB_ADDR_TALKBACK: u8 = 0x10;
pub const HB_GPS_VALID: u8 = 0x80;

// Heartbeat status byte 2
pub const HB_UTC_OK: u8 = 0x01;

/// Degrees per count of a 24-bit latitude/longitude field
pub const LAT_LON_RESOLUTION: f64 = 180.0 / 8_388_608.0;

/// Degrees per count of the 8-bit track field
pub const TRACK_RESOLUTION: f64 = 360.0 / 256.0;

/// Feet per count of the 12-bit pressure altitude field
pub const ALTITUDE_RESOLUTION_FT: i32 = 25;

/// Offset (feet) added before quantizing pressure altitude
pub const ALTITUDE_OFFSET_FT: i32 = 1000;

/// Highest encodable altitude count (0xFFF is reserved for "invalid")
pub const ALTITUDE_MAX: u16 = 0xFFE;

/// Pressure altitude unavailable
pub const ALTITUDE_INVALID: u16 = 0xFFF;

/// Highest encodable horizontal speed in knots (0xFFF means "unavailable")
pub const SPEED_MAX: u16 = 0xFFE;

/// Horizontal speed unavailable
pub const SPEED_INVALID: u16 = 0xFFF;

/// Feet per minute per count of the vertical velocity field
pub const VERTICAL_RATE_RESOLUTION_FPM: f64 = 64.0;

/// Vertical velocity unavailable
pub const VERTICAL_RATE_INVALID: u16 = 0x800;

/// Largest vertical velocity magnitude in counts (+/- 32,640 fpm)
pub const VERTICAL_RATE_LIMIT: i16 = 0x1FE;

/// Feet per count of the geometric altitude field
pub const GEO_ALTITUDE_RESOLUTION_FT: f64 = 5.0;

/// Vertical figure of merit unavailable
pub const VFOM_INVALID: u16 = 0x7FFF;

/// Largest representable vertical figure of merit in meters
pub const VFOM_MAX: u16 = 0x7FFE;

// Traffic/ownship misc nibble (low nibble of byte 12)
pub const MISC_TRUE_TRACK: u8 = 0x01;
pub const MISC_AIRBORNE: u8 = 0x08;

/// Traffic alert status bit in byte 1
pub const TRAFFIC_ALERT: u8 = 0x10;

/// Distance under which traffic is flagged as an alert (2 NM)
pub const TRAFFIC_ALERT_DISTANCE_M: f64 = 3704.0;

/// Callsign field width
pub const CALLSIGN_LEN: usize = 8;

/// Byte written for padding and for any character outside the callsign alphabet
pub const CALLSIGN_FILLER: u8 = b' ';

/// Lower-case placeholders some EFBs interpret as source markers
pub const CALLSIGN_PLACEHOLDERS: &[u8] = b"eurat";

/// Address used for ownship when no ICAO address is configured
pub const SELF_ASSIGNED_ADDRESS: u32 = 0xF0_0000;

/// AHRS angle field unavailable
pub const AHRS_ANGLE_INVALID: i16 = 0x7FFF;

/// AHRS airspeed field unavailable
pub const AHRS_AIRSPEED_INVALID: u16 = 0xFFFF;

/// Protocol version advertised in the device heartbeat
pub const DEVICE_PROTOCOL_VERSION: u8 = 1;

/// Default UDP port EFB applications listen on
pub const DEFAULT_GDL90_PORT: u16 = 4000;

/// Default UDP port for client receive/sleep signaling
pub const DEFAULT_LIVENESS_PORT: u16 = 4001;

/// Maximum traffic reports batched into a single datagram
pub const MAX_TRAFFIC_REPORTS_PER_PACKET: usize = 35;
