//! GDL90 wire protocol
//!
//! Pure, stateless encoding. The only shared state is the CRC table, which
//! is built at compile time.

pub mod constants;
pub mod crc;
pub mod framing;
pub mod gdl90;

pub use crc::crc16;
pub use framing::{frame_message, split_frames, stuff, unframe, unstuff};
pub use gdl90::{
    decode_lat_lon, decode_report, encode_device_heartbeat, encode_foreflight_ahrs,
    encode_foreflight_id, encode_heartbeat, encode_lat_lon, encode_ownship_geo_altitude,
    encode_ownship_report, encode_traffic_report, encode_uplink, DecodedReport,
};
