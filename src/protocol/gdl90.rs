//! GDL90 message encoders
//!
//! Every encoder returns a complete frame (flags, stuffing and CRC applied)
//! ready to be written to a transport. Field packing follows the GDL 90 ICD:
//!
//! ```text
//! Ownship (0x0A) / Traffic (0x14) report, 28 bytes
//!  0      id
//!  1      alert(4) | address type(4)
//!  2..5   24-bit address
//!  5..8   latitude   (24-bit signed, 180/2^23 deg)
//!  8..11  longitude  (24-bit signed, 180/2^23 deg)
//! 11..13  altitude(12) | misc(4)
//! 13      NIC(4) | NACp(4)
//! 14..17  speed(12) | vertical velocity(12)
//! 17      track
//! 18      emitter category
//! 19..27  callsign
//! 27      emergency(4) | spare(4)
//! ```
//!
//! Unknown values are written as the field's "invalid" sentinel, and
//! out-of-range values saturate rather than wrap.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Timelike, Utc};

use super::constants::*;
use super::framing::frame_message;
use crate::ownship::{Attitude, OwnshipConfig, Situation};
use crate::traffic::{AddressType, GeoPoint, TrafficRecord};

/// Emitter category written for ownship (light aircraft)
const OWNSHIP_EMITTER_CATEGORY: u8 = 1;

/// NIC written for ownship
const OWNSHIP_NIC: u8 = 8;

/// Quantize a latitude or longitude into a 24-bit two's complement field
pub fn encode_lat_lon(degrees: f64) -> [u8; 3] {
    let counts = (degrees / LAT_LON_RESOLUTION) as i32;
    let b = ((counts as u32) & 0x00FF_FFFF).to_be_bytes();
    [b[1], b[2], b[3]]
}

/// Inverse of [`encode_lat_lon`]
pub fn decode_lat_lon(bytes: [u8; 3]) -> f64 {
    let raw = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    // Sign-extend from 24 bits
    let counts = ((raw << 8) as i32) >> 8;
    counts as f64 * LAT_LON_RESOLUTION
}

/// 12-bit pressure altitude field, saturating at the representable range
pub fn encode_altitude(feet: Option<i32>) -> u16 {
    match feet {
        None => ALTITUDE_INVALID,
        Some(ft) => {
            let counts = (ft.saturating_add(ALTITUDE_OFFSET_FT)).div_euclid(ALTITUDE_RESOLUTION_FT);
            counts.clamp(0, ALTITUDE_MAX as i32) as u16
        }
    }
}

pub fn decode_altitude(raw: u16) -> Option<i32> {
    match raw & 0x0FFF {
        ALTITUDE_INVALID => None,
        v => Some(v as i32 * ALTITUDE_RESOLUTION_FT - ALTITUDE_OFFSET_FT),
    }
}

/// 12-bit horizontal speed in knots
pub fn encode_speed(knots: Option<f64>) -> u16 {
    match knots {
        Some(kt) if kt.is_finite() => kt.round().clamp(0.0, SPEED_MAX as f64) as u16,
        _ => SPEED_INVALID,
    }
}

/// 12-bit signed vertical velocity in 64 fpm units
pub fn encode_vertical_rate(fpm: Option<f64>) -> u16 {
    match fpm {
        Some(fpm) if fpm.is_finite() => {
            let limit = VERTICAL_RATE_LIMIT as f64;
            let counts = (fpm / VERTICAL_RATE_RESOLUTION_FPM).round().clamp(-limit, limit) as i16;
            (counts as u16) & 0x0FFF
        }
        _ => VERTICAL_RATE_INVALID,
    }
}

pub fn decode_vertical_rate(raw: u16) -> Option<i32> {
    match raw & 0x0FFF {
        VERTICAL_RATE_INVALID => None,
        v => Some(((((v as i16) << 4) >> 4) as i32) * VERTICAL_RATE_RESOLUTION_FPM as i32),
    }
}

/// 8-bit track, rounded to the nearest count and wrapped to [0, 360)
pub fn encode_track(degrees: Option<f64>) -> Option<u8> {
    match degrees {
        Some(deg) if deg.is_finite() => {
            let counts = (deg / TRACK_RESOLUTION).round() as i64;
            Some(counts.rem_euclid(256) as u8)
        }
        _ => None,
    }
}

/// 8-byte callsign field: whitelist alphabet, space padded
pub fn encode_callsign(callsign: &str) -> [u8; CALLSIGN_LEN] {
    let mut out = [CALLSIGN_FILLER; CALLSIGN_LEN];
    for (slot, c) in out.iter_mut().zip(callsign.chars()) {
        *slot = if callsign_char_allowed(c) {
            c as u8
        } else {
            CALLSIGN_FILLER
        };
    }
    out
}

fn callsign_char_allowed(c: char) -> bool {
    c.is_ascii_digit()
        || c.is_ascii_uppercase()
        || c == ' '
        || (c.is_ascii() && CALLSIGN_PLACEHOLDERS.contains(&(c as u8)))
}

/// Fields shared by the ownship and traffic report layouts
struct ReportFields<'a> {
    alert: bool,
    address_type: AddressType,
    address: u32,
    position: Option<GeoPoint>,
    altitude_ft: Option<i32>,
    airborne: bool,
    nic: u8,
    nacp: u8,
    speed_kt: Option<f64>,
    vertical_rate_fpm: Option<f64>,
    track_deg: Option<f64>,
    emitter_category: u8,
    callsign: &'a str,
    emergency: u8,
}

fn encode_report(id: u8, f: &ReportFields<'_>) -> Bytes {
    let mut msg = BytesMut::with_capacity(REPORT_LEN);
    msg.put_u8(id);

    let alert = if f.alert { TRAFFIC_ALERT } else { 0 };
    msg.put_u8(alert | f.address_type.as_u8());
    msg.put_slice(&(f.address & 0x00FF_FFFF).to_be_bytes()[1..]);

    // No position: lat/lon zero and NIC zero, per the ICD
    let (lat, lon, nic) = match f.position {
        Some(p) => (encode_lat_lon(p.lat), encode_lat_lon(p.lon), f.nic),
        None => ([0; 3], [0; 3], 0),
    };
    msg.put_slice(&lat);
    msg.put_slice(&lon);

    let track = encode_track(f.track_deg);
    let mut misc = 0u8;
    if track.is_some() {
        misc |= MISC_TRUE_TRACK;
    }
    if f.airborne {
        misc |= MISC_AIRBORNE;
    }
    let alt = encode_altitude(f.altitude_ft);
    msg.put_u8((alt >> 4) as u8);
    msg.put_u8(((alt & 0x0F) as u8) << 4 | misc);

    msg.put_u8((nic & 0x0F) << 4 | (f.nacp & 0x0F));

    let speed = encode_speed(f.speed_kt);
    let vv = encode_vertical_rate(f.vertical_rate_fpm);
    msg.put_u8((speed >> 4) as u8);
    msg.put_u8(((speed & 0x0F) as u8) << 4 | ((vv >> 8) & 0x0F) as u8);
    msg.put_u8((vv & 0xFF) as u8);

    msg.put_u8(track.unwrap_or(0));
    msg.put_u8(f.emitter_category);
    msg.put_slice(&encode_callsign(f.callsign));
    msg.put_u8((f.emergency & 0x0F) << 4);

    debug_assert_eq!(msg.len(), REPORT_LEN);
    frame_message(&msg)
}

/// Heartbeat (0x00)
pub fn encode_heartbeat(now: DateTime<Utc>, gps_valid: bool) -> Bytes {
    let secs = now.num_seconds_from_midnight();

    let mut status1 = HB_UAT_INITIALIZED | HB_ADDR_TALKBACK;
    let mut status2 = ((secs >> 16) as u8 & 0x01) << 7;
    if gps_valid {
        status1 |= HB_GPS_VALID;
        status2 |= HB_UTC_OK;
    }

    let mut msg = BytesMut::with_capacity(HEARTBEAT_LEN);
    msg.put_u8(MSG_HEARTBEAT);
    msg.put_u8(status1);
    msg.put_u8(status2);
    msg.put_u16_le((secs & 0xFFFF) as u16);
    // Uplink/basic message counts
    msg.put_u16(0);
    frame_message(&msg)
}

/// Ownship report (0x0A); `None` without a valid GPS position
pub fn encode_ownship_report(situation: &Situation, config: &OwnshipConfig) -> Option<Bytes> {
    let position = situation.valid_position()?;
    let (address_type, address) = match config.icao_address {
        Some(addr) => (AddressType::AdsbIcao, addr),
        None => (AddressType::AdsbSelfAssigned, SELF_ASSIGNED_ADDRESS),
    };

    let fields = ReportFields {
        alert: false,
        address_type,
        address,
        position: Some(position),
        altitude_ft: situation.report_altitude_ft().map(|ft| ft.round() as i32),
        airborne: !situation.on_ground,
        nic: OWNSHIP_NIC,
        nacp: situation.nacp,
        speed_kt: situation.ground_speed_kt,
        vertical_rate_fpm: situation.vertical_speed_fpm,
        track_deg: situation.track_deg,
        emitter_category: OWNSHIP_EMITTER_CATEGORY,
        callsign: &config.callsign,
        emergency: 0,
    };
    Some(encode_report(MSG_OWNSHIP_REPORT, &fields))
}

/// Ownship geometric altitude (0x0B); `None` without a valid GPS altitude
pub fn encode_ownship_geo_altitude(situation: &Situation) -> Option<Bytes> {
    if !situation.gps_valid {
        return None;
    }
    let alt_ft = situation.hae_altitude_ft.filter(|a| a.is_finite())?;

    let counts = (alt_ft / GEO_ALTITUDE_RESOLUTION_FT)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    let vfom = match situation.vertical_accuracy_m {
        Some(m) if m.is_finite() => m.round().clamp(0.0, VFOM_MAX as f64) as u16,
        _ => VFOM_INVALID,
    };

    let mut msg = BytesMut::with_capacity(GEO_ALTITUDE_LEN);
    msg.put_u8(MSG_OWNSHIP_GEO_ALTITUDE);
    msg.put_i16(counts);
    msg.put_u16(vfom);
    Some(frame_message(&msg))
}

/// Traffic report (0x14) for one record
pub fn encode_traffic_report(record: &TrafficRecord) -> Bytes {
    let alert = record
        .distance_m
        .map_or(true, |d| d < TRAFFIC_ALERT_DISTANCE_M);

    let fields = ReportFields {
        alert,
        address_type: record.address_type,
        address: record.address(),
        position: record.position,
        altitude_ft: record.altitude_ft,
        airborne: !record.on_ground,
        nic: record.nic,
        nacp: record.nacp,
        speed_kt: record.speed_kt,
        vertical_rate_fpm: record.vertical_rate_fpm,
        track_deg: record.track_deg,
        emitter_category: record.emitter_category,
        callsign: record.callsign.as_deref().unwrap_or(""),
        emergency: record.emergency,
    };
    encode_report(MSG_TRAFFIC_REPORT, &fields)
}

/// Device heartbeat (0xCC) with GPS/AHRS health bits
pub fn encode_device_heartbeat(gps_valid: bool, ahrs_valid: bool) -> Bytes {
    let mut status = DEVICE_PROTOCOL_VERSION << 2;
    if gps_valid {
        status |= 0x02;
    }
    if ahrs_valid {
        status |= 0x01;
    }
    frame_message(&[MSG_DEVICE_HEARTBEAT, status])
}

/// ForeFlight ID message (0x65/0x00)
pub fn encode_foreflight_id(short_name: &str, long_name: &str) -> Bytes {
    let mut msg = BytesMut::with_capacity(FOREFLIGHT_ID_LEN);
    msg.put_u8(MSG_FOREFLIGHT);
    msg.put_u8(FOREFLIGHT_ID);
    msg.put_u8(DEVICE_PROTOCOL_VERSION);
    // Serial number: invalid
    msg.put_bytes(0xFF, 8);
    put_padded_utf8(&mut msg, short_name, 8);
    put_padded_utf8(&mut msg, long_name, 16);
    // Capabilities: geometric altitude datum is WGS-84
    msg.put_u32(0);
    frame_message(&msg)
}

fn put_padded_utf8(buf: &mut BytesMut, s: &str, width: usize) {
    let mut used = 0;
    for c in s.chars() {
        let n = c.len_utf8();
        if used + n > width {
            break;
        }
        let mut tmp = [0u8; 4];
        buf.put_slice(c.encode_utf8(&mut tmp).as_bytes());
        used += n;
    }
    buf.put_bytes(0, width - used);
}

/// ForeFlight AHRS message (0x65/0x01)
pub fn encode_foreflight_ahrs(attitude: &Attitude) -> Bytes {
    let mut msg = BytesMut::with_capacity(FOREFLIGHT_AHRS_LEN);
    msg.put_u8(MSG_FOREFLIGHT);
    msg.put_u8(FOREFLIGHT_AHRS);
    msg.put_i16(tenths(attitude.roll_deg, 180.0));
    msg.put_i16(tenths(attitude.pitch_deg, 180.0));

    let heading = if attitude.heading_deg.is_finite() {
        let h = ((attitude.heading_deg.rem_euclid(360.0) * 10.0).round() as u16) % 3600;
        if attitude.heading_is_magnetic {
            h | 0x8000
        } else {
            h
        }
    } else {
        AHRS_ANGLE_INVALID as u16
    };
    msg.put_u16(heading);
    msg.put_u16(airspeed(attitude.indicated_airspeed_kt));
    msg.put_u16(airspeed(attitude.true_airspeed_kt));
    frame_message(&msg)
}

fn tenths(degrees: f64, limit: f64) -> i16 {
    if degrees.is_finite() && degrees.abs() <= limit {
        (degrees * 10.0).round() as i16
    } else {
        AHRS_ANGLE_INVALID
    }
}

fn airspeed(knots: Option<f64>) -> u16 {
    match knots {
        Some(kt) if kt.is_finite() && kt >= 0.0 => kt.round().min((AHRS_AIRSPEED_INVALID - 1) as f64) as u16,
        _ => AHRS_AIRSPEED_INVALID,
    }
}

/// Uplink relay (0x07); `None` unless `payload` is one full uplink frame
pub fn encode_uplink(payload: &[u8]) -> Option<Bytes> {
    if payload.len() != UPLINK_PAYLOAD_LEN {
        return None;
    }
    let mut msg = BytesMut::with_capacity(4 + UPLINK_PAYLOAD_LEN);
    msg.put_u8(MSG_UPLINK);
    // Time of reception: not tracked
    msg.put_bytes(0, 3);
    msg.put_slice(payload);
    Some(frame_message(&msg))
}

/// Fields recovered from an ownship or traffic report payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReport {
    pub message_id: u8,
    pub alert: bool,
    pub address_type: u8,
    pub address: u32,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: Option<i32>,
    pub airborne: bool,
    pub nic: u8,
    pub nacp: u8,
    pub speed_kt: Option<u16>,
    pub vertical_rate_fpm: Option<i32>,
    pub track_deg: Option<f64>,
    pub emitter_category: u8,
    pub callsign: String,
    pub emergency: u8,
}

/// Parse an unframed report payload; `None` for anything but a
/// well-formed ownship or traffic report
pub fn decode_report(payload: &[u8]) -> Option<DecodedReport> {
    if payload.len() != REPORT_LEN
        || (payload[0] != MSG_OWNSHIP_REPORT && payload[0] != MSG_TRAFFIC_REPORT)
    {
        return None;
    }
    let p = payload;
    let alt = (p[11] as u16) << 4 | (p[12] >> 4) as u16;
    let misc = p[12] & 0x0F;
    let speed = (p[14] as u16) << 4 | (p[15] >> 4) as u16;
    let vv = ((p[15] & 0x0F) as u16) << 8 | p[16] as u16;

    Some(DecodedReport {
        message_id: p[0],
        alert: p[1] & TRAFFIC_ALERT != 0,
        address_type: p[1] & 0x0F,
        address: u32::from_be_bytes([0, p[2], p[3], p[4]]),
        lat: decode_lat_lon([p[5], p[6], p[7]]),
        lon: decode_lat_lon([p[8], p[9], p[10]]),
        altitude_ft: decode_altitude(alt),
        airborne: misc & MISC_AIRBORNE != 0,
        nic: p[13] >> 4,
        nacp: p[13] & 0x0F,
        speed_kt: (speed != SPEED_INVALID).then_some(speed),
        vertical_rate_fpm: decode_vertical_rate(vv),
        track_deg: (misc & 0x03 != 0).then(|| p[17] as f64 * TRACK_RESOLUTION),
        emitter_category: p[18],
        callsign: String::from_utf8_lossy(&p[19..27]).trim_end().to_string(),
        emergency: p[27] >> 4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::unframe;
    use crate::traffic::{TrafficKey, TrafficSource};
    use chrono::TimeZone;
    use tokio::time::Instant;

    fn record() -> TrafficRecord {
        let mut r = TrafficRecord::new(
            TrafficKey::icao(0xABCDEF),
            AddressType::AdsbIcao,
            TrafficSource::Es1090,
            Instant::now(),
        );
        r.position = Some(GeoPoint::new(42.0, -83.0));
        r.altitude_ft = Some(3500);
        r.track_deg = Some(270.0);
        r.speed_kt = Some(120.0);
        r.vertical_rate_fpm = Some(-640.0);
        r.callsign = Some("N123AB".into());
        r.emitter_category = 1;
        r.nic = 8;
        r.nacp = 9;
        r
    }

    #[test]
    fn test_lat_lon_quantization() {
        let mut v = -180.0;
        while v < 180.0 {
            let decoded = decode_lat_lon(encode_lat_lon(v));
            assert!((decoded - v).abs() <= LAT_LON_RESOLUTION, "{} -> {}", v, decoded);
            v += 0.737;
        }
        for v in [42.0, -83.0, 0.0, -0.000001, 179.999999, -180.0] {
            let decoded = decode_lat_lon(encode_lat_lon(v));
            assert!((decoded - v).abs() <= LAT_LON_RESOLUTION);
        }
    }

    #[test]
    fn test_altitude_saturates() {
        assert_eq!(encode_altitude(Some(3500)), 180);
        assert_eq!(encode_altitude(Some(-1000)), 0);
        assert_eq!(encode_altitude(Some(-5000)), 0);
        assert_eq!(encode_altitude(Some(101_350)), ALTITUDE_MAX);
        assert_eq!(encode_altitude(Some(200_000)), ALTITUDE_MAX);
        assert_eq!(encode_altitude(None), ALTITUDE_INVALID);
        assert_eq!(decode_altitude(180), Some(3500));
        assert_eq!(decode_altitude(ALTITUDE_INVALID), None);
    }

    #[test]
    fn test_invalid_sentinels() {
        assert_eq!(encode_speed(None), SPEED_INVALID);
        assert_eq!(encode_speed(Some(f64::NAN)), SPEED_INVALID);
        assert_eq!(encode_speed(Some(9000.0)), SPEED_MAX);
        assert_eq!(encode_speed(Some(-5.0)), 0);
        assert_eq!(encode_vertical_rate(None), VERTICAL_RATE_INVALID);
        assert_eq!(encode_track(None), None);
    }

    #[test]
    fn test_vertical_rate() {
        assert_eq!(encode_vertical_rate(Some(640.0)), 10);
        assert_eq!(encode_vertical_rate(Some(-640.0)), 0xFF6);
        assert_eq!(encode_vertical_rate(Some(100_000.0)), 0x1FE);
        assert_eq!(encode_vertical_rate(Some(-100_000.0)), 0xE02);
        assert_eq!(decode_vertical_rate(0xFF6), Some(-640));
        assert_eq!(decode_vertical_rate(0x800), None);
    }

    #[test]
    fn test_track_wraps() {
        assert_eq!(encode_track(Some(0.0)), Some(0));
        assert_eq!(encode_track(Some(90.0)), Some(64));
        assert_eq!(encode_track(Some(359.9)), Some(0));
        assert_eq!(encode_track(Some(-90.0)), Some(192));
        assert_eq!(encode_track(Some(720.0 + 180.0)), Some(128));
    }

    #[test]
    fn test_callsign_whitelist() {
        assert_eq!(&encode_callsign("N123AB"), b"N123AB  ");
        assert_eq!(&encode_callsign("n1-2_ä"), b" 1 2    ");
        assert_eq!(&encode_callsign("ue"), b"ue      ");
        assert_eq!(&encode_callsign("LONGCALLSIGN"), b"LONGCALL");
        assert_eq!(&encode_callsign(""), b"        ");
    }

    #[test]
    fn test_heartbeat_layout() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        let frame = encode_heartbeat(t, true);
        let payload = unframe(&frame).unwrap();

        // 86399 = 0x1517F
        assert_eq!(
            &payload[..],
            &[0x00, 0x91, 0x81, 0x7F, 0x51, 0x00, 0x00]
        );

        let no_fix = unframe(&encode_heartbeat(t, false)).unwrap();
        assert_eq!(no_fix[1], 0x11);
        assert_eq!(no_fix[2], 0x80);
    }

    #[test]
    fn test_traffic_report_fields() {
        let r = record();
        let frame = encode_traffic_report(&r);
        let payload = unframe(&frame).unwrap();
        assert_eq!(payload.len(), REPORT_LEN);

        let d = decode_report(&payload).unwrap();
        assert_eq!(d.message_id, MSG_TRAFFIC_REPORT);
        assert_eq!(d.address, 0xABCDEF);
        assert_eq!(d.address_type, 0);
        assert!(d.alert, "unknown distance raises the alert bit");
        assert!((d.lat - 42.0).abs() <= LAT_LON_RESOLUTION);
        assert!((d.lon + 83.0).abs() <= LAT_LON_RESOLUTION);
        assert_eq!(d.altitude_ft, Some(3500));
        assert!(d.airborne);
        assert_eq!((d.nic, d.nacp), (8, 9));
        assert_eq!(d.speed_kt, Some(120));
        assert_eq!(d.vertical_rate_fpm, Some(-640));
        assert_eq!(d.track_deg, Some(270.0));
        assert_eq!(d.callsign, "N123AB");
    }

    #[test]
    fn test_traffic_report_unknowns_and_alert() {
        let mut r = record();
        r.altitude_ft = None;
        r.speed_kt = None;
        r.vertical_rate_fpm = None;
        r.track_deg = None;
        r.distance_m = Some(10_000.0);

        let d = decode_report(&unframe(&encode_traffic_report(&r)).unwrap()).unwrap();
        assert!(!d.alert);
        assert_eq!(d.altitude_ft, None);
        assert_eq!(d.speed_kt, None);
        assert_eq!(d.vertical_rate_fpm, None);
        assert_eq!(d.track_deg, None);

        r.distance_m = Some(1_000.0);
        let d = decode_report(&unframe(&encode_traffic_report(&r)).unwrap()).unwrap();
        assert!(d.alert);
    }

    #[test]
    fn test_ownship_report() {
        let config = OwnshipConfig::default().callsign("N12345");
        let mut situation = Situation {
            gps_valid: false,
            position: Some(GeoPoint::new(42.0, -83.0)),
            msl_altitude_ft: Some(2500.0),
            track_deg: Some(90.0),
            ground_speed_kt: Some(100.0),
            nacp: 10,
            ..Default::default()
        };
        assert!(encode_ownship_report(&situation, &config).is_none());

        situation.gps_valid = true;
        let frame = encode_ownship_report(&situation, &config).unwrap();
        let d = decode_report(&unframe(&frame).unwrap()).unwrap();
        assert_eq!(d.message_id, MSG_OWNSHIP_REPORT);
        assert_eq!(d.address_type, AddressType::AdsbSelfAssigned.as_u8());
        assert_eq!(d.address, SELF_ASSIGNED_ADDRESS);
        assert!(!d.alert);
        assert_eq!(d.altitude_ft, Some(2500));
        assert_eq!((d.nic, d.nacp), (8, 10));
        assert_eq!(d.callsign, "N12345");

        let config = config.icao_address(0xA1B2C3);
        let d = decode_report(&unframe(&encode_ownship_report(&situation, &config).unwrap()).unwrap()).unwrap();
        assert_eq!(d.address_type, 0);
        assert_eq!(d.address, 0xA1B2C3);
    }

    #[test]
    fn test_geo_altitude() {
        let mut situation = Situation {
            gps_valid: true,
            hae_altitude_ft: Some(3005.0),
            vertical_accuracy_m: Some(10.4),
            ..Default::default()
        };
        let payload = unframe(&encode_ownship_geo_altitude(&situation).unwrap()).unwrap();
        assert_eq!(&payload[..], &[0x0B, 0x02, 0x59, 0x00, 0x0A]);

        situation.vertical_accuracy_m = None;
        situation.hae_altitude_ft = Some(-1000.0);
        let payload = unframe(&encode_ownship_geo_altitude(&situation).unwrap()).unwrap();
        assert_eq!(&payload[..], &[0x0B, 0xFF, 0x38, 0x7F, 0xFF]);

        situation.gps_valid = false;
        assert!(encode_ownship_geo_altitude(&situation).is_none());
    }

    #[test]
    fn test_device_heartbeat() {
        assert_eq!(&unframe(&encode_device_heartbeat(true, false)).unwrap()[..], &[0xCC, 0x06]);
        assert_eq!(&unframe(&encode_device_heartbeat(false, true)).unwrap()[..], &[0xCC, 0x05]);
    }

    #[test]
    fn test_foreflight_id() {
        let payload = unframe(&encode_foreflight_id("TrafHub", "Traffic Hub")).unwrap();
        assert_eq!(payload.len(), FOREFLIGHT_ID_LEN);
        assert_eq!(&payload[..3], &[0x65, 0x00, 0x01]);
        assert_eq!(&payload[3..11], &[0xFF; 8]);
        assert_eq!(&payload[11..19], b"TrafHub\0");
        assert_eq!(&payload[19..30], b"Traffic Hub");
        assert!(payload[30..35].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_foreflight_ahrs() {
        let attitude = Attitude {
            roll_deg: -10.5,
            pitch_deg: 2.0,
            heading_deg: 270.0,
            heading_is_magnetic: true,
            indicated_airspeed_kt: None,
            true_airspeed_kt: Some(110.0),
        };
        let payload = unframe(&encode_foreflight_ahrs(&attitude)).unwrap();
        assert_eq!(payload.len(), FOREFLIGHT_AHRS_LEN);
        assert_eq!(i16::from_be_bytes([payload[2], payload[3]]), -105);
        assert_eq!(i16::from_be_bytes([payload[4], payload[5]]), 20);
        assert_eq!(u16::from_be_bytes([payload[6], payload[7]]), 0x8000 | 2700);
        assert_eq!(u16::from_be_bytes([payload[8], payload[9]]), AHRS_AIRSPEED_INVALID);
        assert_eq!(u16::from_be_bytes([payload[10], payload[11]]), 110);
    }

    #[test]
    fn test_uplink_requires_full_payload() {
        assert!(encode_uplink(&[0u8; 10]).is_none());

        let frame = encode_uplink(&[0x7E; UPLINK_PAYLOAD_LEN]).unwrap();
        let payload = unframe(&frame).unwrap();
        assert_eq!(payload.len(), 4 + UPLINK_PAYLOAD_LEN);
        assert_eq!(payload[0], MSG_UPLINK);
    }

    #[test]
    fn test_decode_report_fails_closed() {
        assert!(decode_report(&[]).is_none());
        assert!(decode_report(&[0x14; 27]).is_none());
        assert!(decode_report(&[0x00; REPORT_LEN]).is_none());
    }
}
