//! GDL90 frame envelope
//!
//! ```text
//! +------+------------------------------------+------+
//! | 0x7E | stuffed( payload || CRC16-LE )     | 0x7E |
//! +------+------------------------------------+------+
//! ```
//!
//! Inside the envelope every 0x7E or 0x7D is written as 0x7D followed by
//! the byte XOR 0x20. The CRC covers the unstuffed payload only.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{CONTROL_ESCAPE, ESCAPE_XOR, FLAG_BYTE};
use super::crc::crc16;

/// Wrap a message payload into a complete, stuffed frame
pub fn frame_message(payload: &[u8]) -> Bytes {
    let crc = crc16(payload);
    let crc_bytes = crc.to_le_bytes();

    // Worst case every byte is escaped
    let mut out = BytesMut::with_capacity(2 * (payload.len() + 2) + 2);
    out.put_u8(FLAG_BYTE);
    for &b in payload.iter().chain(crc_bytes.iter()) {
        put_stuffed(&mut out, b);
    }
    out.put_u8(FLAG_BYTE);
    out.freeze()
}

/// Escape reserved bytes
pub fn stuff(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() * 2);
    for &b in data {
        put_stuffed(&mut out, b);
    }
    out.freeze()
}

/// Reverse [`stuff`]
///
/// Returns `None` for a dangling escape or an escape of a byte that is
/// not a reserved value.
pub fn unstuff(data: &[u8]) -> Option<Bytes> {
    let mut out = BytesMut::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        match b {
            CONTROL_ESCAPE => {
                let escaped = *iter.next()? ^ ESCAPE_XOR;
                if escaped != FLAG_BYTE && escaped != CONTROL_ESCAPE {
                    return None;
                }
                out.put_u8(escaped);
            }
            FLAG_BYTE => return None,
            _ => out.put_u8(b),
        }
    }
    Some(out.freeze())
}

/// Strip the envelope, unstuff, and verify the CRC of one frame
///
/// Returns the payload without CRC, or `None` if the frame is short,
/// mis-delimited, badly escaped or fails the CRC check.
pub fn unframe(frame: &[u8]) -> Option<Bytes> {
    if frame.len() < 4 || frame[0] != FLAG_BYTE || frame[frame.len() - 1] != FLAG_BYTE {
        return None;
    }
    let body = unstuff(&frame[1..frame.len() - 1])?;
    if body.len() < 3 {
        return None;
    }
    let (payload, crc) = body.split_at(body.len() - 2);
    if crc16(payload) != u16::from_le_bytes([crc[0], crc[1]]) {
        return None;
    }
    Some(body.slice(..payload.len()))
}

/// Split a buffer holding several back-to-back frames (a batched datagram)
/// into individual payloads, skipping any frame that fails to decode.
pub fn split_frames(data: &[u8]) -> Vec<Bytes> {
    let mut frames = Vec::new();
    let mut start = None;
    for (i, &b) in data.iter().enumerate() {
        if b != FLAG_BYTE {
            continue;
        }
        match start {
            Some(s) if i > s + 1 => {
                if let Some(payload) = unframe(&data[s..=i]) {
                    frames.push(payload);
                }
                start = None;
            }
            // Two adjacent flags: treat the second as the new opening flag
            _ => start = Some(i),
        }
    }
    frames
}

#[inline]
fn put_stuffed(out: &mut BytesMut, b: u8) {
    if b == FLAG_BYTE || b == CONTROL_ESCAPE {
        out.put_u8(CONTROL_ESCAPE);
        out.put_u8(b ^ ESCAPE_XOR);
    } else {
        out.put_u8(b);
    }
}
