//! CRC-16-CCITT as used by GDL90
//!
//! Table-driven, polynomial 0x1021, zero initial value, no final XOR.
//! The table is generated once at compile time.

use super::constants::CRC16_POLY;

static CRC16_TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the GDL90 CRC of `data`
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        CRC16_TABLE[(crc >> 8) as usize] ^ (crc << 8) ^ b as u16
    })
}
