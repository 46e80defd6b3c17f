//! CRC-CCITT in its reflected form (polynomial `0x8408`), one byte at a time.
//!
//! [`frame_check`] is the X.25 variant provided by the `crc16` crate. That crate only
//! starts from fixed initial values, so [`crc16`] keeps a table of its own for callers
//! that resume from an arbitrary running value.

use ::crc16::{State, X_25};

const POLY: u16 = 0x8408;

/// The CRC of each possible byte. Entry 128 is the polynomial itself.
static TABLE: [u16; 256] = make_table();

const fn make_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn crc16_byte(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ TABLE[usize::from((crc ^ u16::from(byte)) as u8)]
}

/// Runs `data` through the CRC starting from `initial`.
///
/// No final complement is applied; see [`frame_check`] for the value that goes on the wire.
#[must_use]
pub fn crc16(initial: u16, data: &[u8]) -> u16 {
    data.iter().fold(initial, |crc, &byte| crc16_byte(crc, byte))
}

/// The check value carried in a command's trailing CRC slot.
#[must_use]
pub fn frame_check(data: &[u8]) -> u16 {
    State::<X_25>::calculate(data)
}
