//! Field decoding for the radar's data frames.
//!
//! X and speed are not two's complement, and Y carries both a bias and the
//! presence signal. Every quirk lives here so the frame decoder only deals
//! with offsets.
//!
//! Sign/magnitude fields (X, speed), raw = `hi << 8 | lo`:
//!
//! | lo   | hi   | raw    | decoded |
//! |------|------|--------|---------|
//! | 0x10 | 0x00 | 0x0010 | 16      |
//! | 0x0E | 0x01 | 0x010E | 270     |
//! | 0xFF | 0x7F | 0x7FFF | 32767   |
//! | 0x00 | 0x80 | 0x8000 | 0       |
//! | 0x10 | 0x80 | 0x8010 | -16     |
//! | 0x0E | 0x81 | 0x810E | -270    |
//! | 0xFF | 0xFF | 0xFFFF | -32767  |
//!
//! The high bit of `hi` flips the sign of the remaining 15 bits. This is the
//! 16-bit wrapping result of `v = raw as i16; if hi & 0x80 { v = -v + 0x8000 }`.
//!
//! Y field, raw = `hi << 8 | lo`:
//!
//! | lo   | hi   | raw    | decoded | present |
//! |------|------|--------|---------|---------|
//! | 0x00 | 0x00 | 0x0000 | -       | no      |
//! | 0x00 | 0x80 | 0x8000 | 0       | yes     |
//! | 0x10 | 0x80 | 0x8010 | 16      | yes     |
//! | 0xE8 | 0x83 | 0x83E8 | 1000    | yes     |
//! | 0x10 | 0x00 | 0x0010 | -32752  | yes     |
//!
//! A raw Y of exactly zero is the only "no target" signal.

/// Little-endian u16 from two bytes.
#[inline]
pub fn raw_u16(lo: u8, hi: u8) -> u16 {
    u16::from(hi) << 8 | u16::from(lo)
}

/// Decodes an X or speed field.
pub fn decode_signed(lo: u8, hi: u8) -> i16 {
    let magnitude = (raw_u16(lo, hi) & 0x7FFF) as i16;
    if hi & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decodes a Y field. `None` means the slot carries no target.
pub fn decode_y(lo: u8, hi: u8) -> Option<i16> {
    match raw_u16(lo, hi) {
        0 => None,
        raw => Some(raw.wrapping_sub(0x8000) as i16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_truth_table() {
        let table: &[(u8, u8, i16)] = &[
            (0x00, 0x00, 0),
            (0x10, 0x00, 16),
            (0x0E, 0x01, 270),
            (0xFF, 0x7F, 32767),
            (0x00, 0x80, 0),
            (0x10, 0x80, -16),
            (0x0E, 0x81, -270),
            (0xFF, 0xFF, -32767),
        ];
        for &(lo, hi, expected) in table {
            assert_eq!(decode_signed(lo, hi), expected, "lo={lo:#04x} hi={hi:#04x}");
        }
    }

    #[test]
    fn signed_matches_reference_formula_for_every_raw_value() {
        for raw in 0..=u16::MAX {
            let lo = (raw & 0xFF) as u8;
            let hi = (raw >> 8) as u8;
            let mut v = raw as i16 as i32;
            if hi & 0x80 != 0 {
                v = -v + 0x8000;
            }
            assert_eq!(decode_signed(lo, hi), v as i16, "raw={raw:#06x}");
        }
    }

    #[test]
    fn y_truth_table() {
        assert_eq!(decode_y(0x00, 0x00), None);
        assert_eq!(decode_y(0x00, 0x80), Some(0));
        assert_eq!(decode_y(0x10, 0x80), Some(16));
        assert_eq!(decode_y(0xE8, 0x83), Some(1000));
        assert_eq!(decode_y(0x10, 0x00), Some(-32752));
    }

    #[test]
    fn y_matches_reference_formula_for_every_raw_value() {
        for raw in 1..=u16::MAX {
            let expected = ((raw as i16 as i32) - 0x8000) as i16;
            assert_eq!(decode_y((raw & 0xFF) as u8, (raw >> 8) as u8), Some(expected));
        }
    }

    #[test]
    fn raw_is_little_endian() {
        assert_eq!(raw_u16(0x34, 0x12), 0x1234);
    }
}
