//! Baud rate divisor encoding for FTDI chips.
//!
//! FTDI chips derive the baud clock from a fractional divider. The encoding
//! differs between chip generations:
//!
//! - **AM**: 24 MHz base clock, only some fractional sub-divisors exist.
//! - **BM/2232C/R/230X**: 48 MHz base clock, 16x predivisor, 3 fractional bits.
//! - **H-type** (2232H/4232H/232H): adds a 120 MHz / 10 path for high rates,
//!   selected with an extra divisor flag; the control-transfer index carries
//!   the interface number in its low byte.
//!
//! In bitbang modes the chip clocks pins at 4x the programmed rate; that
//! multiplication happens in [`FtdiDevice::set_baudrate`](crate::FtdiDevice),
//! not here.

use crate::constants::{C_CLK, H_CLK};
use crate::types::ChipType;

/// An encoded divisor ready for the SIO_SET_BAUDRATE control transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DivisorEncoding {
    /// The nearest achievable baud rate.
    pub actual: u32,
    /// The `value` field of the control transfer.
    pub value: u16,
    /// The `index` field of the control transfer.
    pub index: u16,
}

/// Divider behavior shared by a group of chip types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    /// FT8U232AM: coarse fractions, adjustment tables.
    Am,
    /// BM and later full-speed chips: 48 MHz / 16 with 3 fractional bits.
    Fractional,
    /// Hi-speed chips: fractional plus the 120 MHz / 10 fast path.
    HiSpeed,
}

impl Generation {
    fn of(chip: ChipType) -> Self {
        match chip {
            ChipType::Am => Self::Am,
            ChipType::Bm | ChipType::Ft2232C | ChipType::Ft232R | ChipType::Ft230X => {
                Self::Fractional
            }
            ChipType::Ft2232H | ChipType::Ft4232H | ChipType::Ft232H => Self::HiSpeed,
        }
    }
}

/// Fractional sub-divisor encoding: maps the 3 low divisor bits to the
/// on-wire code.
const FRAC_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];

/// AM-type round-down adjustment for unsupported fractional values.
const AM_ADJUST_DN: [i32; 8] = [0, 0, 0, 1, 0, 3, 2, 1];
/// AM-type round-up adjustment for unsupported fractional values.
const AM_ADJUST_UP: [i32; 8] = [0, 0, 0, 1, 0, 1, 2, 3];

/// Encoded divisor and nearest rate for AM-type chips (24 MHz clock).
fn am_divisor(baudrate: u32) -> (u32, u64) {
    let baudrate = baudrate as i32;
    let mut divisor = 24_000_000 / baudrate;

    // Round down to a fraction the AM silicon supports
    divisor -= AM_ADJUST_DN[(divisor & 7) as usize];

    let mut best_divisor = 0i32;
    let mut best_baud = 0i32;
    let mut best_baud_diff = 0i32;

    for i in 0..2 {
        let mut try_divisor = divisor + i;

        if try_divisor <= 8 {
            try_divisor = 8;
        } else if divisor < 16 {
            // Divisors 9 through 15 do not exist on AM
            try_divisor = 16;
        } else {
            try_divisor += AM_ADJUST_UP[(try_divisor & 7) as usize];
            if try_divisor > 0x1FFF8 {
                try_divisor = 0x1FFF8;
            }
        }

        let baud_estimate = (24_000_000 + (try_divisor / 2)) / try_divisor;
        let baud_diff = (baud_estimate - baudrate).abs();

        if i == 0 || baud_diff < best_baud_diff {
            best_divisor = try_divisor;
            best_baud = baud_estimate;
            best_baud_diff = baud_diff;
            if baud_diff == 0 {
                break;
            }
        }
    }

    let mut encoded =
        ((best_divisor >> 3) as u64) | (FRAC_CODE[(best_divisor & 7) as usize] as u64) << 14;

    // Raw encodings 1 and 0x4001 collide with the reserved 3 Mbaud / 2 Mbaud
    // values and must be remapped
    if encoded == 1 {
        encoded = 0;
    } else if encoded == 0x4001 {
        encoded = 1;
    }

    (best_baud as u32, encoded)
}

/// Encoded divisor and nearest rate for a fractional divider running at
/// `clk` with a fixed predivisor.
///
/// Serves BM/2232C/R/230X (48 MHz / 16) and both H-type paths
/// (120 MHz / 10, 48 MHz / 16).
fn fractional_divisor(baudrate: u32, clk: u32, predivisor: u32) -> (u32, u64) {
    // The top three rates have reserved encodings
    if baudrate >= clk / predivisor {
        return (clk / predivisor, 0);
    }
    if baudrate >= clk / (predivisor + predivisor / 2) {
        return (clk / (predivisor + predivisor / 2), 1);
    }
    if baudrate >= clk / (2 * predivisor) {
        return (clk / (2 * predivisor), 2);
    }

    // Work in 16ths: 3 fractional bits plus one bit for rounding
    let divisor = clk * 16 / predivisor / baudrate;
    let best_divisor = if divisor & 1 != 0 {
        divisor / 2 + 1
    } else {
        divisor / 2
    };
    // 0x20000 itself is a valid divisor; only larger values are clamped
    let best_divisor = if best_divisor > 0x20000 {
        0x1FFFF
    } else {
        best_divisor
    };

    let mut best_baud = clk * 16 / predivisor / best_divisor;
    if best_baud & 1 != 0 {
        best_baud = best_baud / 2 + 1;
    } else {
        best_baud /= 2;
    }

    let encoded =
        ((best_divisor >> 3) as u64) | (FRAC_CODE[(best_divisor & 0x7) as usize] as u64) << 14;

    (best_baud, encoded)
}

/// Convert a requested baud rate to SIO_SET_BAUDRATE register values.
///
/// Returns the nearest achievable baud rate together with the control
/// transfer `value`/`index` fields, or `None` for rate 0.
///
/// `usb_index` is the 1-based interface index; H-type chips encode it into
/// the low byte of the returned index field.
pub(crate) fn encode_baudrate(
    baudrate: u32,
    chip: ChipType,
    usb_index: u16,
) -> Option<DivisorEncoding> {
    if baudrate == 0 {
        return None;
    }

    let generation = Generation::of(chip);
    let (actual, encoded) = match generation {
        Generation::Am => am_divisor(baudrate),
        Generation::Fractional => fractional_divisor(baudrate, C_CLK, 16),
        Generation::HiSpeed => {
            // The slow 48 MHz path covers rates the 120 MHz divider cannot
            // reach with its 14-bit range
            if (baudrate as u64) * 10 > (H_CLK as u64) / 0x3FFF {
                let (baud, enc) = fractional_divisor(baudrate, H_CLK, 10);
                (baud, enc | 0x20000) // flag: clock from 120 MHz / 10
            } else {
                fractional_divisor(baudrate, C_CLK, 16)
            }
        }
    };

    if actual == 0 {
        return None;
    }

    let value = (encoded & 0xFFFF) as u16;
    let index = match generation {
        Generation::HiSpeed => {
            let idx = (encoded >> 8) as u16;
            (idx & 0xFF00) | usb_index
        }
        _ => (encoded >> 16) as u16,
    };

    Some(DivisorEncoding {
        actual,
        value,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(actual: u32, requested: u32, divider: u32) {
        assert!(
            (actual as i64 - requested as i64).unsigned_abs() < (requested / divider) as u64,
            "actual={actual} too far from requested={requested}"
        );
    }

    #[test]
    fn fractional_9600_exact() {
        let r = encode_baudrate(9600, ChipType::Bm, 1).unwrap();
        assert_eq!(r.actual, 9600);
    }

    #[test]
    fn fractional_115200_within_tolerance() {
        // 48 MHz / 16 / 26 = 115384, the closest the divider gets
        let r = encode_baudrate(115_200, ChipType::Bm, 1).unwrap();
        within(r.actual, 115_200, 20);
    }

    #[test]
    fn fractional_3m_is_reserved_encoding() {
        let r = encode_baudrate(3_000_000, ChipType::Bm, 1).unwrap();
        assert_eq!(r.actual, 3_000_000);
        assert_eq!(r.value, 0);
    }

    #[test]
    fn fractional_2m_is_reserved_encoding() {
        let r = encode_baudrate(2_000_000, ChipType::Ft232R, 1).unwrap();
        assert_eq!(r.actual, 2_000_000);
        assert_eq!(r.value, 1);
    }

    #[test]
    fn hi_speed_3m_exact() {
        let r = encode_baudrate(3_000_000, ChipType::Ft2232H, 1).unwrap();
        assert_eq!(r.actual, 3_000_000);
    }

    #[test]
    fn hi_speed_12m_exact() {
        // 120 MHz / 10 = 12 Mbaud, the H-type maximum
        let r = encode_baudrate(12_000_000, ChipType::Ft2232H, 1).unwrap();
        assert_eq!(r.actual, 12_000_000);
    }

    #[test]
    fn hi_speed_low_rate_uses_slow_clock() {
        let r = encode_baudrate(300, ChipType::Ft232H, 1).unwrap();
        within(r.actual, 300, 10);
    }

    #[test]
    fn hi_speed_index_carries_interface() {
        let r = encode_baudrate(9600, ChipType::Ft2232H, 2).unwrap();
        assert_eq!(r.index & 0xFF, 2);

        let r = encode_baudrate(9600, ChipType::Ft4232H, 4).unwrap();
        assert_eq!(r.index & 0xFF, 4);
    }

    #[test]
    fn am_9600_within_tolerance() {
        let r = encode_baudrate(9600, ChipType::Am, 1).unwrap();
        within(r.actual, 9600, 20);
    }

    #[test]
    fn am_maximum_rate() {
        // 24 MHz / 8 = 3 Mbaud
        let r = encode_baudrate(3_000_000, ChipType::Am, 1).unwrap();
        assert_eq!(r.actual, 3_000_000);
    }

    #[test]
    fn am_300_within_tolerance() {
        let r = encode_baudrate(300, ChipType::Am, 1).unwrap();
        within(r.actual, 300, 10);
    }

    #[test]
    fn ft230x_115200_within_tolerance() {
        let r = encode_baudrate(115_200, ChipType::Ft230X, 1).unwrap();
        within(r.actual, 115_200, 20);
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(encode_baudrate(0, ChipType::Bm, 1).is_none());
    }

    #[test]
    fn extreme_low_rates_clamp() {
        // 1 and 2 baud exceed the divisor range and must clamp, not panic
        for rate in [1u32, 2] {
            let r = encode_baudrate(rate, ChipType::Bm, 1).unwrap();
            assert!(r.actual > 0);
        }
    }
}
