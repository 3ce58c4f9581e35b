//! Instruction semantics for both halves of the bundle
//!
//! The upper half is computed against pre-bundle register state and
//! committed only after the lower half has executed, so a lower op in
//! the same bundle always observes pre-upper values and an upper write
//! to the same register wins.

pub mod lower;
pub mod upper;

pub use lower::{LowerCtx, LowerOutcome};
pub use upper::UpperCommit;

use crate::registers::mask_has;

/// MAC flags for a result vector: one nibble each of zero/sign bits,
/// x at bit 3 of each nibble. Lanes outside the write mask clear.
pub(crate) fn mac_flags(result: &[f32; 4], mask: u8) -> u16 {
    let mut mac = 0u16;
    for lane in 0..4 {
        if !mask_has(mask, lane) {
            continue;
        }
        let bit = (8u16 >> lane) as u16;
        if result[lane] == 0.0 {
            mac |= bit;
        }
        if result[lane].is_sign_negative() {
            mac |= bit << 4;
        }
    }
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_flags_zero_and_sign() {
        // x = -1.0, y = 0.0, z = 2.0, w = -0.0
        let mac = mac_flags(&[-1.0, 0.0, 2.0, -0.0], 0xF);
        // zero nibble: y and w
        assert_eq!(mac & 0x000F, 0b0101);
        // sign nibble: x and w (negative zero is signed)
        assert_eq!((mac >> 4) & 0xF, 0b1001);
    }

    #[test]
    fn test_mac_flags_respect_mask() {
        let mac = mac_flags(&[0.0, 0.0, 0.0, 0.0], 0b1000);
        assert_eq!(mac, 0b1000);
    }
}
