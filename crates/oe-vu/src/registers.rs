//! VU register file
//!
//! 32 four-lane float registers, 16 integer registers and the special
//! scalar registers. `vf00` is hardwired to (0, 0, 0, 1) and `vi00` to
//! zero; writes to either are silently discarded.

use crate::pipeline::DelayedScalar;

/// Status flag bits
pub mod status {
    pub const Z: u16 = 1 << 0;
    pub const S: u16 = 1 << 1;
    pub const U: u16 = 1 << 2;
    pub const O: u16 = 1 << 3;
    pub const I: u16 = 1 << 4;
    pub const D: u16 = 1 << 5;
    pub const Z_STICKY: u16 = 1 << 6;
    pub const S_STICKY: u16 = 1 << 7;
    pub const U_STICKY: u16 = 1 << 8;
    pub const O_STICKY: u16 = 1 << 9;
    pub const I_STICKY: u16 = 1 << 10;
    pub const D_STICKY: u16 = 1 << 11;
}

/// Check a 4-bit xyzw destination mask for a lane (x is bit 3)
#[inline]
pub fn mask_has(mask: u8, lane: usize) -> bool {
    mask & (8 >> lane) != 0
}

/// Register file for one vector unit
#[derive(Debug, Clone)]
pub struct VuRegisters {
    vf: [[f32; 4]; 32],
    vi: [u16; 16],
    /// FMAC accumulator
    pub acc: [f32; 4],
    /// Q: divide/square-root result pipe
    pub q: DelayedScalar,
    /// P: EFU result pipe (VU1 only in hardware)
    pub p: DelayedScalar,
    /// R: 23-bit LFSR value with fixed exponent bits
    pub r: u32,
    /// I: immediate-load literal
    pub i: f32,
    /// MAC flags, one nibble each of Z/S/U/O (x at bit 3 of each nibble)
    pub mac_flags: u16,
    /// Clip judgement history, 6 bits per CLIP, 24 bits deep
    pub clip_flags: u32,
    /// Status flags (current + sticky)
    pub status_flags: u16,
    /// Program counter in instruction words
    pub pc: u16,
    /// PC at which the last microprogram was started
    pub tpc: u16,
    /// VU0 microprogram start address register
    pub cmsar0: u16,
    /// ITOP value latched by VIF
    pub itop: u16,
    /// TOP value latched by VIF (double-buffer base, VU1)
    pub top: u16,
}

impl VuRegisters {
    /// Create a register file in power-on state
    pub fn new() -> Self {
        Self {
            vf: [[0.0; 4]; 32],
            vi: [0; 16],
            acc: [0.0; 4],
            q: DelayedScalar::new(),
            p: DelayedScalar::new(),
            r: 0x3F80_0000,
            i: 0.0,
            mac_flags: 0,
            clip_flags: 0,
            status_flags: 0,
            pc: 0,
            tpc: 0,
            cmsar0: 0,
            itop: 0,
            top: 0,
        }
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a float register; vf00 is the hardware constant (0,0,0,1)
    #[inline]
    pub fn vf(&self, reg: u8) -> [f32; 4] {
        if reg == 0 {
            [0.0, 0.0, 0.0, 1.0]
        } else {
            self.vf[reg as usize & 0x1F]
        }
    }

    /// Write float register lanes selected by the xyzw mask.
    /// Writes to vf00 are silently discarded.
    #[inline]
    pub fn set_vf(&mut self, reg: u8, value: [f32; 4], mask: u8) {
        if reg == 0 {
            return;
        }
        let slot = &mut self.vf[reg as usize & 0x1F];
        for lane in 0..4 {
            if mask_has(mask, lane) {
                slot[lane] = value[lane];
            }
        }
    }

    /// Read one lane of a float register as raw bits
    #[inline]
    pub fn vf_lane_bits(&self, reg: u8, lane: usize) -> u32 {
        self.vf(reg)[lane & 3].to_bits()
    }

    /// Read an integer register; vi00 reads as zero
    #[inline]
    pub fn vi(&self, reg: u8) -> u16 {
        if reg == 0 {
            0
        } else {
            self.vi[reg as usize & 0xF]
        }
    }

    /// Write an integer register; writes to vi00 are discarded
    #[inline]
    pub fn set_vi(&mut self, reg: u8, value: u16) {
        if reg != 0 {
            self.vi[reg as usize & 0xF] = value;
        }
    }

    /// Fold new MAC flags into the status register: bits 0..6 mirror the
    /// latest result, bits 6..12 are sticky.
    pub fn update_status(&mut self, mac: u16) {
        let mut current = 0u16;
        if mac & 0x000F != 0 {
            current |= status::Z;
        }
        if mac & 0x00F0 != 0 {
            current |= status::S;
        }
        if mac & 0x0F00 != 0 {
            current |= status::U;
        }
        if mac & 0xF000 != 0 {
            current |= status::O;
        }
        self.status_flags = (self.status_flags & 0x0FC0) | current | (current << 6);
    }
}

impl Default for VuRegisters {
    fn default() -> Self {
        Self::new()
    }
}
