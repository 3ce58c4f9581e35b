//! Upper-half (FMAC) semantics

use crate::decoder::{FmacKind, FmacSrc, UpperOp};
use crate::instructions::mac_flags;
use crate::registers::{mask_has, VuRegisters};

/// Deferred effect of an upper op. Gathered against pre-bundle state,
/// applied after the lower half has run.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperCommit {
    /// Float register write: (register, lane mask, value)
    pub vf: Option<(u8, u8, [f32; 4])>,
    /// Accumulator write: (lane mask, value)
    pub acc: Option<(u8, [f32; 4])>,
    /// New MAC flags, when the op produces them
    pub mac: Option<u16>,
    /// New clip flag register value
    pub clip: Option<u32>,
}

impl UpperCommit {
    /// Destination register and lane mask for pipeline bookkeeping
    pub fn dest(&self) -> (u8, u8) {
        match self.vf {
            Some((reg, mask, _)) => (reg, mask),
            None => (0, 0),
        }
    }
}

/// Evaluate an upper op against current register state
pub fn compute(regs: &VuRegisters, op: &UpperOp) -> UpperCommit {
    match *op {
        UpperOp::Fmac { kind, src, acc, dest, fd, fs, ft } => {
            let a = regs.vf(fs);
            let b = operand(regs, src, ft);
            let mut result = [0.0f32; 4];
            for lane in 0..4 {
                result[lane] = match kind {
                    FmacKind::Add => a[lane] + b[lane],
                    FmacKind::Sub => a[lane] - b[lane],
                    FmacKind::Mul => a[lane] * b[lane],
                    FmacKind::Madd => regs.acc[lane] + a[lane] * b[lane],
                    FmacKind::Msub => regs.acc[lane] - a[lane] * b[lane],
                    FmacKind::Max => a[lane].max(b[lane]),
                    FmacKind::Mini => a[lane].min(b[lane]),
                };
            }
            let mac = matches!(
                kind,
                FmacKind::Add | FmacKind::Sub | FmacKind::Mul | FmacKind::Madd | FmacKind::Msub
            )
            .then(|| mac_flags(&result, dest));
            if acc {
                UpperCommit {
                    acc: Some((dest, result)),
                    mac,
                    ..Default::default()
                }
            } else {
                UpperCommit {
                    vf: Some((fd, dest, result)),
                    mac,
                    ..Default::default()
                }
            }
        }
        UpperOp::Opmula { fs, ft } => {
            let result = outer_product(regs.vf(fs), regs.vf(ft));
            UpperCommit {
                acc: Some((0b1110, result)),
                mac: Some(mac_flags(&result, 0b1110)),
                ..Default::default()
            }
        }
        UpperOp::Opmsub { fd, fs, ft } => {
            let cross = outer_product(regs.vf(fs), regs.vf(ft));
            let mut result = [0.0f32; 4];
            for lane in 0..3 {
                result[lane] = regs.acc[lane] - cross[lane];
            }
            UpperCommit {
                vf: Some((fd, 0b1110, result)),
                mac: Some(mac_flags(&result, 0b1110)),
                ..Default::default()
            }
        }
        UpperOp::Abs { dest, fs, ft } => {
            let a = regs.vf(fs);
            let result = [a[0].abs(), a[1].abs(), a[2].abs(), a[3].abs()];
            // ABS does not touch the MAC flags
            UpperCommit {
                vf: Some((ft, dest, result)),
                ..Default::default()
            }
        }
        UpperOp::Clip { fs, ft } => {
            let a = regs.vf(fs);
            let bound = regs.vf(ft)[3].abs();
            let mut bits = 0u32;
            for lane in 0..3 {
                if a[lane] > bound {
                    bits |= 1 << (lane * 2);
                }
                if a[lane] < -bound {
                    bits |= 1 << (lane * 2 + 1);
                }
            }
            UpperCommit {
                clip: Some(((regs.clip_flags << 6) | bits) & 0xFF_FFFF),
                ..Default::default()
            }
        }
        UpperOp::Ftoi { shift, dest, fs, ft } => {
            let a = regs.vf(fs);
            let scale = (1u32 << shift) as f32;
            let mut result = [0.0f32; 4];
            for lane in 0..4 {
                let fixed = (a[lane] * scale) as i32;
                result[lane] = f32::from_bits(fixed as u32);
            }
            UpperCommit {
                vf: Some((ft, dest, result)),
                ..Default::default()
            }
        }
        UpperOp::Itof { shift, dest, fs, ft } => {
            let scale = (1u32 << shift) as f32;
            let mut result = [0.0f32; 4];
            for lane in 0..4 {
                let fixed = regs.vf_lane_bits(fs, lane) as i32;
                result[lane] = fixed as f32 / scale;
            }
            UpperCommit {
                vf: Some((ft, dest, result)),
                ..Default::default()
            }
        }
        UpperOp::Nop => UpperCommit::default(),
    }
}

/// Commit a gathered upper result to the register file
pub fn apply(regs: &mut VuRegisters, commit: UpperCommit) {
    if let Some((mask, value)) = commit.acc {
        for lane in 0..4 {
            if mask_has(mask, lane) {
                regs.acc[lane] = value[lane];
            }
        }
    }
    if let Some((reg, mask, value)) = commit.vf {
        regs.set_vf(reg, value, mask);
    }
    if let Some(mac) = commit.mac {
        regs.mac_flags = mac;
        regs.update_status(mac);
    }
    if let Some(clip) = commit.clip {
        regs.clip_flags = clip;
    }
}

fn operand(regs: &VuRegisters, src: FmacSrc, ft: u8) -> [f32; 4] {
    match src {
        FmacSrc::Reg => regs.vf(ft),
        FmacSrc::Bc(lane) => [regs.vf(ft)[lane as usize & 3]; 4],
        FmacSrc::Q => [regs.q.read(); 4],
        FmacSrc::I => [regs.i; 4],
    }
}

/// OPMULA/OPMSUB cross-term: (fs.y*ft.z, fs.z*ft.x, fs.x*ft.y)
fn outer_product(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[1] * b[2], a[2] * b[0], a[0] * b[1], 0.0]
}
