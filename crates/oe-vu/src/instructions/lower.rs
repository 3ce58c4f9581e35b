//! Lower-half semantics
//!
//! Integer ALU, loads/stores, the Q/P scalar pipes, the R register,
//! flag reads, branches and the GIF kick. All float-register reads here
//! observe pre-upper state; the executor commits the upper half after
//! this code runs.

use crate::decoder::{EfuKind, LowerOp};
use crate::executor::KickChannel;
use crate::pipeline::{LAT_DIV, LAT_RSQRT, LAT_SQRT};
use crate::registers::status;
use crate::unit::VectorUnit;

/// Largest normal float magnitude, the hardware's divide-by-zero result
const MAX_FLOAT_BITS: u32 = 0x7F7F_FFFF;

/// What the executor needs back from a lower op
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerOutcome {
    /// Branch target, taken after the delay slot
    pub branch: Option<u16>,
    /// Float register written by this half (register, lane mask)
    pub dest: (u8, u8),
}

/// Execution context for one lower op
pub struct LowerCtx<'a> {
    pub unit: &'a mut VectorUnit,
    /// VU1, for VU0's register window
    pub peer: Option<&'a mut VectorUnit>,
    /// GIF path fed by `xgkick`
    pub kick: Option<&'a mut KickChannel>,
}

impl<'a> LowerCtx<'a> {
    /// Run one lower op to completion
    pub fn execute(&mut self, op: &LowerOp) -> LowerOutcome {
        let mut out = LowerOutcome::default();
        match *op {
            // Loads and stores
            LowerOp::Lq { dest, ft, is, imm11 } => {
                let addr = offset_addr(self.unit.regs.vi(is), imm11);
                let value = self.unit.data_read(addr, self.peer.as_deref());
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Sq { dest, fs, it, imm11 } => {
                let addr = offset_addr(self.unit.regs.vi(it), imm11);
                let value = self.unit.regs.vf(fs);
                self.unit.data_write(addr, value, dest, self.peer.as_deref_mut());
            }
            LowerOp::Lqi { dest, ft, is } => {
                let addr = self.unit.regs.vi(is);
                let value = self.unit.data_read(addr, self.peer.as_deref());
                self.unit.regs.set_vf(ft, value, dest);
                self.write_vi(is, addr.wrapping_add(1));
                out.dest = (ft, dest);
            }
            LowerOp::Sqi { dest, fs, it } => {
                let addr = self.unit.regs.vi(it);
                let value = self.unit.regs.vf(fs);
                self.unit.data_write(addr, value, dest, self.peer.as_deref_mut());
                self.write_vi(it, addr.wrapping_add(1));
            }
            LowerOp::Lqd { dest, ft, is } => {
                let addr = self.unit.regs.vi(is).wrapping_sub(1);
                self.write_vi(is, addr);
                let value = self.unit.data_read(addr, self.peer.as_deref());
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Sqd { dest, fs, it } => {
                let addr = self.unit.regs.vi(it).wrapping_sub(1);
                self.write_vi(it, addr);
                let value = self.unit.regs.vf(fs);
                self.unit.data_write(addr, value, dest, self.peer.as_deref_mut());
            }
            LowerOp::Ilw { dest, it, is, imm11 } => {
                let addr = offset_addr(self.unit.regs.vi(is), imm11);
                let lane = mask_lane(dest);
                let bits = self.unit.data_read_lane(addr, lane, self.peer.as_deref());
                self.write_vi(it, bits as u16);
            }
            LowerOp::Isw { dest, it, is, imm11 } => {
                let addr = offset_addr(self.unit.regs.vi(is), imm11);
                self.store_int_lane(addr, dest, self.unit.regs.vi(it));
            }
            LowerOp::Ilwr { dest, it, is } => {
                let addr = self.unit.regs.vi(is);
                let lane = mask_lane(dest);
                let bits = self.unit.data_read_lane(addr, lane, self.peer.as_deref());
                self.write_vi(it, bits as u16);
            }
            LowerOp::Iswr { dest, it, is } => {
                let addr = self.unit.regs.vi(is);
                self.store_int_lane(addr, dest, self.unit.regs.vi(it));
            }

            // Integer ALU
            LowerOp::Iadd { id, is, it } => {
                let value = self.unit.regs.vi(is).wrapping_add(self.unit.regs.vi(it));
                self.write_vi(id, value);
            }
            LowerOp::Isub { id, is, it } => {
                let value = self.unit.regs.vi(is).wrapping_sub(self.unit.regs.vi(it));
                self.write_vi(id, value);
            }
            LowerOp::Iaddi { it, is, imm5 } => {
                let value = self.unit.regs.vi(is).wrapping_add(imm5 as u16);
                self.write_vi(it, value);
            }
            LowerOp::Iaddiu { it, is, imm15 } => {
                let value = self.unit.regs.vi(is).wrapping_add(imm15);
                self.write_vi(it, value);
            }
            LowerOp::Isubiu { it, is, imm15 } => {
                let value = self.unit.regs.vi(is).wrapping_sub(imm15);
                self.write_vi(it, value);
            }
            LowerOp::Iand { id, is, it } => {
                let value = self.unit.regs.vi(is) & self.unit.regs.vi(it);
                self.write_vi(id, value);
            }
            LowerOp::Ior { id, is, it } => {
                let value = self.unit.regs.vi(is) | self.unit.regs.vi(it);
                self.write_vi(id, value);
            }

            // Moves
            LowerOp::Move { dest, ft, fs } => {
                let value = self.unit.regs.vf(fs);
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Mr32 { dest, ft, fs } => {
                let a = self.unit.regs.vf(fs);
                self.unit.regs.set_vf(ft, [a[1], a[2], a[3], a[0]], dest);
                out.dest = (ft, dest);
            }
            LowerOp::Mfir { dest, ft, is } => {
                let bits = self.unit.regs.vi(is) as i16 as i32 as u32;
                let value = [f32::from_bits(bits); 4];
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Mtir { it, fs, fsf } => {
                let bits = self.unit.regs.vf_lane_bits(fs, fsf as usize);
                self.write_vi(it, bits as u16);
            }
            LowerOp::Mfp { dest, ft } => {
                let value = [self.unit.regs.p.read(); 4];
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }

            // Q pipe
            LowerOp::Div { fs, fsf, ft, ftf } => {
                let n = self.lane(fs, fsf);
                let d = self.lane(ft, ftf);
                let value = self.checked_divide(n, d);
                self.unit.regs.q.schedule(value, LAT_DIV);
            }
            LowerOp::Sqrt { ft, ftf } => {
                let d = self.lane(ft, ftf);
                self.unit.regs.q.schedule(d.abs().sqrt(), LAT_SQRT);
            }
            LowerOp::Rsqrt { fs, fsf, ft, ftf } => {
                let n = self.lane(fs, fsf);
                let d = self.lane(ft, ftf).abs().sqrt();
                let value = self.checked_divide(n, d);
                self.unit.regs.q.schedule(value, LAT_RSQRT);
            }
            LowerOp::Waitq => self.unit.regs.q.force(),

            // P pipe
            LowerOp::Efu { kind, fs, fsf } => {
                let value = efu_value(kind, self.unit.regs.vf(fs), fsf);
                self.unit.regs.p.schedule(value, kind.latency());
            }
            LowerOp::Waitp => self.unit.regs.p.force(),

            // R register
            LowerOp::Rinit { fs, fsf } => {
                let bits = self.unit.regs.vf_lane_bits(fs, fsf as usize);
                self.unit.regs.r = 0x3F80_0000 | (bits & 0x7F_FFFF);
            }
            LowerOp::Rget { dest, ft } => {
                let value = [f32::from_bits(self.unit.regs.r); 4];
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Rnext { dest, ft } => {
                let r = self.unit.regs.r;
                let feedback = ((r >> 4) ^ (r >> 22)) & 1;
                self.unit.regs.r = 0x3F80_0000 | ((r << 1 | feedback) & 0x7F_FFFF);
                let value = [f32::from_bits(self.unit.regs.r); 4];
                self.unit.regs.set_vf(ft, value, dest);
                out.dest = (ft, dest);
            }
            LowerOp::Rxor { fs, fsf } => {
                let bits = self.unit.regs.vf_lane_bits(fs, fsf as usize);
                self.unit.regs.r = 0x3F80_0000 | ((self.unit.regs.r ^ bits) & 0x7F_FFFF);
            }

            // GIF kick and VIF pointers
            LowerOp::Xgkick { is } => {
                let addr = self.unit.regs.vi(is);
                match self.kick.as_deref_mut() {
                    Some(kick) => kick.kick(self.unit, addr),
                    None => tracing::warn!(
                        "vu{}: xgkick at 0x{:04x} with no GIF path attached",
                        self.unit.number(),
                        addr
                    ),
                }
            }
            LowerOp::Xtop { it } => {
                let value = self.unit.regs.top;
                self.write_vi(it, value);
            }
            LowerOp::Xitop { it } => {
                let value = self.unit.regs.itop;
                self.write_vi(it, value);
            }

            // Status/MAC/clip flag reads and writes
            LowerOp::Fsand { it, imm12 } => {
                let value = self.unit.regs.status_flags & imm12;
                self.write_vi(it, value);
            }
            LowerOp::Fsor { it, imm12 } => {
                let value = self.unit.regs.status_flags | imm12;
                self.write_vi(it, value);
            }
            LowerOp::Fseq { it, imm12 } => {
                let value = (self.unit.regs.status_flags == imm12) as u16;
                self.write_vi(it, value);
            }
            LowerOp::Fsset { imm12 } => {
                // Only the sticky bits are writable
                let regs = &mut self.unit.regs;
                regs.status_flags = (regs.status_flags & 0x003F) | (imm12 & 0x0FC0);
            }
            LowerOp::Fmand { it, is } => {
                let value = self.unit.pipe.shadow.mac_visible() & self.unit.regs.vi(is);
                self.write_vi(it, value);
            }
            LowerOp::Fmor { it, is } => {
                let value = self.unit.pipe.shadow.mac_visible() | self.unit.regs.vi(is);
                self.write_vi(it, value);
            }
            LowerOp::Fmeq { it, is } => {
                let value = (self.unit.pipe.shadow.mac_visible() == self.unit.regs.vi(is)) as u16;
                self.write_vi(it, value);
            }
            LowerOp::Fcand { imm24 } => {
                let hit = self.unit.pipe.shadow.clip_visible() & imm24 != 0;
                self.write_vi(1, hit as u16);
            }
            LowerOp::Fcor { imm24 } => {
                let all = self.unit.pipe.shadow.clip_visible() | imm24 == 0xFF_FFFF;
                self.write_vi(1, all as u16);
            }
            LowerOp::Fceq { imm24 } => {
                let eq = self.unit.pipe.shadow.clip_visible() == imm24;
                self.write_vi(1, eq as u16);
            }
            LowerOp::Fcset { imm24 } => {
                self.unit.regs.clip_flags = imm24;
            }
            LowerOp::Fcget { it } => {
                let value = (self.unit.pipe.shadow.clip_visible() & 0xFFF) as u16;
                self.write_vi(it, value);
            }

            // Branches: one delay slot, conditions read through the
            // integer write shadow
            LowerOp::B { imm11 } => {
                out.branch = Some(self.rel_target(imm11));
            }
            LowerOp::Bal { it, imm11 } => {
                let link = self.unit.regs.pc.wrapping_add(2);
                self.write_vi(it, link);
                out.branch = Some(self.rel_target(imm11));
            }
            LowerOp::Jr { is } => {
                out.branch = Some(self.branch_vi(is));
            }
            LowerOp::Jalr { it, is } => {
                let target = self.branch_vi(is);
                let link = self.unit.regs.pc.wrapping_add(2);
                self.write_vi(it, link);
                out.branch = Some(target);
            }
            LowerOp::Ibeq { it, is, imm11 } => {
                if self.branch_vi(it) == self.branch_vi(is) {
                    out.branch = Some(self.rel_target(imm11));
                }
            }
            LowerOp::Ibne { it, is, imm11 } => {
                if self.branch_vi(it) != self.branch_vi(is) {
                    out.branch = Some(self.rel_target(imm11));
                }
            }
            LowerOp::Ibltz { is, imm11 } => {
                if (self.branch_vi(is) as i16) < 0 {
                    out.branch = Some(self.rel_target(imm11));
                }
            }
            LowerOp::Ibgtz { is, imm11 } => {
                if (self.branch_vi(is) as i16) > 0 {
                    out.branch = Some(self.rel_target(imm11));
                }
            }
            LowerOp::Iblez { is, imm11 } => {
                if (self.branch_vi(is) as i16) <= 0 {
                    out.branch = Some(self.rel_target(imm11));
                }
            }
            LowerOp::Ibgez { is, imm11 } => {
                if (self.branch_vi(is) as i16) >= 0 {
                    out.branch = Some(self.rel_target(imm11));
                }
            }

            LowerOp::Nop => {}
        }
        out
    }

    /// Integer register write with hazard shadow bookkeeping
    fn write_vi(&mut self, reg: u8, value: u16) {
        let old = self.unit.regs.vi(reg);
        self.unit.pipe.int_shadow.record(reg, old);
        self.unit.regs.set_vi(reg, value);
    }

    /// Branch-side integer read: sees pre-write values for in-flight writes
    fn branch_vi(&self, reg: u8) -> u16 {
        let current = self.unit.regs.vi(reg);
        self.unit.pipe.int_shadow.read(reg, current)
    }

    /// PC-relative branch target (the offset is from the delay slot)
    fn rel_target(&self, imm11: i16) -> u16 {
        (self.unit.regs.pc as i32 + 1 + imm11 as i32) as u16
    }

    fn lane(&self, reg: u8, lane_sel: u8) -> f32 {
        f32::from_bits(self.unit.regs.vf_lane_bits(reg, lane_sel as usize))
    }

    /// Divide with the hardware's zero-divisor behavior: the result
    /// saturates to the largest magnitude and the status register takes
    /// the invalid (0/0) or divide-by-zero flag.
    fn checked_divide(&mut self, n: f32, d: f32) -> f32 {
        if d != 0.0 {
            return n / d;
        }
        let flag = if n == 0.0 { status::I } else { status::D };
        self.unit.regs.status_flags |= flag | (flag << 6);
        let sign = (n.is_sign_negative() != d.is_sign_negative()) as u32;
        f32::from_bits(MAX_FLOAT_BITS | sign << 31)
    }

    /// Write one integer lane of a data quadword, leaving the rest alone
    fn store_int_lane(&mut self, addr: u16, dest: u8, value: u16) {
        let lane = mask_lane(dest);
        let mut qw = [0.0f32; 4];
        qw[lane] = f32::from_bits(value as u32);
        self.unit.data_write(addr, qw, 8 >> lane, self.peer.as_deref_mut());
    }
}

/// Lane index from a single-bit destination mask (x is bit 3)
fn mask_lane(mask: u8) -> usize {
    match mask {
        0b1000 => 0,
        0b0100 => 1,
        0b0010 => 2,
        _ => 3,
    }
}

/// Quadword address plus signed offset, wrapping in 16 bits
fn offset_addr(base: u16, imm11: i16) -> u16 {
    (base as i32).wrapping_add(imm11 as i32) as u16
}

/// EFU result value. The single-operand forms use the selected lane,
/// the vector forms the xyz(w) lanes.
fn efu_value(kind: EfuKind, a: [f32; 4], fsf: u8) -> f32 {
    let s = a[fsf as usize & 3];
    let sq = a[0] * a[0] + a[1] * a[1] + a[2] * a[2];
    match kind {
        EfuKind::Esadd => sq,
        EfuKind::Ersadd => 1.0 / sq,
        EfuKind::Eleng => sq.sqrt(),
        EfuKind::Erleng => 1.0 / sq.sqrt(),
        EfuKind::Eatanxy => a[1].atan2(a[0]),
        EfuKind::Eatanxz => a[2].atan2(a[0]),
        EfuKind::Esum => a[0] + a[1] + a[2] + a[3],
        EfuKind::Ercpr => 1.0 / s,
        EfuKind::Esqrt => s.abs().sqrt(),
        EfuKind::Ersqrt => 1.0 / s.abs().sqrt(),
        EfuKind::Esin => s.sin(),
        EfuKind::Eatan => s.atan(),
        EfuKind::Eexp => (-s).exp(),
    }
}
