//! Bundle executor
//!
//! Drives one vector unit a bundle at a time. Per-bundle order:
//!
//! 1. tick the Q/P pipes and the integer write shadow
//! 2. fetch and decode at the current PC
//! 3. capture the I literal when the I bit is set
//! 4. gather the upper half against pre-bundle state
//! 5. run the lower half (it sees pre-upper registers)
//! 6. commit the upper half (its writes win same-register conflicts)
//! 7. advance the flag/destination histories
//! 8. advance PC, honoring a branch latched one bundle earlier
//!
//! An E bit stops the unit after one further bundle.

use oe_core::VuError;
use oe_gif::{GifPath, GifTag, GsRegisterSink, PathStatus};

use crate::decoder::{decode, LowerSlot};
use crate::instructions::{lower::LowerCtx, upper};
use crate::unit::VectorUnit;

/// Outcome of a single executed bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Running,
    /// The E bit's extra bundle has been executed; the unit stopped
    Halted,
}

/// VU1's output path to the GS: the PATH1 state machine plus whatever
/// consumes the register writes.
pub struct KickChannel {
    pub path: GifPath,
    pub sink: Box<dyn GsRegisterSink>,
}

impl KickChannel {
    pub fn new(sink: Box<dyn GsRegisterSink>) -> Self {
        Self {
            path: GifPath::new(),
            sink,
        }
    }

    /// Stream a packet from VU data memory into the GIF path, starting
    /// at `start` and running until an EOP tag's payload is exhausted.
    pub fn kick(&mut self, unit: &VectorUnit, start: u16) {
        stream_packet(&mut self.path, self.sink.as_mut(), unit, start);
    }
}

/// The `xgkick` transfer itself.
///
/// An all-zero quadword where a tag is expected means the microprogram
/// kicked garbage; the transfer stops with a warning. A tag whose
/// declared payload cannot fit in data memory at all is unreachable
/// from well-formed guest code and panics.
pub fn stream_packet(
    path: &mut GifPath,
    sink: &mut dyn GsRegisterSink,
    unit: &VectorUnit,
    start: u16,
) {
    let capacity = unit.data_qwords() as usize;
    let mut addr = start % unit.data_qwords();
    // Abandon any leftover stream state from an aborted kick
    if !path.awaiting_tag() {
        tracing::warn!("vu{}: xgkick with a previous packet mid-stream", unit.number());
        path.reset();
    }
    for _ in 0..capacity * 8 {
        let qw = unit.data_read_qword(addr);
        if path.awaiting_tag() {
            if qw == 0 {
                tracing::warn!(
                    "vu{}: xgkick hit an all-zero GIF tag at 0x{:04x}, stopping",
                    unit.number(),
                    addr
                );
                path.reset();
                return;
            }
            let declared = GifTag::parse(qw).payload_qwords();
            if declared > capacity {
                panic!(
                    "xgkick tag at 0x{:04x} declares {} quadwords, data memory holds {}",
                    addr, declared, capacity
                );
            }
        }
        addr = (addr + 1) % unit.data_qwords();
        if path.process_qword(qw, sink) == PathStatus::EndOfPacket {
            return;
        }
    }
    tracing::warn!("vu{}: xgkick stream never reached EOP, abandoning", unit.number());
    path.reset();
}

/// The microprogram interpreter
pub struct VuInterpreter {
    /// Bundle cap for `run`; 0 selects 16x micro memory capacity
    runaway_limit: usize,
    trace: bool,
}

impl VuInterpreter {
    pub fn new() -> Self {
        Self {
            runaway_limit: 0,
            trace: false,
        }
    }

    pub fn with_config(runaway_limit: usize, trace: bool) -> Self {
        Self {
            runaway_limit,
            trace,
        }
    }

    /// Begin a microprogram at `addr` (in instruction words)
    pub fn start(&self, unit: &mut VectorUnit, addr: u16) {
        unit.regs.pc = addr % unit.instr_count();
        unit.regs.tpc = unit.regs.pc;
        unit.pipe.reset();
        unit.running = true;
    }

    /// Execute one bundle
    pub fn step(
        &self,
        unit: &mut VectorUnit,
        mut peer: Option<&mut VectorUnit>,
        mut kick: Option<&mut KickChannel>,
    ) -> StepResult {
        if !unit.running {
            return StepResult::Halted;
        }

        unit.regs.q.tick();
        unit.regs.p.tick();
        unit.pipe.int_shadow.tick();

        let halt_after = unit.pipe.end_pending;
        let pc = unit.regs.pc;
        let bundle = decode(unit.fetch(pc));
        if self.trace {
            tracing::trace!("vu{} pc=0x{:04x} raw=0x{:016x}", unit.number(), pc, bundle.raw);
        }

        let pending_branch = unit.pipe.branch.take();

        // The I literal is visible to this bundle's own upper half
        if let LowerSlot::Imm(bits) = bundle.lower {
            unit.regs.i = f32::from_bits(bits);
        }

        let commit = upper::compute(&unit.regs, &bundle.upper);

        let outcome = match bundle.lower {
            LowerSlot::Op(op) => {
                let mut ctx = LowerCtx {
                    unit,
                    peer: peer.as_deref_mut(),
                    kick: kick.as_deref_mut(),
                };
                ctx.execute(&op)
            }
            LowerSlot::Imm(_) => Default::default(),
        };

        let upper_dest = commit.dest();
        upper::apply(&mut unit.regs, commit);

        unit.pipe.shadow.advance(
            upper_dest,
            outcome.dest,
            unit.regs.mac_flags,
            unit.regs.clip_flags,
        );

        if let Some(target) = outcome.branch {
            unit.pipe.branch = Some(target % unit.instr_count());
        }

        unit.regs.pc = pending_branch.unwrap_or_else(|| (pc + 1) % unit.instr_count());

        if bundle.e_bit {
            unit.pipe.end_pending = true;
        }
        if halt_after {
            unit.running = false;
            unit.pipe.end_pending = false;
            unit.pipe.branch = None;
            return StepResult::Halted;
        }
        StepResult::Running
    }

    /// Run until the microprogram halts. Errors out if the bundle cap
    /// is exceeded, which almost always means the program never sets
    /// an E bit.
    pub fn run(
        &self,
        unit: &mut VectorUnit,
        mut peer: Option<&mut VectorUnit>,
        mut kick: Option<&mut KickChannel>,
    ) -> Result<usize, VuError> {
        let limit = if self.runaway_limit > 0 {
            self.runaway_limit
        } else {
            unit.instr_count() as usize * 16
        };
        let mut executed = 0usize;
        while unit.running {
            self.step(unit, peer.as_deref_mut(), kick.as_deref_mut());
            executed += 1;
            if executed > limit {
                unit.running = false;
                return Err(VuError::RunawayProgram {
                    unit: unit.number(),
                    executed,
                });
            }
        }
        Ok(executed)
    }
}

impl Default for VuInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::VuId;
    use oe_gif::RecordingGsSink;

    /// Write a bundle into micro memory at instruction index `idx`
    fn put(unit: &mut VectorUnit, idx: u32, upper: u32, lower: u32) {
        unit.write_micro32(idx * 8, lower);
        unit.write_micro32(idx * 8 + 4, upper);
    }

    /// NOP upper, NOP lower, E bit set
    const E_BIT: u32 = 1 << 30;
    const UPPER_NOP: u32 = 0x3C | (0x0B << 6) | 3; // unassigned escape slot
    const LOWER_NOP: u32 = 0x41 << 25; // unassigned opcode

    #[test]
    fn test_e_bit_runs_one_more_bundle() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        // bundle 0: E bit; bundle 1: delay bundle; bundle 2 never runs
        put(&mut unit, 0, UPPER_NOP | E_BIT, LOWER_NOP);
        put(&mut unit, 1, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        assert_eq!(interp.step(&mut unit, None, None), StepResult::Running);
        assert_eq!(interp.step(&mut unit, None, None), StepResult::Halted);
        assert!(!unit.running);
    }

    #[test]
    fn test_runaway_without_e_bit() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        // all-NOP micro memory loops forever
        for idx in 0..unit.instr_count() as u32 {
            put(&mut unit, idx, UPPER_NOP, LOWER_NOP);
        }
        let interp = VuInterpreter::with_config(100, false);
        interp.start(&mut unit, 0);
        let err = interp.run(&mut unit, None, None).unwrap_err();
        assert!(matches!(err, VuError::RunawayProgram { unit: 1, .. }));
    }

    #[test]
    fn test_branch_delay_slot() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        // 0: b +2 (target 3); 1: delay slot iaddiu vi1 += 1; 2: iaddiu
        // vi2 += 1 (skipped); 3: iaddiu vi3 += 1, E; 4: delay bundle
        let iaddiu = |it: u32, imm: u32| 0x08 << 25 | it << 16 | imm & 0x7FF;
        put(&mut unit, 0, UPPER_NOP, 0x20 << 25 | 2);
        put(&mut unit, 1, UPPER_NOP, iaddiu(1, 1));
        put(&mut unit, 2, UPPER_NOP, iaddiu(2, 1));
        put(&mut unit, 3, UPPER_NOP | E_BIT, iaddiu(3, 1));
        put(&mut unit, 4, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, None).unwrap();
        assert_eq!(unit.regs.vi(1), 1, "delay slot must execute");
        assert_eq!(unit.regs.vi(2), 0, "branched-over bundle must not");
        assert_eq!(unit.regs.vi(3), 1);
    }

    #[test]
    fn test_upper_wins_same_register_conflict() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        unit.regs.set_vf(1, [1.0; 4], 0xF);
        unit.regs.set_vf(2, [2.0; 4], 0xF);
        // upper: add vf03 = vf01 + vf02; lower: move vf03 <- vf01
        let add = 0x28 | 0xF << 21 | 2 << 16 | 1 << 11 | 3 << 6;
        let mv = 0x40 << 25 | 0x3C | (0x30 >> 2) << 6 | 0xF << 21 | 3 << 16 | 1 << 11;
        put(&mut unit, 0, add, mv);
        put(&mut unit, 1, UPPER_NOP | E_BIT, LOWER_NOP);
        put(&mut unit, 2, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, None).unwrap();
        assert_eq!(unit.regs.vf(3), [3.0; 4]);
    }

    #[test]
    fn test_lower_sees_pre_upper_value() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        unit.regs.set_vf(1, [1.0; 4], 0xF);
        unit.regs.set_vf(2, [2.0; 4], 0xF);
        unit.regs.set_vf(3, [9.0; 4], 0xF);
        // upper overwrites vf03 while the lower half stores it: the
        // store must capture the old value
        let add = 0x28 | 0xF << 21 | 2 << 16 | 1 << 11 | 3 << 6;
        let sq = 0x01 << 25 | 0xF << 21 | 3 << 11; // sq vf03, 0(vi00)
        put(&mut unit, 0, add, sq);
        put(&mut unit, 1, UPPER_NOP | E_BIT, LOWER_NOP);
        put(&mut unit, 2, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, None).unwrap();
        assert_eq!(unit.data_read(0, None), [9.0; 4]);
        assert_eq!(unit.regs.vf(3), [3.0; 4]);
    }

    #[test]
    fn test_i_bit_literal_feeds_same_bundle() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        unit.regs.set_vf(1, [2.0; 4], 0xF);
        // upper: muli vf03 = vf01 * I, with I = 4.0 in the same word
        let muli = 0x1E | 0xF << 21 | 1 << 11 | 3 << 6 | 1 << 31;
        put(&mut unit, 0, muli, 4.0f32.to_bits());
        put(&mut unit, 1, UPPER_NOP | E_BIT, LOWER_NOP);
        put(&mut unit, 2, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, None).unwrap();
        assert_eq!(unit.regs.vf(3), [8.0; 4]);
    }

    #[test]
    fn test_q_latency_observed_across_bundles() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        unit.regs.set_vf(1, [0.0, 10.0, 0.0, 0.0], 0xF);
        unit.regs.set_vf(2, [0.0, 0.0, 0.0, 4.0], 0xF);
        // 0: div q, vf01.y / vf02.w; 1: addq vf03 (too early, sees 0);
        // then NOPs until the divide lands; 9: addq vf04 sees 2.5
        let div = 0x40 << 25 | 0x3C | (0x38 >> 2) << 6 | 1 << 21 | 3 << 23 | 2 << 16 | 1 << 11;
        let addq = |fd: u32| 0x20 | 0xF << 21 | 0 << 11 | fd << 6; // vf00 + q -> w lane holds 1+q
        put(&mut unit, 0, UPPER_NOP, div);
        put(&mut unit, 1, addq(3), LOWER_NOP);
        for idx in 2..8 {
            put(&mut unit, idx, UPPER_NOP, LOWER_NOP);
        }
        put(&mut unit, 8, addq(4), LOWER_NOP);
        put(&mut unit, 9, UPPER_NOP | E_BIT, LOWER_NOP);
        put(&mut unit, 10, UPPER_NOP, LOWER_NOP);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, None).unwrap();
        // bundle 1 ran before the 7-bundle latency elapsed
        assert_eq!(unit.regs.vf(3)[0], 0.0);
        // bundle 8 is 8 bundles after the divide issued
        assert_eq!(unit.regs.vf(4)[0], 2.5);
    }

    #[test]
    fn test_xgkick_streams_packet() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        // A+D packet at qword 4: one write of 0x77 to register 0x50
        let tag = 1u128 | 1 << 15 | 1u128 << 60 | 0xEu128 << 64;
        unit.data_write_qword(4, tag);
        unit.data_write_qword(5, 0x77u128 | 0x50u128 << 64);
        let mut path = GifPath::new();
        let mut sink = RecordingGsSink::new();
        stream_packet(&mut path, &mut sink, &unit, 4);
        assert_eq!(sink.writes, vec![(0x50, 0x77)]);
        assert!(path.awaiting_tag());
    }

    #[test]
    fn test_xgkick_from_microprogram() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        let tag = 1u128 | 1 << 15 | 1u128 << 60 | 0xEu128 << 64;
        unit.data_write_qword(4, tag);
        unit.data_write_qword(5, 0x77u128 | 0x50u128 << 64);
        unit.regs.set_vi(1, 4);
        let kick_op = 0x40 << 25 | 0x3C | (0x6C >> 2) << 6 | 1 << 11;
        put(&mut unit, 0, UPPER_NOP | E_BIT, kick_op);
        put(&mut unit, 1, UPPER_NOP, LOWER_NOP);
        let mut kick = KickChannel::new(Box::new(RecordingGsSink::new()));
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 0);
        interp.run(&mut unit, None, Some(&mut kick)).unwrap();
        assert!(kick.path.awaiting_tag());
    }

    #[test]
    fn test_kick_stops_on_zero_tag() {
        let unit = VectorUnit::new(VuId::Vu1);
        let mut path = GifPath::new();
        let mut sink = RecordingGsSink::new();
        // data memory is all zero: the kick must bail immediately
        stream_packet(&mut path, &mut sink, &unit, 0);
        assert!(path.awaiting_tag());
        assert!(sink.writes.is_empty());
    }

    #[test]
    #[should_panic(expected = "declares")]
    fn test_kick_panics_on_oversized_tag() {
        let mut unit = VectorUnit::new(VuId::Vu1);
        // image tag declaring 0x7FFF quadwords, far beyond 1024
        let tag = 0x7FFFu128 | 1 << 15 | 2u128 << 58;
        unit.data_write_qword(0, tag);
        let mut path = GifPath::new();
        let mut sink = RecordingGsSink::new();
        stream_packet(&mut path, &mut sink, &unit, 0);
    }

    #[test]
    fn test_start_wraps_and_latches_tpc() {
        let mut unit = VectorUnit::new(VuId::Vu0);
        let interp = VuInterpreter::new();
        interp.start(&mut unit, 512 + 7);
        assert_eq!(unit.regs.pc, 7);
        assert_eq!(unit.regs.tpc, 7);
        assert!(unit.running);
    }
}
