//! VIF unit state machine

use oe_core::{EmotionError, VifError};
use oe_gif::{GifPath, GsRegisterSink};
use oe_vu::{KickChannel, VectorUnit, VuInterpreter};

use crate::command::{decode_command, payload_words, VifCommand};

/// Which command processor this is. VIF0 feeds VU0; VIF1 feeds VU1 and
/// owns the DIRECT pass-through into the GIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifId {
    Vif0,
    Vif1,
}

/// Everything a VIF command may need to touch outside its own state.
/// The integration layer assembles this per call; the VIF itself owns
/// nothing but registers.
pub struct VifContext<'a, 'b> {
    /// The attached vector unit
    pub vu: &'a mut VectorUnit,
    /// VU1, when driving VU0 (for the register window)
    pub peer: Option<&'a mut VectorUnit>,
    pub interp: &'a VuInterpreter,
    /// VU1's xgkick output, consumed while a triggered program runs
    pub kick: Option<&'a mut KickChannel>,
    /// PATH2 into the GIF, for DIRECT (VIF1 only)
    pub gif: Option<(&'a mut GifPath, &'a mut (dyn GsRegisterSink + 'b))>,
}

/// Where mid-command payload words are routed
#[derive(Debug, Clone, Copy)]
enum Payload {
    Stmask,
    Strow { idx: usize },
    Stcol { idx: usize },
    Mpg { byte_addr: u32 },
    Direct { buf: [u32; 4], filled: usize },
    /// Unsupported command: consume and drop the declared payload
    Skip { code: u8 },
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Receiving { payload: Payload, remaining: usize },
}

/// One VIF instance: configuration registers plus the decode state
pub struct VifUnit {
    pub id: VifId,
    state: State,
    /// CYCLE.CL / CYCLE.WL
    pub cycle_cl: u8,
    pub cycle_wl: u8,
    pub mode: u8,
    pub mask: u32,
    /// Double-buffer base and offset, in VU data quadwords (VIF1)
    pub base: u16,
    pub ofst: u16,
    /// Which half of the double buffer the next program gets
    dbf: bool,
    /// ITOP value for the next program start
    pub itops: u16,
    pub mark: u16,
    pub err: u32,
    row: [u32; 4],
    col: [u32; 4],
    /// GIF PATH3 masked off (VIF1 MSKPATH3)
    pub path3_masked: bool,
    irq_pending: bool,
}

impl VifUnit {
    pub fn new(id: VifId) -> Self {
        Self {
            id,
            state: State::Idle,
            cycle_cl: 0,
            cycle_wl: 0,
            mode: 0,
            mask: 0,
            base: 0,
            ofst: 0,
            dbf: false,
            itops: 0,
            mark: 0,
            err: 0,
            row: [0; 4],
            col: [0; 4],
            path3_masked: false,
            irq_pending: false,
        }
    }

    /// Power-on reset, abandoning any mid-command payload
    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    fn number(&self) -> u8 {
        match self.id {
            VifId::Vif0 => 0,
            VifId::Vif1 => 1,
        }
    }

    /// True when the next word will be decoded as a command
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Feed one quadword from the DMA stream, low word first
    pub fn process_qword(&mut self, qw: u128, ctx: &mut VifContext) -> oe_core::Result<()> {
        for i in 0..4 {
            let word = (qw >> (32 * i)) as u32;
            self.process_word(word, ctx)?;
        }
        Ok(())
    }

    /// Feed one 32-bit word: a command when idle, payload otherwise
    pub fn process_word(&mut self, word: u32, ctx: &mut VifContext) -> oe_core::Result<()> {
        match self.state {
            State::Idle => self.decode(word, ctx),
            State::Receiving { payload, remaining } => {
                self.consume_payload(word, payload, remaining, ctx)
            }
        }
    }

    fn decode(&mut self, word: u32, ctx: &mut VifContext) -> oe_core::Result<()> {
        let (cmd, irq) = decode_command(word);
        if irq {
            self.irq_pending = true;
        }
        let imm = (word & 0xFFFF) as u16;
        tracing::trace!("vif{}: command {:?} imm=0x{:04x}", self.number(), cmd, imm);

        match cmd {
            VifCommand::Nop => {}
            VifCommand::Stcycl => {
                self.cycle_cl = (word & 0xFF) as u8;
                self.cycle_wl = ((word >> 8) & 0xFF) as u8;
            }
            VifCommand::Offset => {
                self.require_vif1(0x02)?;
                self.ofst = imm & 0x3FF;
                self.dbf = false;
            }
            VifCommand::Base => {
                self.require_vif1(0x03)?;
                self.base = imm & 0x3FF;
            }
            VifCommand::Itop => self.itops = imm & 0x3FF,
            VifCommand::Stmod => self.mode = (word & 3) as u8,
            VifCommand::MskPath3 => {
                self.require_vif1(0x06)?;
                self.path3_masked = word & (1 << 15) != 0;
            }
            VifCommand::Mark => self.mark = imm,
            // The model is sequential: a triggered program has already
            // run to completion, so the flush family has nothing to wait
            // for by the time it decodes.
            VifCommand::FlushE | VifCommand::Flush | VifCommand::FlushA => {}
            VifCommand::Mscal | VifCommand::Mscalf => {
                self.start_program(ctx, Some(imm & 0x7FF))?;
            }
            VifCommand::Mscnt => self.start_program(ctx, None)?,
            VifCommand::Stmask => self.begin(Payload::Stmask, 1),
            VifCommand::Strow => self.begin(Payload::Strow { idx: 0 }, 4),
            VifCommand::Stcol => self.begin(Payload::Stcol { idx: 0 }, 4),
            VifCommand::Mpg => {
                let count = payload_words(cmd, word);
                self.begin(Payload::Mpg { byte_addr: (imm as u32) * 8 }, count);
            }
            VifCommand::Direct | VifCommand::DirectHl => {
                self.require_vif1(((word >> 24) & 0x7F) as u8)?;
                let count = payload_words(cmd, word);
                self.begin(Payload::Direct { buf: [0; 4], filled: 0 }, count);
            }
            VifCommand::Unpack(code) => {
                // Command space reserved; consume the declared payload so
                // the stream stays framed, then report the gap.
                self.err |= 1; // ER0: unhandled command
                let count = payload_words(cmd, word);
                self.begin(Payload::Skip { code }, count);
                return Err(VifError::NotImplemented {
                    unit: self.number(),
                    cmd: code,
                }
                .into());
            }
            VifCommand::Unknown(code) => {
                self.err |= 1; // ER0: reserved command
                tracing::warn!("vif{}: unknown command 0x{:02x}, ignored", self.number(), code);
            }
        }
        Ok(())
    }

    fn consume_payload(
        &mut self,
        word: u32,
        mut payload: Payload,
        remaining: usize,
        ctx: &mut VifContext,
    ) -> oe_core::Result<()> {
        match &mut payload {
            Payload::Stmask => self.mask = word,
            Payload::Strow { idx } => {
                self.row[*idx] = word;
                *idx += 1;
            }
            Payload::Stcol { idx } => {
                self.col[*idx] = word;
                *idx += 1;
            }
            Payload::Mpg { byte_addr } => {
                ctx.vu.write_micro32(*byte_addr, word);
                *byte_addr += 4;
            }
            Payload::Direct { buf, filled } => {
                buf[*filled] = word;
                *filled += 1;
                if *filled == 4 {
                    let qw = buf
                        .iter()
                        .enumerate()
                        .fold(0u128, |acc, (i, w)| acc | (*w as u128) << (32 * i));
                    match ctx.gif.as_mut() {
                        Some((path, sink)) => {
                            path.process_qword(qw, *sink);
                        }
                        None => tracing::warn!(
                            "vif{}: DIRECT payload with no GIF path attached",
                            self.number()
                        ),
                    }
                    *filled = 0;
                }
            }
            Payload::Skip { code } => {
                if remaining == 1 {
                    tracing::trace!(
                        "vif{}: finished skipping payload of command 0x{:02x}",
                        self.number(),
                        code
                    );
                }
            }
        }

        let remaining = remaining - 1;
        self.state = if remaining == 0 {
            State::Idle
        } else {
            State::Receiving { payload, remaining }
        };
        Ok(())
    }

    fn begin(&mut self, payload: Payload, count: usize) {
        if count == 0 {
            return;
        }
        self.state = State::Receiving {
            payload,
            remaining: count,
        };
    }

    /// MSCAL/MSCALF/MSCNT: latch the VIF-side pointers into the unit and
    /// run the microprogram to completion.
    fn start_program(&mut self, ctx: &mut VifContext, addr: Option<u16>) -> oe_core::Result<()> {
        ctx.vu.regs.itop = self.itops;
        if self.id == VifId::Vif1 {
            // TOP flips between the two halves of the double buffer
            let top = self.base + if self.dbf { self.ofst } else { 0 };
            ctx.vu.regs.top = top;
            self.dbf = !self.dbf;
        }
        let start = addr.unwrap_or(ctx.vu.regs.pc);
        ctx.interp.start(ctx.vu, start);
        ctx.interp
            .run(ctx.vu, ctx.peer.as_deref_mut(), ctx.kick.as_deref_mut())
            .map_err(EmotionError::from)?;
        Ok(())
    }

    fn require_vif1(&self, cmd: u8) -> Result<(), VifError> {
        if self.id == VifId::Vif1 {
            Ok(())
        } else {
            Err(VifError::UnsupportedOnUnit {
                unit: self.number(),
                cmd,
            })
        }
    }

    /// VIF_STAT view: decode-state bits plus the latched interrupt
    pub fn stat(&self) -> u32 {
        let vps = match self.state {
            State::Idle => 0,
            State::Receiving { .. } => 3,
        };
        let mut stat = vps;
        if self.irq_pending {
            stat |= 1 << 11;
        }
        stat
    }

    /// Register file view for bus reads, keyed by register index
    /// (offset / 0x10 from the unit's MMIO base)
    pub fn read_register(&self, index: u32) -> u32 {
        match index {
            0x0 => self.stat(),
            0x2 => self.err,
            0x3 => self.mark as u32,
            0x4 => (self.cycle_wl as u32) << 8 | self.cycle_cl as u32,
            0x5 => self.mode as u32,
            0x7 => self.mask,
            0x9 => self.base as u32,
            0xA => self.ofst as u32,
            0xB => self.itops as u32,
            _ => {
                tracing::warn!("vif{}: read of unknown register {}", self.number(), index);
                0
            }
        }
    }

    /// Bus writes to the control registers. FBRST bit 0 resets the unit.
    pub fn write_register(&mut self, index: u32, value: u32) {
        match index {
            0x1 => {
                if value & 1 != 0 {
                    tracing::debug!("vif{}: reset via FBRST", self.number());
                    self.reset();
                }
            }
            0x2 => self.err = value & 0x7,
            0x3 => self.mark = value as u16,
            _ => tracing::warn!(
                "vif{}: write of unknown register {} = 0x{:08x}, ignored",
                self.number(),
                index,
                value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oe_core::EmotionError;
    use oe_gif::RecordingGsSink;
    use oe_vu::VuId;

    fn setup() -> (VectorUnit, VuInterpreter) {
        (VectorUnit::new(VuId::Vu1), VuInterpreter::new())
    }

    fn ctx<'a>(vu: &'a mut VectorUnit, interp: &'a VuInterpreter) -> VifContext<'a, 'a> {
        VifContext {
            vu,
            peer: None,
            interp,
            kick: None,
            gif: None,
        }
    }

    #[test]
    fn test_stcycl_and_stmod() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif1);
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x0100_0102, &mut c).unwrap();
        assert_eq!(vif.cycle_cl, 2);
        assert_eq!(vif.cycle_wl, 1);
        vif.process_word(0x0500_0002, &mut c).unwrap();
        assert_eq!(vif.mode, 2);
    }

    #[test]
    fn test_stmask_payload() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif0);
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x2000_0000, &mut c).unwrap();
        assert!(!vif.is_idle());
        vif.process_word(0xDEAD_BEEF, &mut c).unwrap();
        assert!(vif.is_idle());
        assert_eq!(vif.mask, 0xDEAD_BEEF);
    }

    #[test]
    fn test_mpg_uploads_microcode() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif1);
        let mut c = ctx(&mut vu, &interp);
        // MPG num=1, addr=2: one instruction at byte 16
        vif.process_word(0x4A01_0002, &mut c).unwrap();
        vif.process_word(0x1111_1111, &mut c).unwrap();
        assert!(!vif.is_idle());
        vif.process_word(0x2222_2222, &mut c).unwrap();
        assert!(vif.is_idle());
        assert_eq!(vu.read_micro32(16), 0x1111_1111);
        assert_eq!(vu.read_micro32(20), 0x2222_2222);
    }

    #[test]
    fn test_mscal_runs_program() {
        let (mut vu, interp) = setup();
        // program at 0: iaddiu vi1, vi0, 42; E bit bundle; delay bundle
        let upper_nop: u32 = 0x3C | (0x0B << 6) | 3;
        let iaddiu = 0x08 << 25 | 1 << 16 | 42;
        vu.write_micro32(0, iaddiu);
        vu.write_micro32(4, upper_nop | 1 << 30);
        vu.write_micro32(8, 0x41 << 25);
        vu.write_micro32(12, upper_nop);

        let mut vif = VifUnit::new(VifId::Vif1);
        vif.itops = 0x33;
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x1400_0000, &mut c).unwrap();
        assert_eq!(vu.regs.vi(1), 42);
        assert_eq!(vu.regs.itop, 0x33);
        assert!(!vu.running);
    }

    #[test]
    fn test_mscal_toggles_double_buffer() {
        let (mut vu, interp) = setup();
        // empty program: E bit immediately
        let upper_nop: u32 = 0x3C | (0x0B << 6) | 3;
        vu.write_micro32(4, upper_nop | 1 << 30);
        vu.write_micro32(0, 0x41 << 25);

        let mut vif = VifUnit::new(VifId::Vif1);
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x0300_0100, &mut c).unwrap(); // BASE 0x100
        vif.process_word(0x0200_0080, &mut c).unwrap(); // OFFSET 0x80
        vif.process_word(0x1400_0000, &mut c).unwrap();
        assert_eq!(c.vu.regs.top, 0x100);
        vif.process_word(0x1400_0000, &mut c).unwrap();
        assert_eq!(c.vu.regs.top, 0x180);
    }

    #[test]
    fn test_direct_forwards_quadwords() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif1);
        let mut path = GifPath::new();
        let mut sink = RecordingGsSink::new();
        let mut c = VifContext {
            vu: &mut vu,
            peer: None,
            interp: &interp,
            kick: None,
            gif: Some((&mut path, &mut sink)),
        };
        // DIRECT 2 qwords: an A+D tag then one register write
        vif.process_word(0x5000_0002, &mut c).unwrap();
        let tag: u128 = 1 | 1 << 15 | 1u128 << 60 | 0xEu128 << 64;
        for i in 0..4 {
            vif.process_word((tag >> (32 * i)) as u32, &mut c).unwrap();
        }
        let payload: u128 = 0xABCD | 0x42u128 << 64;
        for i in 0..4 {
            vif.process_word((payload >> (32 * i)) as u32, &mut c).unwrap();
        }
        assert!(vif.is_idle());
        assert_eq!(sink.writes, vec![(0x42, 0xABCD)]);
    }

    #[test]
    fn test_unpack_reports_and_recovers() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif1);
        let mut c = ctx(&mut vu, &interp);
        // V4-32, num=1: 4 payload words
        let err = vif.process_word(0x6C01_0000, &mut c).unwrap_err();
        assert!(matches!(err, EmotionError::Vif(VifError::NotImplemented { cmd: 0x6C, .. })));
        assert_eq!(vif.err & 1, 1, "unhandled command must latch ER0");
        for _ in 0..4 {
            vif.process_word(0, &mut c).unwrap();
        }
        // stream is framed again: a MARK decodes as a command
        vif.process_word(0x0700_1234, &mut c).unwrap();
        assert_eq!(vif.mark, 0x1234);
    }

    #[test]
    fn test_vif0_rejects_vif1_commands() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif0);
        let mut c = ctx(&mut vu, &interp);
        let err = vif.process_word(0x0200_0080, &mut c).unwrap_err();
        assert!(matches!(
            err,
            EmotionError::Vif(VifError::UnsupportedOnUnit { unit: 0, cmd: 0x02 })
        ));
    }

    #[test]
    fn test_unknown_command_sets_err() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif0);
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x0800_0000, &mut c).unwrap();
        assert_eq!(vif.err & 1, 1);
        assert!(vif.is_idle());
    }

    #[test]
    fn test_irq_flag_latches_into_stat() {
        let (mut vu, interp) = setup();
        let mut vif = VifUnit::new(VifId::Vif0);
        let mut c = ctx(&mut vu, &interp);
        vif.process_word(0x8000_0000, &mut c).unwrap();
        assert_ne!(vif.stat() & (1 << 11), 0);
    }
}
