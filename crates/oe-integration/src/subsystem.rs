//! The assembled vector subsystem
//!
//! `EmotionSubsystem` owns every component and exposes the guest's view
//! of them: bus reads and writes dispatched by physical address, and a
//! `step` that services the DMA channels with their destinations
//! attached. The components themselves never hold references to each
//! other; every connection is assembled here, per call.

use oe_core::{Config, EmotionError};
use oe_dmac::channel::CHANNEL_COUNT;
use oe_dmac::{DmaSink, Dmac, SinkStatus};
use oe_gif::{GifPath, GsRegisterSink, RecordingGsSink};
use oe_memory::EeMemory;
use oe_vif::{VifContext, VifId, VifUnit};
use oe_vu::{KickChannel, VectorUnit, VuId, VuInterpreter};

// MMIO map
const GIF_BASE: u32 = 0x1000_3000;
const VIF0_BASE: u32 = 0x1000_3800;
const VIF1_BASE: u32 = 0x1000_3C00;
const VU0_MICRO_BASE: u32 = 0x1100_0000;
const VU0_DATA_BASE: u32 = 0x1100_4000;
const VU1_MICRO_BASE: u32 = 0x1100_8000;
const VU1_DATA_BASE: u32 = 0x1100_C000;

/// The Emotion Engine vector/graphics coprocessor subsystem
pub struct EmotionSubsystem {
    pub mem: EeMemory,
    pub vu0: VectorUnit,
    pub vu1: VectorUnit,
    pub vif0: VifUnit,
    pub vif1: VifUnit,
    /// PATH2/PATH3 into the GS register space
    pub gif: GifPath,
    pub gs: RecordingGsSink,
    /// PATH1: VU1 xgkick output, with its own capture sink
    pub kick: KickChannel,
    pub dmac: Dmac,
    interp: VuInterpreter,
}

impl EmotionSubsystem {
    /// Build a subsystem in power-on state with default settings
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        tracing::info!("Initializing Emotion Engine vector subsystem");
        let mut dmac = Dmac::new();
        dmac.trace_tags = config.dmac.trace_tags;
        Self {
            mem: EeMemory::new(),
            vu0: VectorUnit::new(VuId::Vu0),
            vu1: VectorUnit::new(VuId::Vu1),
            vif0: VifUnit::new(VifId::Vif0),
            vif1: VifUnit::new(VifId::Vif1),
            gif: GifPath::new(),
            gs: RecordingGsSink::new(),
            kick: KickChannel::new(Box::new(RecordingGsSink::new())),
            dmac,
            interp: VuInterpreter::with_config(
                config.vu.runaway_limit,
                config.vu.trace_execution,
            ),
        }
    }

    /// Reset everything to power-on state
    pub fn reset(&mut self) {
        self.mem.reset();
        self.vu0.reset();
        self.vu1.reset();
        self.vif0.reset();
        self.vif1.reset();
        self.gif.reset();
        self.gs = RecordingGsSink::new();
        self.kick = KickChannel::new(Box::new(RecordingGsSink::new()));
        self.dmac.reset();
    }

    /// Interrupt line toward the CPU core
    pub fn irq_line(&self) -> bool {
        self.dmac.irq_line()
    }

    /// COP2-side CMSAR0 write: latch the start address and run a VU0
    /// microprogram from it.
    pub fn cmsar0_write(&mut self, addr: u16) -> oe_core::Result<()> {
        self.vu0.regs.cmsar0 = addr;
        self.interp.start(&mut self.vu0, addr);
        self.interp
            .run(&mut self.vu0, Some(&mut self.vu1), None)
            .map_err(EmotionError::from)?;
        Ok(())
    }

    /// Service every started DMA channel with its destination attached.
    /// Each channel runs to completion or to a natural suspension point.
    pub fn step(&mut self) -> oe_core::Result<()> {
        let Self {
            mem,
            vu0,
            vu1,
            vif0,
            vif1,
            gif,
            gs,
            kick,
            dmac,
            interp,
        } = self;

        for idx in 0..CHANNEL_COUNT {
            let result = match idx {
                // VIF0 drives VU0, with the window onto VU1
                0 => {
                    let mut sink = VifChannelSink {
                        vif: &mut *vif0,
                        vu: &mut *vu0,
                        peer: Some(&mut *vu1),
                        interp,
                        kick: None,
                        gif: None,
                    };
                    dmac.service_channel(idx, mem, Some(&mut sink))
                }
                // VIF1 drives VU1; DIRECT goes to the GIF as PATH2 and a
                // triggered program kicks PATH1
                1 => {
                    let mut sink = VifChannelSink {
                        vif: &mut *vif1,
                        vu: &mut *vu1,
                        peer: None,
                        interp,
                        kick: Some(&mut *kick),
                        gif: Some((&mut *gif, &mut *gs)),
                    };
                    dmac.service_channel(idx, mem, Some(&mut sink))
                }
                // GIF channel is PATH3
                2 => {
                    let mut sink = GifChannelSink {
                        path: &mut *gif,
                        gs: &mut *gs,
                        masked: vif1.path3_masked,
                    };
                    dmac.service_channel(idx, mem, Some(&mut sink))
                }
                _ => dmac.service_channel(idx, mem, None),
            };
            result.map_err(EmotionError::from)?;
        }
        Ok(())
    }

    /// Bus read, 32-bit
    pub fn read32(&self, addr: u32) -> u32 {
        match addr {
            GIF_BASE..=0x1000_37FF => match addr - GIF_BASE {
                0x20 => self.gif.stat(),
                offset => {
                    tracing::warn!("GIF read of unknown register offset 0x{:02x}", offset);
                    0
                }
            },
            VIF0_BASE..=0x1000_3BFF => self.vif0.read_register((addr - VIF0_BASE) >> 4),
            VIF1_BASE..=0x1000_3FFF => self.vif1.read_register((addr - VIF1_BASE) >> 4),
            0x1000_8000..=0x1000_FFFF => self.dmac.read32(addr),
            VU0_MICRO_BASE..=0x1100_3FFF => self.vu0.read_micro32(addr - VU0_MICRO_BASE),
            VU0_DATA_BASE..=0x1100_7FFF => vu_data_read32(&self.vu0, addr - VU0_DATA_BASE),
            VU1_MICRO_BASE..=0x1100_BFFF => self.vu1.read_micro32(addr - VU1_MICRO_BASE),
            VU1_DATA_BASE..=0x1100_FFFF => vu_data_read32(&self.vu1, addr - VU1_DATA_BASE),
            0x1000_0000..=0x1001_FFFF => {
                tracing::trace!("Read of unmodeled IO register 0x{:08x}", addr);
                0
            }
            _ => self.mem.read32(addr),
        }
    }

    /// Bus write, 32-bit. Starting a busy DMA channel is the one write
    /// that fails; everything else is applied or warned and ignored.
    pub fn write32(&mut self, addr: u32, value: u32) -> oe_core::Result<()> {
        match addr {
            GIF_BASE..=0x1000_37FF => match addr - GIF_BASE {
                0x00 => self.gif.ctrl_write(value),
                offset => tracing::warn!(
                    "GIF write of unknown register offset 0x{:02x} = 0x{:08x}, ignored",
                    offset,
                    value
                ),
            },
            VIF0_BASE..=0x1000_3BFF => {
                self.vif0.write_register((addr - VIF0_BASE) >> 4, value)
            }
            VIF1_BASE..=0x1000_3FFF => {
                self.vif1.write_register((addr - VIF1_BASE) >> 4, value)
            }
            0x1000_8000..=0x1000_FFFF => {
                self.dmac.write32(addr, value).map_err(EmotionError::from)?
            }
            VU0_MICRO_BASE..=0x1100_3FFF => self.vu0.write_micro32(addr - VU0_MICRO_BASE, value),
            VU0_DATA_BASE..=0x1100_7FFF => {
                vu_data_write32(&mut self.vu0, addr - VU0_DATA_BASE, value)
            }
            VU1_MICRO_BASE..=0x1100_BFFF => self.vu1.write_micro32(addr - VU1_MICRO_BASE, value),
            VU1_DATA_BASE..=0x1100_FFFF => {
                vu_data_write32(&mut self.vu1, addr - VU1_DATA_BASE, value)
            }
            0x1000_0000..=0x1001_FFFF => tracing::warn!(
                "Write of unmodeled IO register 0x{:08x} = 0x{:08x}, ignored",
                addr,
                value
            ),
            _ => self.mem.write32(addr, value),
        }
        Ok(())
    }

    /// Bus read, 8-bit (IO registers are read at word granularity)
    pub fn read8(&self, addr: u32) -> u8 {
        if is_guest_memory(addr) {
            self.mem.read8(addr)
        } else {
            (self.read32(addr & !3) >> ((addr & 3) * 8)) as u8
        }
    }

    pub fn read16(&self, addr: u32) -> u16 {
        if is_guest_memory(addr) {
            self.mem.read16(addr)
        } else {
            (self.read32(addr & !3) >> ((addr & 2) * 8)) as u16
        }
    }

    pub fn read64(&self, addr: u32) -> u64 {
        if is_guest_memory(addr) {
            self.mem.read64(addr)
        } else {
            let addr = addr & !7;
            self.read32(addr) as u64 | (self.read32(addr + 4) as u64) << 32
        }
    }

    pub fn read128(&self, addr: u32) -> u128 {
        if is_guest_memory(addr) {
            self.mem.read128(addr)
        } else {
            let addr = addr & !15;
            (0..4).fold(0u128, |acc, i| {
                acc | (self.read32(addr + i * 4) as u128) << (32 * i)
            })
        }
    }

    /// Sub-word IO writes are not modeled; guest memory takes them
    pub fn write8(&mut self, addr: u32, value: u8) {
        if is_guest_memory(addr) {
            self.mem.write8(addr, value);
        } else {
            tracing::warn!("Byte write to IO register 0x{:08x} ignored", addr);
        }
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        if is_guest_memory(addr) {
            self.mem.write16(addr, value);
        } else {
            tracing::warn!("Halfword write to IO register 0x{:08x} ignored", addr);
        }
    }

    pub fn write64(&mut self, addr: u32, value: u64) -> oe_core::Result<()> {
        if is_guest_memory(addr) {
            self.mem.write64(addr, value);
            return Ok(());
        }
        let addr = addr & !7;
        self.write32(addr, value as u32)?;
        self.write32(addr + 4, (value >> 32) as u32)
    }

    pub fn write128(&mut self, addr: u32, value: u128) -> oe_core::Result<()> {
        if is_guest_memory(addr) {
            self.mem.write128(addr, value);
            return Ok(());
        }
        let addr = addr & !15;
        for i in 0..4 {
            self.write32(addr + i * 4, (value >> (32 * i)) as u32)?;
        }
        Ok(())
    }
}

impl Default for EmotionSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Addresses that bypass the IO dispatch and land in RAM or scratchpad
fn is_guest_memory(addr: u32) -> bool {
    !(0x1000_0000..0x1002_0000).contains(&addr) && !(0x1100_0000..0x1101_0000).contains(&addr)
}

/// 32-bit view into a unit's quadword-granular data memory
fn vu_data_read32(unit: &VectorUnit, offset: u32) -> u32 {
    let qw = unit.data_read_qword((offset / 16) as u16);
    (qw >> (32 * ((offset % 16) / 4))) as u32
}

fn vu_data_write32(unit: &mut VectorUnit, offset: u32, value: u32) {
    let addr_qw = (offset / 16) as u16;
    let shift = 32 * ((offset % 16) / 4);
    let qw = unit.data_read_qword(addr_qw);
    let patched = (qw & !(0xFFFF_FFFFu128 << shift)) | (value as u128) << shift;
    unit.data_write_qword(addr_qw, patched);
}

/// DMA destination adapter for a VIF channel. Command errors are
/// reported and the stream keeps flowing; the VIF's payload framing
/// keeps itself consistent.
struct VifChannelSink<'a> {
    vif: &'a mut VifUnit,
    vu: &'a mut VectorUnit,
    peer: Option<&'a mut VectorUnit>,
    interp: &'a VuInterpreter,
    kick: Option<&'a mut KickChannel>,
    gif: Option<(&'a mut GifPath, &'a mut dyn GsRegisterSink)>,
}

impl DmaSink for VifChannelSink<'_> {
    fn push_qword(&mut self, qw: u128) -> SinkStatus {
        let mut ctx = VifContext {
            vu: &mut *self.vu,
            peer: self.peer.as_deref_mut(),
            interp: self.interp,
            kick: self.kick.as_deref_mut(),
            gif: self
                .gif
                .as_mut()
                .map(|(path, sink)| (&mut **path, &mut **sink)),
        };
        if let Err(e) = self.vif.process_qword(qw, &mut ctx) {
            tracing::warn!("VIF command stream: {}", e);
        }
        SinkStatus::Accepted
    }
}

/// DMA destination adapter for the GIF channel (PATH3)
struct GifChannelSink<'a> {
    path: &'a mut GifPath,
    gs: &'a mut dyn GsRegisterSink,
    /// MSKPATH3 latched on VIF1; a masked path refuses data
    masked: bool,
}

impl DmaSink for GifChannelSink<'_> {
    fn push_qword(&mut self, qw: u128) -> SinkStatus {
        if self.masked {
            return SinkStatus::NotReady;
        }
        self.path.process_qword(qw, &mut *self.gs);
        SinkStatus::Accepted
    }
}
