//! The DMA controller engine

use std::collections::VecDeque;

use oe_core::DmacError;
use oe_memory::{EeMemory, DMA_SPR_SELECT, QWORD_SIZE};

use crate::channel::{
    ChannelMode, DmaChannel, CHANNEL_BASES, CHANNEL_COUNT, CHANNEL_NAMES,
};
use crate::tag::{DmaTag, TagId};
use crate::{DmaSink, SinkStatus};

/// Channel indices, matching `ChannelId` and the register-bank order
const CH_VIF0: usize = 0;
const CH_VIF1: usize = 1;
const CH_GIF: usize = 2;
const CH_SIF0: usize = 5;
const CH_SIF1: usize = 6;
const CH_SPR_FROM: usize = 8;
const CH_SPR_TO: usize = 9;

/// Global register addresses
const D_CTRL: u32 = 0x1000_E000;
const D_STAT: u32 = 0x1000_E010;
const D_PCR: u32 = 0x1000_E020;
const D_SQWC: u32 = 0x1000_E030;
const D_RBSR: u32 = 0x1000_E040;
const D_RBOR: u32 = 0x1000_E050;
const D_ENABLER: u32 = 0x1000_F520;
const D_ENABLEW: u32 = 0x1000_F590;

/// Tags walked per service call before the chain is declared malformed
const CHAIN_TAG_LIMIT: usize = 16 * 1024;

/// Whether a service call finished the channel's transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Finished,
    /// Destination or FIFO not ready; the channel stays busy
    Suspended,
}

/// Destinations for the source channels, assembled per `step` call
pub struct ChannelSinks<'a> {
    pub vif0: Option<&'a mut dyn DmaSink>,
    pub vif1: Option<&'a mut dyn DmaSink>,
    pub gif: Option<&'a mut dyn DmaSink>,
}

impl ChannelSinks<'_> {
    /// No destinations attached; source data is discarded with a warning
    pub fn none() -> ChannelSinks<'static> {
        ChannelSinks {
            vif0: None,
            vif1: None,
            gif: None,
        }
    }
}

/// The rendezvous FIFOs accept everything
impl DmaSink for VecDeque<u128> {
    fn push_qword(&mut self, qw: u128) -> SinkStatus {
        self.push_back(qw);
        SinkStatus::Accepted
    }
}

/// Detached destination: counts and drops
struct DiscardSink(usize);

impl DmaSink for DiscardSink {
    fn push_qword(&mut self, _qw: u128) -> SinkStatus {
        self.0 += 1;
        SinkStatus::Accepted
    }
}

/// The EE DMA controller: ten channels plus the global registers
pub struct Dmac {
    channels: [DmaChannel; CHANNEL_COUNT],
    pub ctrl: u32,
    /// Sticky per-channel completion flags (D_STAT low half)
    stat_flags: u32,
    /// Interrupt masks (D_STAT high half)
    stat_masks: u32,
    pcr: u32,
    sqwc: u32,
    rbsr: u32,
    rbor: u32,
    enable: u32,
    /// Log every decoded chain tag at debug level
    pub trace_tags: bool,
    /// Quadwords arriving from the IOP side, drained by SIF0
    sif0_in: VecDeque<u128>,
    /// Quadwords SIF1 has sent toward the IOP side
    sif1_out: VecDeque<u128>,
}

impl Dmac {
    pub fn new() -> Self {
        Self {
            channels: [DmaChannel::default(); CHANNEL_COUNT],
            // DMAE set: guests that never touch D_CTRL still transfer
            ctrl: 1,
            stat_flags: 0,
            stat_masks: 0,
            pcr: 0,
            sqwc: 0,
            rbsr: 0,
            rbor: 0,
            enable: 0,
            trace_tags: false,
            sif0_in: VecDeque::new(),
            sif1_out: VecDeque::new(),
        }
    }

    pub fn reset(&mut self) {
        let trace_tags = self.trace_tags;
        *self = Self::new();
        self.trace_tags = trace_tags;
    }

    pub fn channel(&self, idx: usize) -> &DmaChannel {
        &self.channels[idx]
    }

    pub fn channel_mut(&mut self, idx: usize) -> &mut DmaChannel {
        &mut self.channels[idx]
    }

    /// Interrupt line toward the CPU: pure recomputation, never stored
    pub fn irq_line(&self) -> bool {
        self.stat_flags & self.stat_masks & 0x3FF != 0
    }

    /// Queue a quadword on the inbound SIF FIFO (the IOP side's send)
    pub fn sif0_push(&mut self, qw: u128) {
        self.sif0_in.push_back(qw);
    }

    /// Drain one quadword SIF1 produced for the IOP side
    pub fn sif1_pop(&mut self) -> Option<u128> {
        self.sif1_out.pop_front()
    }

    pub fn sif1_len(&self) -> usize {
        self.sif1_out.len()
    }

    /// Transfers are allowed to run (D_CTRL.DMAE set, D_ENABLEW clear)
    fn transfers_enabled(&self) -> bool {
        self.ctrl & 1 != 0 && self.enable & (1 << 16) == 0
    }

    /// Service one channel if it has been started: run it to completion
    /// or to a natural suspension point. Source channels (VIF0/VIF1/GIF)
    /// deliver into `sink`; the other channels ignore it.
    pub fn service_channel(
        &mut self,
        idx: usize,
        mem: &mut EeMemory,
        sink: Option<&mut (dyn DmaSink + '_)>,
    ) -> Result<(), DmacError> {
        if !self.transfers_enabled() || !self.channels[idx].busy() {
            return Ok(());
        }
        let progress = match idx {
            CH_VIF0 | CH_VIF1 | CH_GIF => match sink {
                Some(sink) => {
                    run_source_channel(&mut self.channels[idx], idx, mem, sink, self.trace_tags)
                }
                None => {
                    let mut void = DiscardSink(0);
                    let p = run_source_channel(
                        &mut self.channels[idx],
                        idx,
                        mem,
                        &mut void,
                        self.trace_tags,
                    );
                    tracing::warn!(
                        "{}: no destination attached, dropped {} quadwords",
                        CHANNEL_NAMES[idx],
                        void.0
                    );
                    p
                }
            },
            CH_SIF0 => self.service_sif0(mem),
            CH_SIF1 => {
                let trace_tags = self.trace_tags;
                run_source_channel(&mut self.channels[CH_SIF1], idx, mem, &mut self.sif1_out, trace_tags)
            }
            CH_SPR_FROM | CH_SPR_TO => {
                run_spr_channel(&mut self.channels[idx], idx == CH_SPR_TO, self.sqwc, mem)
            }
            _ => {
                self.channels[idx].set_busy(false);
                return Err(DmacError::UnimplementedChannel {
                    channel: idx,
                    name: CHANNEL_NAMES[idx],
                });
            }
        };
        if progress == Progress::Finished {
            self.complete(idx);
        }
        Ok(())
    }

    /// Service every started channel in priority order
    pub fn step(
        &mut self,
        mem: &mut EeMemory,
        sinks: &mut ChannelSinks,
    ) -> Result<(), DmacError> {
        for idx in 0..CHANNEL_COUNT {
            let sink = match idx {
                CH_VIF0 => sinks.vif0.as_deref_mut(),
                CH_VIF1 => sinks.vif1.as_deref_mut(),
                CH_GIF => sinks.gif.as_deref_mut(),
                _ => None,
            };
            self.service_channel(idx, mem, sink)?;
        }
        Ok(())
    }

    /// Exactly one busy-clear and one sticky flag per finished transfer
    fn complete(&mut self, idx: usize) {
        tracing::debug!("{}: transfer complete", CHANNEL_NAMES[idx]);
        self.channels[idx].set_busy(false);
        self.stat_flags |= 1 << idx;
    }

    /// SIF0 receives a destination chain from the inbound FIFO. An
    /// empty (or tag-only) FIFO suspends with zero progress.
    fn service_sif0(&mut self, mem: &mut EeMemory) -> Progress {
        loop {
            let ch = &mut self.channels[CH_SIF0];
            if ch.qwc == 0 && !ch.chain_end {
                let Some(&front) = self.sif0_in.front() else {
                    return Progress::Suspended;
                };
                let tag = DmaTag::parse(front);
                // Consume the tag only when its whole payload is here,
                // so a partial arrival makes no progress at all
                if self.sif0_in.len() < 1 + tag.qwc as usize {
                    return Progress::Suspended;
                }
                self.sif0_in.pop_front();
                ch.madr = tag.mem_addr();
                ch.qwc = tag.qwc as u32;
                ch.set_tag_view(tag.chcr_view);
                if (tag.irq && ch.tie()) || matches!(tag.id, TagId::End | TagId::Refe) {
                    ch.chain_end = true;
                }
            }
            while ch.qwc > 0 {
                match self.sif0_in.pop_front() {
                    Some(qw) => {
                        mem.write128(ch.madr, qw);
                        ch.madr = ch.madr.wrapping_add(QWORD_SIZE);
                        ch.qwc -= 1;
                    }
                    None => return Progress::Suspended,
                }
            }
            if ch.chain_end {
                ch.chain_end = false;
                return Progress::Finished;
            }
        }
    }

    /// Bus read of a DMAC register
    pub fn read32(&self, addr: u32) -> u32 {
        if let Some((idx, offset)) = locate_channel(addr) {
            return self.channels[idx].read(offset);
        }
        match addr {
            D_CTRL => self.ctrl,
            D_STAT => self.stat_flags | self.stat_masks << 16,
            D_PCR => self.pcr,
            D_SQWC => self.sqwc,
            D_RBSR => self.rbsr,
            D_RBOR => self.rbor,
            D_ENABLER => self.enable,
            _ => {
                tracing::warn!("DMAC read of unknown register 0x{:08x}", addr);
                0
            }
        }
    }

    /// Bus write of a DMAC register. Setting CHCR.STR on a busy channel
    /// is rejected rather than silently restarting the transfer.
    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), DmacError> {
        if let Some((idx, offset)) = locate_channel(addr) {
            if offset == 0 {
                if value & (1 << 8) != 0 && self.channels[idx].busy() {
                    return Err(DmacError::ChannelBusy { channel: idx });
                }
                self.channels[idx].chcr = value;
                if self.channels[idx].busy() {
                    tracing::debug!(
                        "{}: started, chcr=0x{:08x} madr=0x{:08x} qwc={} tadr=0x{:08x}",
                        CHANNEL_NAMES[idx],
                        value,
                        self.channels[idx].madr,
                        self.channels[idx].qwc,
                        self.channels[idx].tadr
                    );
                }
            } else {
                self.channels[idx].write(offset, value);
            }
            return Ok(());
        }
        match addr {
            D_CTRL => self.ctrl = value,
            D_STAT => {
                // Low half: clear-on-1 flags. High half: toggle masks.
                self.stat_flags &= !(value & 0xFFFF);
                self.stat_masks ^= value >> 16;
            }
            D_PCR => self.pcr = value,
            D_SQWC => self.sqwc = value,
            D_RBSR => self.rbsr = value,
            D_RBOR => self.rbor = value,
            D_ENABLEW => self.enable = value,
            _ => tracing::warn!(
                "DMAC write of unknown register 0x{:08x} = 0x{:08x}, ignored",
                addr,
                value
            ),
        }
        Ok(())
    }
}

impl Default for Dmac {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a bus address onto (channel index, register offset)
fn locate_channel(addr: u32) -> Option<(usize, u32)> {
    CHANNEL_BASES
        .iter()
        .position(|&base| addr >= base && addr < base + 0x90)
        .map(|idx| (idx, addr - CHANNEL_BASES[idx]))
}

/// Push the current block (MADR/QWC) into the sink
fn push_block(ch: &mut DmaChannel, mem: &EeMemory, sink: &mut dyn DmaSink) -> Progress {
    while ch.qwc > 0 {
        let qw = mem.read128(ch.madr);
        if sink.push_qword(qw) == SinkStatus::NotReady {
            return Progress::Suspended;
        }
        ch.madr = ch.madr.wrapping_add(QWORD_SIZE);
        ch.qwc -= 1;
    }
    Progress::Finished
}

/// Drive a memory-to-peripheral channel: a flat block in normal mode,
/// a tag walk in chain mode. All tag effects are applied before the
/// payload moves, so a mid-payload suspension resumes cleanly.
fn run_source_channel(
    ch: &mut DmaChannel,
    idx: usize,
    mem: &EeMemory,
    sink: &mut dyn DmaSink,
    trace_tags: bool,
) -> Progress {
    if ch.mode() == ChannelMode::Normal {
        return push_block(ch, mem, sink);
    }

    for _ in 0..CHAIN_TAG_LIMIT {
        // A TTE qword refused on the last call goes out before anything else
        if let Some(data) = ch.pending_tte {
            if sink.push_qword(data as u128) == SinkStatus::NotReady {
                return Progress::Suspended;
            }
            ch.pending_tte = None;
        }
        if ch.qwc > 0 && push_block(ch, mem, sink) == Progress::Suspended {
            return Progress::Suspended;
        }
        if ch.chain_end {
            ch.chain_end = false;
            return Progress::Finished;
        }

        let tag = DmaTag::parse(mem.read128(ch.tadr));
        ch.set_tag_view(tag.chcr_view);
        if trace_tags {
            tracing::debug!(
                "{}: tag {:?} qwc={} addr=0x{:08x} irq={}",
                CHANNEL_NAMES[idx],
                tag.id,
                tag.qwc,
                tag.addr,
                tag.irq
            );
        } else {
            tracing::trace!(
                "{}: tag {:?} qwc={} addr=0x{:08x} irq={}",
                CHANNEL_NAMES[idx],
                tag.id,
                tag.qwc,
                tag.addr,
                tag.irq
            );
        }

        ch.qwc = tag.qwc as u32;
        let after_tag = ch.tadr.wrapping_add(QWORD_SIZE);
        match tag.id {
            TagId::Refe => {
                ch.madr = tag.mem_addr();
                ch.chain_end = true;
            }
            TagId::Cnt => {
                ch.madr = after_tag;
                ch.tadr = after_tag.wrapping_add(ch.qwc * QWORD_SIZE);
            }
            TagId::Next => {
                ch.madr = after_tag;
                ch.tadr = tag.mem_addr();
            }
            TagId::Ref | TagId::Refs => {
                ch.madr = tag.mem_addr();
                ch.tadr = after_tag;
            }
            TagId::Call => {
                ch.madr = after_tag;
                let ret = after_tag.wrapping_add(ch.qwc * QWORD_SIZE);
                let asp = ch.asp();
                if asp >= 2 {
                    tracing::warn!("{}: CALL with a full address stack, ending chain", CHANNEL_NAMES[idx]);
                    ch.chain_end = true;
                } else {
                    ch.asr[asp as usize] = ret;
                    ch.set_asp(asp + 1);
                    ch.tadr = tag.mem_addr();
                }
            }
            TagId::Ret => {
                ch.madr = after_tag;
                let asp = ch.asp();
                if asp > 0 {
                    ch.set_asp(asp - 1);
                    ch.tadr = ch.asr[asp as usize - 1];
                } else {
                    ch.chain_end = true;
                }
            }
            TagId::End => {
                ch.madr = after_tag;
                ch.chain_end = true;
            }
        }
        if tag.irq && ch.tie() {
            ch.chain_end = true;
        }
        if ch.tte() {
            // The tag's upper 64 bits ride ahead of the payload, padded
            // to a quadword with no-op filler. A refusal suspends with
            // the qword held on the channel; the tag effects above are
            // already latched, so the resume re-sends it first.
            if sink.push_qword(tag.transfer_data as u128) == SinkStatus::NotReady {
                ch.pending_tte = Some(tag.transfer_data);
                return Progress::Suspended;
            }
        }
    }

    tracing::warn!(
        "{}: chain exceeded {} tags, treating as malformed and ending",
        CHANNEL_NAMES[idx],
        CHAIN_TAG_LIMIT
    );
    ch.chain_end = false;
    Progress::Finished
}

/// Scratchpad block mover. Interleave mode transfers TQWC quadwords,
/// then skips SQWC quadwords of RAM, until QWC is exhausted.
fn run_spr_channel(ch: &mut DmaChannel, to_spr: bool, sqwc: u32, mem: &mut EeMemory) -> Progress {
    if ch.mode() == ChannelMode::Chain {
        tracing::warn!("SPR chain mode not modeled, falling back to a flat copy");
    }
    let interleave = ch.mode() == ChannelMode::Interleave;
    let tqwc = sqwc & 0xFF;
    let skip = (sqwc >> 16) & 0xFF;
    // A zero block size would never finish; move everything flat
    let block = if interleave && tqwc > 0 { tqwc } else { u32::MAX };

    while ch.qwc > 0 {
        let run = block.min(ch.qwc);
        for _ in 0..run {
            let spr_addr = DMA_SPR_SELECT | (ch.sadr & 0x3FF0);
            if to_spr {
                let qw = mem.read128(ch.madr);
                mem.write128(spr_addr, qw);
            } else {
                let qw = mem.read128(spr_addr);
                mem.write128(ch.madr, qw);
            }
            ch.madr = ch.madr.wrapping_add(QWORD_SIZE);
            ch.sadr = (ch.sadr.wrapping_add(QWORD_SIZE)) & 0x3FFF;
            ch.qwc -= 1;
        }
        if interleave && ch.qwc > 0 {
            ch.madr = ch.madr.wrapping_add(skip * QWORD_SIZE);
        }
    }
    Progress::Finished
}
