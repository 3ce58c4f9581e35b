//! Per-channel register state

/// The ten EE-side channels, in priority (and register-bank) order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Vif0 = 0,
    Vif1 = 1,
    Gif = 2,
    IpuFrom = 3,
    IpuTo = 4,
    Sif0 = 5,
    Sif1 = 6,
    Sif2 = 7,
    SprFrom = 8,
    SprTo = 9,
}

pub const CHANNEL_COUNT: usize = 10;

/// MMIO base address of each channel's register bank
pub const CHANNEL_BASES: [u32; CHANNEL_COUNT] = [
    0x1000_8000, // VIF0
    0x1000_9000, // VIF1
    0x1000_A000, // GIF
    0x1000_B000, // IPU_FROM
    0x1000_B400, // IPU_TO
    0x1000_C000, // SIF0
    0x1000_C400, // SIF1
    0x1000_C800, // SIF2
    0x1000_D000, // SPR_FROM
    0x1000_D400, // SPR_TO
];

pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = [
    "VIF0", "VIF1", "GIF", "IPU_FROM", "IPU_TO", "SIF0", "SIF1", "SIF2", "SPR_FROM", "SPR_TO",
];

/// CHCR bit positions
const CHCR_DIR: u32 = 1 << 0;
const CHCR_TTE: u32 = 1 << 6;
const CHCR_TIE: u32 = 1 << 7;
const CHCR_STR: u32 = 1 << 8;

/// Transfer mode from CHCR.MOD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Normal,
    Chain,
    Interleave,
}

/// One channel's register bank
#[derive(Debug, Clone, Copy, Default)]
pub struct DmaChannel {
    pub chcr: u32,
    /// Transfer address (bit 31 selects the scratchpad)
    pub madr: u32,
    /// Quadwords remaining in the current block
    pub qwc: u32,
    /// Next tag address in chain mode
    pub tadr: u32,
    /// Address stack for CALL/RET tags
    pub asr: [u32; 2],
    /// Scratchpad-side address for the SPR channels
    pub sadr: u32,
    /// The payload in flight belongs to the chain's final tag
    pub chain_end: bool,
    /// TTE qword the destination refused; re-sent before the payload
    pub pending_tte: Option<u64>,
}

impl DmaChannel {
    /// Channel is mid-transfer
    pub fn busy(&self) -> bool {
        self.chcr & CHCR_STR != 0
    }

    pub fn set_busy(&mut self, busy: bool) {
        if busy {
            self.chcr |= CHCR_STR;
        } else {
            self.chcr &= !CHCR_STR;
        }
    }

    /// Direction: true = from memory (source), false = to memory
    pub fn from_memory(&self) -> bool {
        self.chcr & CHCR_DIR != 0
    }

    pub fn mode(&self) -> ChannelMode {
        match (self.chcr >> 2) & 3 {
            0 => ChannelMode::Normal,
            1 => ChannelMode::Chain,
            _ => ChannelMode::Interleave,
        }
    }

    /// Address-stack pointer (0..=2)
    pub fn asp(&self) -> u32 {
        (self.chcr >> 4) & 3
    }

    pub fn set_asp(&mut self, asp: u32) {
        self.chcr = (self.chcr & !(3 << 4)) | (asp & 3) << 4;
    }

    /// Tag transfer enable: forward tag payload bits to the destination
    pub fn tte(&self) -> bool {
        self.chcr & CHCR_TTE != 0
    }

    /// Tag interrupt enable: an IRQ-flagged tag ends the chain
    pub fn tie(&self) -> bool {
        self.chcr & CHCR_TIE != 0
    }

    /// Latch the upper-half tag view into CHCR.TAG
    pub fn set_tag_view(&mut self, view: u16) {
        self.chcr = (self.chcr & 0xFFFF) | (view as u32) << 16;
    }

    /// Register read by offset within the channel's bank
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            0x00 => self.chcr,
            0x10 => self.madr,
            0x20 => self.qwc,
            0x30 => self.tadr,
            0x40 => self.asr[0],
            0x50 => self.asr[1],
            0x80 => self.sadr,
            _ => 0,
        }
    }

    /// Register write by offset. CHCR is handled by the controller so
    /// the busy-start check can reject it; everything else lands here.
    pub fn write(&mut self, offset: u32, value: u32) {
        match offset {
            0x10 => self.madr = value & 0xFFFF_FFF0,
            0x20 => self.qwc = value & 0xFFFF,
            0x30 => self.tadr = value & 0xFFFF_FFF0,
            0x40 => self.asr[0] = value & 0x7FFF_FFF0,
            0x50 => self.asr[1] = value & 0x7FFF_FFF0,
            0x80 => self.sadr = value & 0x3FF0,
            _ => tracing::warn!("DMA channel write to unknown offset 0x{:02x}", offset),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
