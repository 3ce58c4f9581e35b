//! GIFtag parsing
//!
//! A GIFtag is 128 bits:
//! - bits 0..15   NLOOP
//! - bit  15      EOP (end of packet)
//! - bit  46      PRE (PRIM enable)
//! - bits 47..58  PRIM value
//! - bits 58..60  FLG (data format)
//! - bits 60..64  NREG (0 encodes 16)
//! - bits 64..128 sixteen 4-bit register descriptors

/// GIFtag data format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifFormat {
    /// One register write per quadword, descriptor-directed
    Packed,
    /// Two register writes per quadword, low half first
    Reglist,
    /// Raw image payload, no per-register routing
    Image,
}

/// A decoded GIFtag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifTag {
    /// Loop count over the register table
    pub nloop: u16,
    /// Last tag of the packet
    pub eop: bool,
    /// PRIM field is applied on tag fetch
    pub pre: bool,
    /// Inline PRIM value
    pub prim: u16,
    /// Payload format
    pub format: GifFormat,
    /// Number of register descriptors in use (1..=16)
    pub nregs: usize,
    /// Register descriptor table
    pub regs: [u8; 16],
}

/// A+D register descriptor: the GS register number rides in the payload
pub const REG_AD: u8 = 0x0E;

impl GifTag {
    /// Parse a GIFtag from a quadword. Parsing is total; reserved FLG
    /// value 3 is treated as Image, as the hardware does.
    pub fn parse(qw: u128) -> Self {
        let nloop = (qw & 0x7FFF) as u16;
        let eop = qw & (1 << 15) != 0;
        let pre = qw & (1 << 46) != 0;
        let prim = ((qw >> 47) & 0x7FF) as u16;
        let format = match (qw >> 58) & 3 {
            0 => GifFormat::Packed,
            1 => GifFormat::Reglist,
            _ => GifFormat::Image,
        };
        let nreg = ((qw >> 60) & 0xF) as usize;
        let nregs = if nreg == 0 { 16 } else { nreg };
        let mut regs = [0u8; 16];
        for (i, reg) in regs.iter_mut().enumerate() {
            *reg = ((qw >> (64 + i * 4)) & 0xF) as u8;
        }
        Self {
            nloop,
            eop,
            pre,
            prim,
            format,
            nregs,
            regs,
        }
    }

    /// Payload size in quadwords declared by this tag
    pub fn payload_qwords(&self) -> usize {
        let nloop = self.nloop as usize;
        match self.format {
            GifFormat::Packed => nloop * self.nregs,
            // Two register writes fit per quadword, odd counts round up
            GifFormat::Reglist => (nloop * self.nregs).div_ceil(2),
            GifFormat::Image => nloop,
        }
    }
}
