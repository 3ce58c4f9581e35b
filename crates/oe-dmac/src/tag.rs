//! DMA tag decoding
//!
//! A source-chain tag occupies the low 64 bits of a 128-bit fetch:
//! - bits 0..16   QWC (payload quadwords)
//! - bits 26..28  PCE (priority control, ignored here)
//! - bits 28..31  ID (tag class)
//! - bit  31      IRQ request
//! - bits 32..63  ADDR (quadword-aligned)
//! - bit  63      SPR (address selects the scratchpad)
//!
//! The upper 64 bits are payload for the destination when CHCR.TTE is
//! set (VIFcode, typically).

use oe_memory::DMA_SPR_SELECT;

/// Tag class. Determines where the payload lives and how TADR advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagId {
    /// Transfer ADDR/QWC, then end
    Refe,
    /// Payload follows the tag; next tag follows the payload
    Cnt,
    /// Payload follows the tag; next tag at ADDR
    Next,
    /// Transfer ADDR/QWC; next tag follows this one
    Ref,
    /// REF with stall control (stall handling not modeled)
    Refs,
    /// CNT, pushing the follow-on address onto the address stack
    Call,
    /// CNT, popping the next tag address from the address stack
    Ret,
    /// Payload follows the tag, then end
    End,
}

impl TagId {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Refe,
            1 => Self::Cnt,
            2 => Self::Next,
            3 => Self::Ref,
            4 => Self::Refs,
            5 => Self::Call,
            6 => Self::Ret,
            _ => Self::End,
        }
    }
}

/// A decoded DMA tag. Transient: derived per fetch, never stored.
#[derive(Debug, Clone, Copy)]
pub struct DmaTag {
    pub qwc: u16,
    pub id: TagId,
    pub irq: bool,
    /// Raw 31-bit address field, quadword aligned
    pub addr: u32,
    /// Address targets the scratchpad
    pub spr: bool,
    /// Upper 64 bits of the fetch, forwarded under CHCR.TTE
    pub transfer_data: u64,
    /// Tag bits 16..32, mirrored into CHCR.TAG
    pub chcr_view: u16,
}

impl DmaTag {
    /// Decode a tag from a 128-bit fetch. Total: every bit pattern is a
    /// valid tag.
    pub fn parse(qw: u128) -> Self {
        let low = qw as u64;
        Self {
            qwc: (low & 0xFFFF) as u16,
            id: TagId::from_bits((low >> 28) as u32),
            irq: low & (1 << 31) != 0,
            addr: ((low >> 32) as u32) & 0x7FFF_FFF0,
            spr: low & (1 << 63) != 0,
            transfer_data: (qw >> 64) as u64,
            chcr_view: (low >> 16) as u16,
        }
    }

    /// ADDR as a bus address, with the scratchpad select folded in
    pub fn mem_addr(&self) -> u32 {
        if self.spr {
            self.addr | DMA_SPR_SELECT
        } else {
            self.addr
        }
    }
}
