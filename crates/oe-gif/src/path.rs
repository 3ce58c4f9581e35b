//! GIF path state machine
//!
//! Two states: awaiting a tag, or mid-stream consuming the payload the
//! current tag declared. The whole tag state is replaced on every tag
//! fetch; nothing persists across tags except the end-of-packet latch.

use crate::sink::GsRegisterSink;
use crate::tag::{GifFormat, GifTag, REG_AD};

/// Outcome of feeding one quadword to the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Quadword consumed, path wants a tag next
    AwaitingTag,
    /// Quadword consumed, more payload expected
    Streaming,
    /// Quadword consumed and the packet ended (EOP tag exhausted)
    EndOfPacket,
}

/// State for the tag currently being streamed
#[derive(Debug, Clone, Copy)]
struct ActiveTag {
    tag: GifTag,
    /// Register-write slots left (packed/reglist) or quadwords (image)
    remaining: usize,
    /// Cursor into the register table
    cursor: usize,
}

/// The GIF path processor
#[derive(Debug)]
pub struct GifPath {
    active: Option<ActiveTag>,
    /// Latched EOP from the current tag
    eop_pending: bool,
}

impl GifPath {
    /// Create an idle path
    pub fn new() -> Self {
        Self {
            active: None,
            eop_pending: false,
        }
    }

    /// Reset to power-on state, abandoning any mid-stream transfer
    pub fn reset(&mut self) {
        self.active = None;
        self.eop_pending = false;
    }

    /// True when the next quadword will be consumed as a tag
    pub fn awaiting_tag(&self) -> bool {
        self.active.is_none()
    }

    /// GIF_CTRL write: bit 0 resets the path
    pub fn ctrl_write(&mut self, value: u32) {
        if value & 1 != 0 {
            tracing::debug!("GIF reset via GIF_CTRL");
            self.reset();
        }
    }

    /// GIF_STAT read: reports output-path activity
    pub fn stat(&self) -> u32 {
        // OPH: output path is mid-transfer
        if self.active.is_some() { 1 << 9 } else { 0 }
    }

    /// Feed one quadword into the path
    pub fn process_qword(&mut self, qw: u128, sink: &mut dyn GsRegisterSink) -> PathStatus {
        match self.active {
            None => self.consume_tag(qw, sink),
            Some(_) => self.consume_payload(qw, sink),
        }
    }

    fn consume_tag(&mut self, qw: u128, sink: &mut dyn GsRegisterSink) -> PathStatus {
        let tag = GifTag::parse(qw);
        tracing::trace!(
            "GIFtag nloop={} eop={} fmt={:?} nregs={}",
            tag.nloop,
            tag.eop,
            tag.format,
            tag.nregs
        );
        if tag.pre && tag.format != GifFormat::Image {
            sink.prim(tag.prim);
        }
        self.eop_pending = tag.eop;
        let remaining = match tag.format {
            GifFormat::Packed | GifFormat::Reglist => tag.nloop as usize * tag.nregs,
            GifFormat::Image => tag.nloop as usize,
        };
        if remaining == 0 {
            // NLOOP=0 carries no payload; an EOP tag still ends the packet
            return if std::mem::take(&mut self.eop_pending) {
                PathStatus::EndOfPacket
            } else {
                PathStatus::AwaitingTag
            };
        }
        self.active = Some(ActiveTag {
            tag,
            remaining,
            cursor: 0,
        });
        PathStatus::Streaming
    }

    fn consume_payload(&mut self, qw: u128, sink: &mut dyn GsRegisterSink) -> PathStatus {
        let active = self.active.as_mut().expect("mid-stream without a tag");
        match active.tag.format {
            GifFormat::Packed => {
                let reg = active.tag.regs[active.cursor % active.tag.nregs];
                if reg == REG_AD {
                    // Register number rides in bits 64..72 of the payload
                    let dest = ((qw >> 64) & 0xFF) as u8;
                    sink.write_register(dest, qw & 0xFFFF_FFFF_FFFF_FFFF);
                } else {
                    sink.write_register(reg, qw);
                }
                active.cursor += 1;
                active.remaining -= 1;
            }
            GifFormat::Reglist => {
                // Two 64-bit register writes per quadword, low half first;
                // an odd total drops the final high half
                for half in 0..2 {
                    if active.remaining == 0 {
                        break;
                    }
                    let reg = active.tag.regs[active.cursor % active.tag.nregs];
                    let data = (qw >> (64 * half)) & 0xFFFF_FFFF_FFFF_FFFF;
                    sink.write_register(reg, data);
                    active.cursor += 1;
                    active.remaining -= 1;
                }
            }
            GifFormat::Image => {
                sink.write_image(qw);
                active.remaining -= 1;
            }
        }

        if active.remaining == 0 {
            self.active = None;
            if std::mem::take(&mut self.eop_pending) {
                return PathStatus::EndOfPacket;
            }
            return PathStatus::AwaitingTag;
        }
        PathStatus::Streaming
    }
}

impl Default for GifPath {
    fn default() -> Self {
        Self::new()
    }
}
