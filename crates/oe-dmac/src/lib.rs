//! EE DMA controller emulation for oxidized-emotion
//!
//! Ten channels move quadwords between main RAM, the scratchpad, the
//! VIFs, the GIF and the SIF FIFOs. Channels run in three modes: normal
//! (a flat block), chain (a tag-directed walk of linked descriptors in
//! guest memory) and interleave (block/skip, scratchpad channels only).
//! Everything is cooperative and single-threaded: a channel runs to
//! completion or to a natural suspension point (destination not ready,
//! rendezvous FIFO empty) and control returns to the caller.

pub mod channel;
pub mod dmac;
pub mod tag;

pub use channel::{ChannelId, DmaChannel};
pub use dmac::{ChannelSinks, Dmac};
pub use tag::{DmaTag, TagId};

/// Destination readiness for one pushed quadword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Accepted,
    /// Destination cannot take data now; the channel suspends with no
    /// progress and stays busy
    NotReady,
}

/// Where a source-mode channel delivers its quadwords
pub trait DmaSink {
    fn push_qword(&mut self, qw: u128) -> SinkStatus;
}
