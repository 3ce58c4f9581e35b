//! Integration layer for the oxidized-emotion vector subsystem
//!
//! Wires guest memory, both vector units, both VIFs, the GIF and the
//! DMA controller into one `EmotionSubsystem` with bus-level register
//! access, and owns the per-step plumbing between them.

pub mod subsystem;

pub use subsystem::EmotionSubsystem;
