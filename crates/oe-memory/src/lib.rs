//! Guest memory for the oxidized-emotion PS2 emulator
//!
//! The Emotion Engine sees 32 MB of main RAM plus a 16 KB on-die
//! scratchpad. DMA transfers move whole quadwords (128 bits); the CPU
//! side uses the narrower accessors.

pub mod constants;
pub mod memory;

pub use constants::*;
pub use memory::EeMemory;
