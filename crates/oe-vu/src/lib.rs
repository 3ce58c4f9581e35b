//! VU0/VU1 vector unit emulation for oxidized-emotion
//!
//! The Emotion Engine carries two VLIW vector units. Each 64-bit
//! instruction word bundles an upper (FMAC) half and a lower
//! (integer/branch/transcendental) half that issue together, which is
//! where all the interesting hazards live: same-bundle register
//! conflicts, multi-cycle Q/P results with delayed visibility, and
//! MAC/clip flags that lower ops observe several bundles late.
//!
//! VU0 has 4 KB of micro and data memory and a window onto VU1's
//! registers; VU1 has 16 KB of each and feeds the GIF via `xgkick`.

pub mod decoder;
pub mod executor;
pub mod instructions;
pub mod pipeline;
pub mod registers;
pub mod unit;

pub use decoder::{decode, FmacKind, FmacSrc, LowerOp, LowerSlot, UpperOp, VuBundle};
pub use executor::{KickChannel, StepResult, VuInterpreter};
pub use pipeline::{DelayedScalar, IntWriteShadow, PipeShadow};
pub use registers::VuRegisters;
pub use unit::{VectorUnit, VuId};
