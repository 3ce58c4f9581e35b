//! VIF0/VIF1 command processor emulation for oxidized-emotion
//!
//! The VIFs sit between a DMA channel and their vector unit. They decode
//! a 32-bit command language: configuration writes, microcode uploads
//! into VU micro memory, microprogram triggers, and (VIF1 only) a raw
//! pass-through path into the GIF. Payload lengths are fixed at command
//! decode; the unit returns to idle exactly when the count reaches zero.

pub mod command;
pub mod unit;

pub use command::{decode_command, payload_words, VifCommand};
pub use unit::{VifContext, VifId, VifUnit};
