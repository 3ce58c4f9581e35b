//! Core types for the oxidized-emotion PS2 emulator
//!
//! This crate provides the foundational error taxonomy, configuration
//! and logging infrastructure shared by the vector subsystem crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{DmacError, EmotionError, MemoryError, Result, VifError, VuError};
