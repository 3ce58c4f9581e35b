//! Error types for the oxidized-emotion emulator

use thiserror::Error;

/// Main error type for the vector subsystem
#[derive(Error, Debug)]
pub enum EmotionError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("VU error: {0}")]
    Vu(#[from] VuError),

    #[error("DMAC error: {0}")]
    Dmac(#[from] DmacError),

    #[error("VIF error: {0}")]
    Vif(#[from] VifError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Guest memory errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Unmapped address: 0x{0:08x}")]
    Unmapped(u32),

    #[error("Alignment error: address 0x{addr:08x} not aligned to {align}")]
    AlignmentError { addr: u32, align: u32 },
}

/// Vector unit errors
#[derive(Error, Debug)]
pub enum VuError {
    #[error("VU{unit} microprogram ran past {executed} bundles without an E bit")]
    RunawayProgram { unit: u8, executed: usize },
}

/// DMA controller errors
#[derive(Error, Debug)]
pub enum DmacError {
    #[error("Channel {channel} started while already busy")]
    ChannelBusy { channel: usize },

    #[error("Channel {channel} ({name}) is not implemented")]
    UnimplementedChannel { channel: usize, name: &'static str },
}

/// VIF command processor errors
#[derive(Error, Debug)]
pub enum VifError {
    #[error("VIF{unit} command 0x{cmd:02x} is not implemented")]
    NotImplemented { unit: u8, cmd: u8 },

    #[error("VIF{unit} received command 0x{cmd:02x} not supported on this unit")]
    UnsupportedOnUnit { unit: u8, cmd: u8 },
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmotionError>;
