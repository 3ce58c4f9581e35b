//! Guest memory map constants

/// Main RAM base address
pub const MAIN_RAM_BASE: u32 = 0x0000_0000;
/// Main RAM size (32 MB)
pub const MAIN_RAM_SIZE: u32 = 0x0200_0000;

/// Scratchpad base address (uncached direct window)
pub const SCRATCHPAD_BASE: u32 = 0x7000_0000;
/// Scratchpad size (16 KB)
pub const SCRATCHPAD_SIZE: u32 = 0x4000;

/// DMA addresses use bit 31 to select the scratchpad over main RAM
pub const DMA_SPR_SELECT: u32 = 0x8000_0000;

/// Bytes per quadword
pub const QWORD_SIZE: u32 = 16;
