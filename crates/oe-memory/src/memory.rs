//! Guest memory implementation
//!
//! Single-threaded by design: the vector subsystem advances cooperatively
//! in one logical thread, so memory is a pair of plain boxed slices with
//! no interior locking.

use crate::constants::*;

/// Emotion Engine guest memory: main RAM plus scratchpad.
///
/// Unknown regions soft-fail: reads return zero, writes are logged and
/// dropped. Guest code probing unmapped space must never crash the host.
pub struct EeMemory {
    ram: Box<[u8]>,
    scratchpad: Box<[u8]>,
}

/// Resolved target of a guest physical address
enum Target {
    Ram(usize),
    Scratchpad(usize),
    Unmapped,
}

impl EeMemory {
    /// Create guest memory cleared to zero
    pub fn new() -> Self {
        Self {
            ram: vec![0u8; MAIN_RAM_SIZE as usize].into_boxed_slice(),
            scratchpad: vec![0u8; SCRATCHPAD_SIZE as usize].into_boxed_slice(),
        }
    }

    /// Reset all memory to its power-on (zeroed) state
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.scratchpad.fill(0);
    }

    fn resolve(&self, addr: u32) -> Target {
        // DMA-side addresses select the scratchpad with bit 31
        if addr & DMA_SPR_SELECT != 0 {
            return Target::Scratchpad((addr & (SCRATCHPAD_SIZE - 1)) as usize);
        }
        if (SCRATCHPAD_BASE..SCRATCHPAD_BASE + SCRATCHPAD_SIZE).contains(&addr) {
            return Target::Scratchpad((addr - SCRATCHPAD_BASE) as usize);
        }
        // RAM mirrors through the cached/uncached segments
        let phys = addr & 0x1FFF_FFFF;
        if phys < MAIN_RAM_SIZE {
            return Target::Ram(phys as usize);
        }
        Target::Unmapped
    }

    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        match self.resolve(addr) {
            Target::Ram(off) => {
                let end = (off + buf.len()).min(self.ram.len());
                let len = end - off;
                buf[..len].copy_from_slice(&self.ram[off..end]);
                buf[len..].fill(0);
            }
            Target::Scratchpad(off) => {
                let end = (off + buf.len()).min(self.scratchpad.len());
                let len = end - off;
                buf[..len].copy_from_slice(&self.scratchpad[off..end]);
                buf[len..].fill(0);
            }
            Target::Unmapped => {
                tracing::trace!("Read from unmapped address 0x{:08x}", addr);
                buf.fill(0);
            }
        }
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        match self.resolve(addr) {
            Target::Ram(off) => {
                let end = (off + data.len()).min(self.ram.len());
                self.ram[off..end].copy_from_slice(&data[..end - off]);
            }
            Target::Scratchpad(off) => {
                let end = (off + data.len()).min(self.scratchpad.len());
                self.scratchpad[off..end].copy_from_slice(&data[..end - off]);
            }
            Target::Unmapped => {
                tracing::warn!(
                    "Write of {} bytes to unmapped address 0x{:08x} ignored",
                    data.len(),
                    addr
                );
            }
        }
    }

    /// Read a byte
    pub fn read8(&self, addr: u32) -> u8 {
        let mut buf = [0u8; 1];
        self.read_bytes(addr, &mut buf);
        buf[0]
    }

    /// Read a 16-bit value (little-endian, EE byte order)
    pub fn read16(&self, addr: u32) -> u16 {
        let mut buf = [0u8; 2];
        self.read_bytes(addr, &mut buf);
        u16::from_le_bytes(buf)
    }

    /// Read a 32-bit value
    pub fn read32(&self, addr: u32) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    /// Read a 64-bit value
    pub fn read64(&self, addr: u32) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    /// Read a quadword (128 bits)
    pub fn read128(&self, addr: u32) -> u128 {
        let mut buf = [0u8; 16];
        self.read_bytes(addr & !0xF, &mut buf);
        u128::from_le_bytes(buf)
    }

    /// Write a byte
    pub fn write8(&mut self, addr: u32, value: u8) {
        self.write_bytes(addr, &[value]);
    }

    /// Write a 16-bit value
    pub fn write16(&mut self, addr: u32, value: u16) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Write a 32-bit value
    pub fn write32(&mut self, addr: u32, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Write a 64-bit value
    pub fn write64(&mut self, addr: u32, value: u64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Write a quadword (128 bits, address is forced to 16-byte alignment)
    pub fn write128(&mut self, addr: u32, value: u128) {
        self.write_bytes(addr & !0xF, &value.to_le_bytes());
    }
}

impl Default for EeMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_roundtrip() {
        let mut mem = EeMemory::new();
        mem.write32(0x1000, 0xDEADBEEF);
        assert_eq!(mem.read32(0x1000), 0xDEADBEEF);
        assert_eq!(mem.read8(0x1000), 0xEF); // little-endian
    }

    #[test]
    fn test_ram_mirror() {
        let mut mem = EeMemory::new();
        // Uncached segment mirrors the same RAM
        mem.write32(0x0000_2000, 0x12345678);
        assert_eq!(mem.read32(0x2000_2000), 0x12345678);
    }

    #[test]
    fn test_scratchpad_window() {
        let mut mem = EeMemory::new();
        mem.write128(SCRATCHPAD_BASE + 0x10, 0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10);
        assert_eq!(
            mem.read128(SCRATCHPAD_BASE + 0x10),
            0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10
        );
        // DMA select bit reaches the same bytes
        assert_eq!(
            mem.read128(DMA_SPR_SELECT | 0x10),
            0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10
        );
    }

    #[test]
    fn test_unmapped_soft_fail() {
        let mut mem = EeMemory::new();
        mem.write32(0x1F00_0000, 0xFFFF_FFFF);
        assert_eq!(mem.read32(0x1F00_0000), 0);
    }

    #[test]
    fn test_qword_alignment() {
        let mut mem = EeMemory::new();
        mem.write128(0x108, 0x42);
        // Address is forced down to the quadword boundary
        assert_eq!(mem.read128(0x100), 0x42);
    }

    #[test]
    fn test_reset_clears() {
        let mut mem = EeMemory::new();
        mem.write64(0x500, u64::MAX);
        mem.reset();
        assert_eq!(mem.read64(0x500), 0);
    }
}
