//! Vector unit instances
//!
//! VU0 carries 4 KB of micro and data memory, VU1 16 KB of each. Data
//! addresses are quadword-granular and wrap modulo capacity; the program
//! counter wraps modulo instruction-word capacity. VU0 additionally maps
//! VU1's register file into the top of its data address space, modeled
//! here as a non-owning peer reference supplied per access.

use crate::pipeline::{IntWriteShadow, PipeShadow};
use crate::registers::VuRegisters;

/// Which vector unit an instance is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuId {
    Vu0,
    Vu1,
}

/// VU0 memory sizes in bytes
pub const VU0_MICRO_SIZE: usize = 4 * 1024;
pub const VU0_DATA_SIZE: usize = 4 * 1024;
/// VU1 memory sizes in bytes
pub const VU1_MICRO_SIZE: usize = 16 * 1024;
pub const VU1_DATA_SIZE: usize = 16 * 1024;

/// First quadword index of VU0's window onto VU1 registers
const PEER_WINDOW_BASE: u16 = 0x400;
/// Quadword indices within the window
const PEER_VI_BASE: u16 = 0x20;
const PEER_SPECIAL_BASE: u16 = 0x30;

/// Transient per-program pipeline state
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineState {
    /// Destination/flag histories
    pub shadow: PipeShadow,
    /// Integer write shadow for branch reads
    pub int_shadow: IntWriteShadow,
    /// Branch target latched behind the delay slot
    pub branch: Option<u16>,
    /// E bit seen on the previous bundle
    pub end_pending: bool,
}

impl PipelineState {
    /// Clear everything (microprogram start or system reset)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One vector unit: register file, memories and pipeline state
pub struct VectorUnit {
    pub id: VuId,
    pub regs: VuRegisters,
    pub pipe: PipelineState,
    /// A microprogram is in flight
    pub running: bool,
    micro: Box<[u8]>,
    data: Box<[u8]>,
}

impl VectorUnit {
    /// Create a unit in power-on state
    pub fn new(id: VuId) -> Self {
        let (micro_size, data_size) = match id {
            VuId::Vu0 => (VU0_MICRO_SIZE, VU0_DATA_SIZE),
            VuId::Vu1 => (VU1_MICRO_SIZE, VU1_DATA_SIZE),
        };
        Self {
            id,
            regs: VuRegisters::new(),
            pipe: PipelineState::default(),
            running: false,
            micro: vec![0u8; micro_size].into_boxed_slice(),
            data: vec![0u8; data_size].into_boxed_slice(),
        }
    }

    /// Reset registers, pipeline state and both memories
    pub fn reset(&mut self) {
        self.regs.reset();
        self.pipe.reset();
        self.running = false;
        self.micro.fill(0);
        self.data.fill(0);
    }

    /// Unit number for diagnostics (0 or 1)
    pub fn number(&self) -> u8 {
        match self.id {
            VuId::Vu0 => 0,
            VuId::Vu1 => 1,
        }
    }

    /// Capacity of micro memory in 64-bit instruction words
    pub fn instr_count(&self) -> u16 {
        (self.micro.len() / 8) as u16
    }

    /// Capacity of data memory in quadwords
    pub fn data_qwords(&self) -> u16 {
        (self.data.len() / 16) as u16
    }

    /// Fetch the instruction word at `pc` (wraps modulo capacity)
    pub fn fetch(&self, pc: u16) -> u64 {
        let idx = (pc % self.instr_count()) as usize * 8;
        u64::from_le_bytes(self.micro[idx..idx + 8].try_into().expect("8-byte slice"))
    }

    /// Write one 32-bit word of micro memory (wraps modulo capacity)
    pub fn write_micro32(&mut self, byte_addr: u32, value: u32) {
        let idx = (byte_addr as usize) & (self.micro.len() - 1) & !3;
        self.micro[idx..idx + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read one 32-bit word of micro memory
    pub fn read_micro32(&self, byte_addr: u32) -> u32 {
        let idx = (byte_addr as usize) & (self.micro.len() - 1) & !3;
        u32::from_le_bytes(self.micro[idx..idx + 4].try_into().expect("4-byte slice"))
    }

    /// True when the quadword address falls in VU0's peer window
    fn is_peer_window(&self, addr_qw: u16) -> bool {
        self.id == VuId::Vu0 && addr_qw & PEER_WINDOW_BASE != 0
    }

    /// Read a data-memory quadword as four float lanes
    pub fn data_read(&self, addr_qw: u16, peer: Option<&VectorUnit>) -> [f32; 4] {
        if self.is_peer_window(addr_qw) {
            if let Some(peer) = peer {
                return peer_window_read(peer, addr_qw);
            }
            tracing::warn!("VU0 peer-window read at 0x{:04x} with no VU1 attached", addr_qw);
            return [0.0; 4];
        }
        let idx = (addr_qw % self.data_qwords()) as usize * 16;
        let mut lanes = [0.0f32; 4];
        for (lane, value) in lanes.iter_mut().enumerate() {
            let off = idx + lane * 4;
            *value = f32::from_bits(u32::from_le_bytes(
                self.data[off..off + 4].try_into().expect("4-byte slice"),
            ));
        }
        lanes
    }

    /// Write selected lanes of a data-memory quadword
    pub fn data_write(
        &mut self,
        addr_qw: u16,
        value: [f32; 4],
        mask: u8,
        peer: Option<&mut VectorUnit>,
    ) {
        if self.is_peer_window(addr_qw) {
            if let Some(peer) = peer {
                peer_window_write(peer, addr_qw, value, mask);
            } else {
                tracing::warn!("VU0 peer-window write at 0x{:04x} with no VU1 attached", addr_qw);
            }
            return;
        }
        let idx = (addr_qw % self.data_qwords()) as usize * 16;
        for lane in 0..4 {
            if crate::registers::mask_has(mask, lane) {
                let off = idx + lane * 4;
                self.data[off..off + 4].copy_from_slice(&value[lane].to_bits().to_le_bytes());
            }
        }
    }

    /// Read one 32-bit lane of a data-memory quadword (integer loads)
    pub fn data_read_lane(&self, addr_qw: u16, lane: usize, peer: Option<&VectorUnit>) -> u32 {
        self.data_read(addr_qw, peer)[lane & 3].to_bits()
    }

    /// Read a raw data-memory quadword (xgkick streaming)
    pub fn data_read_qword(&self, addr_qw: u16) -> u128 {
        let idx = (addr_qw % self.data_qwords()) as usize * 16;
        u128::from_le_bytes(self.data[idx..idx + 16].try_into().expect("16-byte slice"))
    }

    /// Write a raw data-memory quadword (DMA/VIF uploads)
    pub fn data_write_qword(&mut self, addr_qw: u16, value: u128) {
        let idx = (addr_qw % self.data_qwords()) as usize * 16;
        self.data[idx..idx + 16].copy_from_slice(&value.to_le_bytes());
    }
}

/// VU0-side read of VU1 state through the data-memory window
fn peer_window_read(peer: &VectorUnit, addr_qw: u16) -> [f32; 4] {
    let slot = addr_qw & 0x3F;
    if slot < PEER_VI_BASE {
        return peer.regs.vf(slot as u8);
    }
    let scalar = if slot < PEER_SPECIAL_BASE {
        peer.regs.vi((slot - PEER_VI_BASE) as u8) as u32
    } else {
        match slot - PEER_SPECIAL_BASE {
            0 => peer.regs.status_flags as u32,
            1 => peer.regs.mac_flags as u32,
            2 => peer.regs.clip_flags,
            4 => peer.regs.r,
            5 => peer.regs.i.to_bits(),
            6 => peer.regs.q.read().to_bits(),
            7 => peer.regs.p.read().to_bits(),
            10 => peer.regs.tpc as u32,
            _ => 0,
        }
    };
    [f32::from_bits(scalar), 0.0, 0.0, 0.0]
}

/// VU0-side write of VU1 state through the data-memory window
fn peer_window_write(peer: &mut VectorUnit, addr_qw: u16, value: [f32; 4], mask: u8) {
    let slot = addr_qw & 0x3F;
    if slot < PEER_VI_BASE {
        peer.regs.set_vf(slot as u8, value, mask);
        return;
    }
    let bits = value[0].to_bits();
    if slot < PEER_SPECIAL_BASE {
        peer.regs.set_vi((slot - PEER_VI_BASE) as u8, bits as u16);
        return;
    }
    match slot - PEER_SPECIAL_BASE {
        0 => peer.regs.status_flags = bits as u16,
        1 => peer.regs.mac_flags = bits as u16,
        2 => peer.regs.clip_flags = bits & 0xFF_FFFF,
        4 => peer.regs.r = bits,
        5 => peer.regs.i = f32::from_bits(bits),
        _ => tracing::warn!("VU0 write to read-only VU1 window slot 0x{:02x}", slot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_sizes() {
        let vu0 = VectorUnit::new(VuId::Vu0);
        let vu1 = VectorUnit::new(VuId::Vu1);
        assert_eq!(vu0.instr_count(), 512);
        assert_eq!(vu0.data_qwords(), 256);
        assert_eq!(vu1.instr_count(), 2048);
        assert_eq!(vu1.data_qwords(), 1024);
    }

    #[test]
    fn test_data_wraps() {
        let mut vu0 = VectorUnit::new(VuId::Vu0);
        vu0.data_write(0, [1.0, 2.0, 3.0, 4.0], 0xF, None);
        // 256 qwords: address 256 wraps to 0
        assert_eq!(vu0.data_read(256, None), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fetch_wraps() {
        let mut vu0 = VectorUnit::new(VuId::Vu0);
        vu0.write_micro32(0, 0xAABBCCDD);
        assert_eq!(vu0.fetch(512) & 0xFFFF_FFFF, 0xAABB_CCDD);
    }

    #[test]
    fn test_peer_window_vf() {
        let mut vu0 = VectorUnit::new(VuId::Vu0);
        let mut vu1 = VectorUnit::new(VuId::Vu1);
        vu1.regs.set_vf(5, [1.0, 2.0, 3.0, 4.0], 0xF);
        assert_eq!(vu0.data_read(0x405, Some(&vu1)), [1.0, 2.0, 3.0, 4.0]);

        vu0.data_write(0x407, [9.0, 8.0, 7.0, 6.0], 0xF, Some(&mut vu1));
        assert_eq!(vu1.regs.vf(7), [9.0, 8.0, 7.0, 6.0]);
    }

    #[test]
    fn test_peer_window_vi() {
        let mut vu0 = VectorUnit::new(VuId::Vu0);
        let mut vu1 = VectorUnit::new(VuId::Vu1);
        vu1.regs.set_vi(3, 0x1234);
        let read = vu0.data_read(0x423, Some(&vu1));
        assert_eq!(read[0].to_bits(), 0x1234);
    }

    #[test]
    fn test_peer_window_missing_peer_soft_fails() {
        let vu0 = VectorUnit::new(VuId::Vu0);
        assert_eq!(vu0.data_read(0x405, None), [0.0; 4]);
    }

    #[test]
    fn test_vu1_has_no_peer_window() {
        let mut vu1 = VectorUnit::new(VuId::Vu1);
        // 0x400 is ordinary data memory on VU1
        vu1.data_write(0x400, [5.0, 0.0, 0.0, 0.0], 0x8, None);
        assert_eq!(vu1.data_read(0x400, None)[0], 5.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut vu1 = VectorUnit::new(VuId::Vu1);
        vu1.regs.set_vf(1, [1.0; 4], 0xF);
        vu1.data_write_qword(0, u128::MAX);
        vu1.reset();
        assert_eq!(vu1.regs.vf(1), [0.0; 4]);
        assert_eq!(vu1.data_read_qword(0), 0);
    }
}
