//! VU debugger for register inspection and microcode tracing

use oe_vu::VectorUnit;

use crate::disassembler::{DisassembledInstruction, VuDisassembler};

/// VU debug state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuDebugState {
    /// Running normally
    Running,
    /// Paused (by user or breakpoint)
    Paused,
    /// Single stepping
    Stepping,
}

/// One traced instruction
#[derive(Debug, Clone)]
pub struct VuTraceEntry {
    /// Address in instruction words
    pub address: u16,
    /// Raw 64-bit instruction word
    pub raw: u64,
    /// Disassembled text
    pub disasm: String,
}

/// Debugger over the two vector units
pub struct VuDebugger {
    /// Debug state per unit
    pub states: [VuDebugState; 2],
    /// Tracing enabled per unit
    pub tracing_enabled: [bool; 2],
    trace_buffers: [Vec<VuTraceEntry>; 2],
    max_trace_entries: usize,
}

impl Default for VuDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl VuDebugger {
    pub fn new() -> Self {
        Self {
            states: [VuDebugState::Running; 2],
            tracing_enabled: [false; 2],
            trace_buffers: [Vec::new(), Vec::new()],
            max_trace_entries: 10000,
        }
    }

    /// Pause a unit
    pub fn pause(&mut self, unit: usize) {
        if unit < 2 {
            self.states[unit] = VuDebugState::Paused;
            tracing::info!("VU{} debugger: paused", unit);
        }
    }

    /// Resume a unit
    pub fn resume(&mut self, unit: usize) {
        if unit < 2 {
            self.states[unit] = VuDebugState::Running;
            tracing::info!("VU{} debugger: resumed", unit);
        }
    }

    /// Single step a unit
    pub fn step(&mut self, unit: usize) {
        if unit < 2 {
            self.states[unit] = VuDebugState::Stepping;
            tracing::debug!("VU{} debugger: stepping", unit);
        }
    }

    /// Check if execution should stop before the next bundle
    pub fn check_before_execute(&mut self, unit: usize) -> bool {
        if unit >= 2 {
            return false;
        }
        match self.states[unit] {
            VuDebugState::Running => false,
            VuDebugState::Paused => true,
            VuDebugState::Stepping => {
                self.states[unit] = VuDebugState::Paused;
                true
            }
        }
    }

    /// Record a bundle execution for tracing
    pub fn trace_instruction(&mut self, unit: usize, address: u16, raw: u64) {
        if unit >= 2 || !self.tracing_enabled[unit] {
            return;
        }
        let d = VuDisassembler::disassemble(address, raw);
        self.trace_buffers[unit].push(VuTraceEntry {
            address,
            raw,
            disasm: format!("{} | {}", d.upper, d.lower),
        });
        if self.trace_buffers[unit].len() > self.max_trace_entries {
            self.trace_buffers[unit].remove(0);
        }
    }

    pub fn enable_tracing(&mut self, unit: usize) {
        if unit < 2 {
            self.tracing_enabled[unit] = true;
            tracing::info!("VU{} microcode tracing enabled", unit);
        }
    }

    pub fn disable_tracing(&mut self, unit: usize) {
        if unit < 2 {
            self.tracing_enabled[unit] = false;
            tracing::info!("VU{} microcode tracing disabled", unit);
        }
    }

    /// Get the most recent trace entries for a unit
    pub fn get_trace(&self, unit: usize, count: usize) -> &[VuTraceEntry] {
        if unit >= 2 {
            return &[];
        }
        let buffer = &self.trace_buffers[unit];
        let start = buffer.len().saturating_sub(count);
        &buffer[start..]
    }

    pub fn clear_trace(&mut self, unit: usize) {
        if unit < 2 {
            self.trace_buffers[unit].clear();
        }
    }

    /// Snapshot the unit's register file for display
    pub fn get_register_snapshot(&self, unit: &VectorUnit) -> VuRegisterSnapshot {
        let mut vf = [[0.0f32; 4]; 32];
        for (reg, slot) in vf.iter_mut().enumerate() {
            *slot = unit.regs.vf(reg as u8);
        }
        let mut vi = [0u16; 16];
        for (reg, slot) in vi.iter_mut().enumerate() {
            *slot = unit.regs.vi(reg as u8);
        }
        VuRegisterSnapshot {
            unit: unit.number(),
            vf,
            vi,
            acc: unit.regs.acc,
            q: unit.regs.q.read(),
            p: unit.regs.p.read(),
            r: unit.regs.r,
            i: unit.regs.i,
            mac_flags: unit.regs.mac_flags,
            status_flags: unit.regs.status_flags,
            clip_flags: unit.regs.clip_flags,
            pc: unit.regs.pc,
            tpc: unit.regs.tpc,
            itop: unit.regs.itop,
            top: unit.regs.top,
        }
    }

    /// Disassemble microcode starting at an instruction-word address
    pub fn disassemble_at(
        &self,
        unit: &VectorUnit,
        address: u16,
        count: usize,
    ) -> Vec<DisassembledInstruction> {
        let mut result = Vec::with_capacity(count);
        for i in 0..count {
            let addr = address.wrapping_add(i as u16) % unit.instr_count();
            result.push(VuDisassembler::disassemble(addr, unit.fetch(addr)));
        }
        result
    }
}

/// Snapshot of one unit's registers for display
#[derive(Debug, Clone)]
pub struct VuRegisterSnapshot {
    pub unit: u8,
    pub vf: [[f32; 4]; 32],
    pub vi: [u16; 16],
    pub acc: [f32; 4],
    pub q: f32,
    pub p: f32,
    pub r: u32,
    pub i: f32,
    pub mac_flags: u16,
    pub status_flags: u16,
    pub clip_flags: u32,
    pub pc: u16,
    pub tpc: u16,
    pub itop: u16,
    pub top: u16,
}

impl VuRegisterSnapshot {
    /// Format a float register as four hex lanes
    pub fn vf_hex(&self, index: usize) -> String {
        let r = self.vf[index & 0x1F];
        format!(
            "{:08X} {:08X} {:08X} {:08X}",
            r[0].to_bits(),
            r[1].to_bits(),
            r[2].to_bits(),
            r[3].to_bits()
        )
    }

    /// Format an integer register as hex
    pub fn vi_hex(&self, index: usize) -> String {
        format!("0x{:04X}", self.vi[index & 0xF])
    }

    /// Format PC as hex
    pub fn pc_hex(&self) -> String {
        format!("0x{:04X}", self.pc)
    }
}
