//! Debug tooling for the vector subsystem
//!
//! Nothing in here is on the execution path: the disassembler and the
//! debugger read state, they never drive it.

pub mod debugger;
pub mod disassembler;

pub use debugger::{VuDebugState, VuDebugger, VuRegisterSnapshot, VuTraceEntry};
pub use disassembler::{DisassembledInstruction, VuDisassembler};
