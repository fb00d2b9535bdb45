//! ricoh-core - cycle-accurate NES emulator core
//!
//! Emulates the console's 8-bit 6502-family CPU and its companion PPU,
//! coupled through a shared memory map at the hard three-dots-per-CPU-cycle
//! ratio. The hot path is the full legal and illegal opcode set with exact
//! per-cycle bus traffic, the background tile pipeline, and the NROM
//! (mapper 0) cartridge mapping.
//!
//! Modules:
//! - `cpu`: 6502 execution engine with table-driven dispatch
//! - `ppu`: background pipeline, VBlank/NMI, memory-mapped registers
//! - `bus`: CPU and PPU address maps, controller port, APU/IO stubs
//! - `cartridge`: iNES loading and mapper 0
//! - `controller`: 8-button serial/parallel latch
//! - `hooks`: the callback surface the core reports through
//! - `system`: the `Nes` aggregate and its `step` primitives
//! - `testing`: nestest and Harte conformance harnesses
//!
//! The core performs no I/O (ROM bytes come in as slices) and spawns no
//! threads; a host drives it by calling [`Nes::step_instruction`] in a loop.

#![forbid(unsafe_code)]

pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod errors;
pub mod hooks;
pub mod ppu;
pub mod system;
pub mod testing;

pub use bus::Bus;
pub use cartridge::{Cartridge, Mirroring};
pub use controller::Controller;
pub use cpu::Cpu;
pub use errors::NesError;
pub use hooks::{CpuState, Hooks, MemoryAccess, NullHooks, PpuState};
pub use ppu::Ppu;
pub use system::{Nes, Options};
