//! System integration
//!
//! [`Nes`] is the single owner of the whole machine: the CPU, and through the
//! bus the PPU, controller and cartridge. The canonical loop calls
//! [`Nes::step_instruction`] repeatedly; each CPU bus cycle inside advances
//! the PPU three dots and delivers every hook synchronously, in order. There
//! is no concurrency and no re-entrancy.

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::errors::NesError;
use crate::hooks::Hooks;

/// Recognized configuration options.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Force the CPU to `$C000` with the cycle counter seeded to 7 at reset,
    /// ignoring the ROM's reset vector.
    pub nestest_mode: bool,
    /// When false the CPU runs against flat 64 KiB memory with no PPU, as
    /// single-opcode conformance fixtures expect.
    pub ppu_enabled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            nestest_mode: false,
            ppu_enabled: true,
        }
    }
}

/// The emulated machine.
#[derive(Debug)]
pub struct Nes<H: Hooks> {
    cpu: Cpu,
    bus: Bus,
    hooks: H,
    options: Options,
}

impl<H: Hooks> Nes<H> {
    pub fn new(hooks: H) -> Self {
        Self::with_options(hooks, Options::default())
    }

    pub fn with_options(hooks: H, options: Options) -> Self {
        let bus = if options.ppu_enabled {
            Bus::new()
        } else {
            Bus::flat()
        };
        Self {
            cpu: Cpu::new(),
            bus,
            hooks,
            options,
        }
    }

    /// Parse an iNES image and attach the cartridge.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), NesError> {
        let cart = Cartridge::from_ines(bytes)?;
        self.bus.attach_cartridge(cart);
        Ok(())
    }

    /// Reset the CPU (vector read, or `$C000` in nestest mode) and the PPU.
    pub fn reset(&mut self) {
        self.bus.ppu_mut().reset();
        self.cpu
            .reset(&mut self.bus, &mut self.hooks, self.options.nestest_mode);
    }

    /// Execute exactly one instruction (or service a pending NMI); the PPU
    /// advances three dots per CPU bus cycle. Returns the bus cycles
    /// consumed.
    pub fn step_instruction(&mut self) -> Result<u64, NesError> {
        self.cpu.step(&mut self.bus, &mut self.hooks)
    }

    /// Advance the PPU one dot without touching the CPU.
    pub fn step_dot(&mut self) {
        self.bus.step_dot(&mut self.hooks);
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}
