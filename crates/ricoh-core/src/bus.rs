//! Memory bus and address routing
//!
//! CPU memory map:
//! - `$0000-$1FFF`: 2 KiB work RAM, mirrored every 2 KiB
//! - `$2000-$3FFF`: PPU registers, mirrored every 8 bytes
//! - `$4014`: OAMDMA trigger (latched for the CPU to execute)
//! - `$4016`: controller 1
//! - `$4000-$401F` (others): APU/IO byte stubs
//! - `$4020-$7FFF`: cartridge SRAM / expansion byte storage
//! - `$8000-$FFFF`: PRG ROM through the mapper (writes dropped)
//!
//! PPU memory map (served to the PPU through [`VideoMem`]):
//! - `$0000-$1FFF`: CHR through the mapper
//! - `$2000-$3EFF`: the two physical nametables, folded per the cartridge's
//!   arrangement
//! - `$3F00-$3FFF`: 32 bytes of palette RAM; entries `$10/$14/$18/$1C`
//!   mirror `$00/$04/$08/$0C`
//!
//! Every CPU access advances the PPU three dots and reports the *effective*
//! address on the trace channel. With the PPU disabled (`Bus::flat`) the bus
//! degrades to a flat 64 KiB array with no routing, which is what
//! single-opcode conformance fixtures assume.

use std::io::{self, Write};

use crate::cartridge::{Cartridge, Mirroring};
use crate::controller::Controller;
use crate::hooks::{AccessKind, Hooks, MemoryAccess};
use crate::ppu::Ppu;

/// Work RAM size.
pub const RAM_SIZE: usize = 0x800;

/// Physical nametable memory (two 1 KiB tables).
pub const NAMETABLE_SIZE: usize = 0x800;

/// Palette RAM size.
pub const PALETTE_SIZE: usize = 32;

const IO_BASE: u16 = 0x4000;
const IO_SIZE: usize = 0x20;
const SRAM_BASE: u16 = 0x4020;
const SRAM_SIZE: usize = 0x8000 - SRAM_BASE as usize;

/// Nametable and palette RAM, owned by the bus and lent to the PPU.
#[derive(Debug, Clone)]
pub(crate) struct Vram {
    nametables: [u8; NAMETABLE_SIZE],
    palette: [u8; PALETTE_SIZE],
}

impl Vram {
    fn new() -> Self {
        Self {
            nametables: [0; NAMETABLE_SIZE],
            palette: [0; PALETTE_SIZE],
        }
    }
}

/// The PPU's view of its address space for the duration of one operation.
pub struct VideoMem<'a> {
    cart: Option<&'a mut Cartridge>,
    vram: &'a mut Vram,
}

impl VideoMem<'_> {
    pub fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => self.cart.as_ref().map_or(0, |c| c.chr_read(addr)),
            0x2000..=0x3EFF => self.vram.nametables[self.nametable_index(addr)],
            _ => self.vram.palette[palette_index(addr)],
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.chr_write(addr, val);
                }
            }
            0x2000..=0x3EFF => self.vram.nametables[self.nametable_index(addr)] = val,
            _ => self.vram.palette[palette_index(addr)] = val,
        }
    }

    /// Fold a `$2000-$3EFF` address onto the two physical tables.
    fn nametable_index(&self, addr: u16) -> usize {
        let addr = addr & 0x0FFF;
        let table = addr / 0x400;
        let offset = (addr & 0x3FF) as usize;
        let mirroring = self
            .cart
            .as_ref()
            .map_or(Mirroring::Horizontal, |c| c.mirroring());
        let physical = match mirroring {
            // $2400 folds onto $2000, $2C00 onto $2800.
            Mirroring::Horizontal => [0, 0, 1, 1][table as usize],
            // $2800 folds onto $2000, $2C00 onto $2400.
            Mirroring::Vertical => [0, 1, 0, 1][table as usize],
        };
        physical * 0x400 + offset
    }
}

/// Sub-mirror the palette: `$10/$14/$18/$1C` fold onto `$00/$04/$08/$0C`.
fn palette_index(addr: u16) -> usize {
    let idx = (addr & 0x1F) as usize;
    if idx & 0x13 == 0x10 {
        idx & !0x10
    } else {
        idx
    }
}

/// CPU-side bus owning RAM, the PPU, the controller and the cartridge.
#[derive(Debug)]
pub struct Bus {
    ram: [u8; RAM_SIZE],
    io: [u8; IO_SIZE],
    sram: Vec<u8>,
    vram: Vram,
    ppu: Ppu,
    controller: Controller,
    cart: Option<Cartridge>,

    /// Latched NMI edge from the PPU, consumed at instruction boundaries.
    nmi_pending: bool,
    /// Page latched by a `$4014` write, consumed by the CPU's DMA routine.
    oamdma_page: Option<u8>,

    /// Flat 64 KiB memory; present only when the PPU is disabled.
    flat: Option<Box<[u8; 0x10000]>>,
}

impl Bus {
    /// A full machine bus: RAM, PPU, controller, cartridge slot.
    pub fn new() -> Self {
        Self {
            ram: [0; RAM_SIZE],
            io: [0; IO_SIZE],
            sram: vec![0; SRAM_SIZE],
            vram: Vram::new(),
            ppu: Ppu::new(),
            controller: Controller::new(),
            cart: None,
            nmi_pending: false,
            oamdma_page: None,
            flat: None,
        }
    }

    /// A CPU-only bus: flat 64 KiB of memory, no routing, no PPU ticking.
    pub fn flat() -> Self {
        let mut bus = Self::new();
        bus.flat = Some(Box::new([0; 0x10000]));
        bus
    }

    pub fn attach_cartridge(&mut self, cart: Cartridge) {
        // A trainer, when present, lands at CPU $7000.
        if let Some(trainer) = cart.trainer() {
            let base = (0x7000 - SRAM_BASE) as usize;
            self.sram[base..base + trainer.len()].copy_from_slice(trainer);
        }
        self.cart = Some(cart);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    /// One CPU bus read; advances the PPU three dots.
    pub fn read<H: Hooks>(&mut self, addr: u16, hooks: &mut H) -> u8 {
        if let Some(flat) = self.flat.as_ref() {
            let val = flat[addr as usize];
            hooks.on_memory(MemoryAccess {
                kind: AccessKind::Fetch,
                addr,
                val,
            });
            return val;
        }

        let (effective, val) = match addr {
            0x0000..=0x1FFF => (addr & 0x07FF, self.ram[(addr & 0x07FF) as usize]),
            0x2000..=0x3FFF => {
                let reg = (addr & 0x07) as u8;
                let Bus {
                    ppu, cart, vram, ..
                } = self;
                let mut mem = VideoMem {
                    cart: cart.as_mut(),
                    vram,
                };
                let val = ppu.register_read(reg, &mut mem);
                self.collect_nmi();
                (0x2000 | reg as u16, val)
            }
            0x4016 => (addr, self.controller.read()),
            0x4000..=0x401F => (addr, self.io[(addr - IO_BASE) as usize]),
            0x4020..=0x7FFF => (addr, self.sram[(addr - SRAM_BASE) as usize]),
            0x8000..=0xFFFF => (addr, self.cart.as_ref().map_or(0, |c| c.prg_read(addr))),
        };
        hooks.on_memory(MemoryAccess {
            kind: AccessKind::Fetch,
            addr: effective,
            val,
        });
        self.tick_ppu(hooks);
        val
    }

    /// One CPU bus write; advances the PPU three dots.
    pub fn write<H: Hooks>(&mut self, addr: u16, val: u8, hooks: &mut H) {
        if let Some(flat) = self.flat.as_mut() {
            flat[addr as usize] = val;
            hooks.on_memory(MemoryAccess {
                kind: AccessKind::Write,
                addr,
                val,
            });
            return;
        }

        let effective = match addr {
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
                addr & 0x07FF
            }
            0x2000..=0x3FFF => {
                let reg = (addr & 0x07) as u8;
                let Bus {
                    ppu, cart, vram, ..
                } = self;
                let mut mem = VideoMem {
                    cart: cart.as_mut(),
                    vram,
                };
                ppu.register_write(reg, val, &mut mem);
                self.collect_nmi();
                0x2000 | reg as u16
            }
            0x4014 => {
                self.oamdma_page = Some(val);
                self.io[(addr - IO_BASE) as usize] = val;
                addr
            }
            0x4016 => {
                self.controller.write(val, hooks);
                self.io[(addr - IO_BASE) as usize] = val;
                addr
            }
            0x4000..=0x401F => {
                self.io[(addr - IO_BASE) as usize] = val;
                addr
            }
            0x4020..=0x7FFF => {
                self.sram[(addr - SRAM_BASE) as usize] = val;
                addr
            }
            // PRG ROM: the access is traced, the write is dropped.
            0x8000..=0xFFFF => addr,
        };
        hooks.on_memory(MemoryAccess {
            kind: AccessKind::Write,
            addr: effective,
            val,
        });
        self.tick_ppu(hooks);
    }

    /// Advance the PPU one dot (host-driven debugging aid).
    pub fn step_dot<H: Hooks>(&mut self, hooks: &mut H) {
        if self.flat.is_some() {
            return;
        }
        let Bus {
            ppu,
            cart,
            vram,
            nmi_pending,
            ..
        } = self;
        let mut mem = VideoMem {
            cart: cart.as_mut(),
            vram,
        };
        if ppu.step(&mut mem, hooks) {
            *nmi_pending = true;
        }
    }

    /// Three PPU dots per CPU bus cycle.
    fn tick_ppu<H: Hooks>(&mut self, hooks: &mut H) {
        for _ in 0..3 {
            self.step_dot(hooks);
        }
    }

    fn collect_nmi(&mut self) {
        if self.ppu.take_nmi() {
            self.nmi_pending = true;
        }
    }

    /// Consume the latched NMI edge.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Consume the page latched by a `$4014` write.
    pub fn take_oamdma(&mut self) -> Option<u8> {
        self.oamdma_page.take()
    }

    /// PPU-side read with nametable and palette mirroring applied.
    pub fn vram_read(&mut self, addr: u16) -> u8 {
        let Bus { cart, vram, .. } = self;
        VideoMem {
            cart: cart.as_mut(),
            vram,
        }
        .read(addr)
    }

    /// PPU-side write with nametable and palette mirroring applied.
    pub fn vram_write(&mut self, addr: u16, val: u8) {
        let Bus { cart, vram, .. } = self;
        VideoMem {
            cart: cart.as_mut(),
            vram,
        }
        .write(addr, val);
    }

    /// Read without side effects (no PPU ticking, no trace); register reads
    /// fall back to the open-bus value. Debug aid.
    pub fn peek(&self, addr: u16) -> u8 {
        if let Some(flat) = self.flat.as_ref() {
            return flat[addr as usize];
        }
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => 0,
            0x4000..=0x401F => self.io[(addr - IO_BASE) as usize],
            0x4020..=0x7FFF => self.sram[(addr - SRAM_BASE) as usize],
            0x8000..=0xFFFF => self.cart.as_ref().map_or(0, |c| c.prg_read(addr)),
        }
    }

    /// Poke memory directly (no side effects). Debug and test aid.
    pub fn poke(&mut self, addr: u16, val: u8) {
        if let Some(flat) = self.flat.as_mut() {
            flat[addr as usize] = val;
            return;
        }
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = val,
            0x2000..=0x3FFF => {}
            0x4000..=0x401F => self.io[(addr - IO_BASE) as usize] = val,
            0x4020..=0x7FFF => self.sram[(addr - SRAM_BASE) as usize] = val,
            0x8000..=0xFFFF => {}
        }
    }

    /// Hexdump the 2 KiB work RAM: 16 bytes per row with an ASCII gutter.
    pub fn dump_ram<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (row, chunk) in self.ram.chunks(16).enumerate() {
            write!(out, "{:04x}: ", row * 16)?;
            for byte in chunk {
                write!(out, "{:02x} ", byte)?;
            }
            write!(out, "|")?;
            for &byte in chunk {
                let c = if byte.is_ascii_graphic() {
                    byte as char
                } else {
                    '.'
                };
                write!(out, "{}", c)?;
            }
            writeln!(out, "|")?;
        }
        Ok(())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
