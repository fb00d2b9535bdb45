//! Test harnesses: nestest logging and Harte single-opcode cases
//!
//! Two conformance surfaces, both consuming nothing but the public hook
//! channels:
//!
//! - [`nestest_run`] executes a ROM in nestest mode and formats one log line
//!   per instruction, for comparison against the published golden log.
//! - [`harte_case_run`] executes exactly one opcode against flat memory and
//!   returns the final CPU state, the sampled RAM and the ordered bus-cycle
//!   trace. [`HarteCase`] deserializes the published JSON fixture format.
//!
//! [`build_nrom`] assembles minimal mapper-0 images for tests that need a
//! cartridge without shipping one.

use serde::Deserialize;

use crate::cartridge::{CHR_BANK_SIZE, PRG_BANK_SIZE};
use crate::errors::NesError;
use crate::hooks::{AccessKind, CpuState, Hooks, MemoryAccess};
use crate::system::{Nes, Options};

/// Length of the published nestest golden log.
pub const NESTEST_LINES: usize = 8991;

/// Assemble a mapper-0 iNES image. `prg` is copied to the start of PRG ROM
/// and the rest is zero filled; `flags6` lands in header byte 6 verbatim
/// (bit 0 selects the vertical nametable arrangement).
pub fn build_nrom(prg: &[u8], prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
    let prg_len = prg_banks as usize * PRG_BANK_SIZE;
    assert!(prg.len() <= prg_len, "program larger than PRG ROM");

    let mut rom = Vec::with_capacity(16 + prg_len + chr_banks as usize * CHR_BANK_SIZE);
    rom.extend_from_slice(b"NES\x1A");
    rom.push(prg_banks);
    rom.push(chr_banks);
    rom.push(flags6);
    rom.extend_from_slice(&[0; 9]);
    rom.extend_from_slice(prg);
    rom.resize(16 + prg_len, 0);
    rom.resize(16 + prg_len + chr_banks as usize * CHR_BANK_SIZE, 0);
    rom
}

struct NestestLog {
    lines: Vec<String>,
    limit: usize,
}

impl Hooks for NestestLog {
    fn on_cpu_state(&mut self, s: &CpuState) {
        if self.lines.len() < self.limit {
            self.lines.push(format!(
                "{} {:04x} {:02x} {} {:02x} {:02x} {:02x} {:02x} {:02x} {}",
                self.lines.len() + 1,
                s.pc,
                s.opcode,
                s.mnemonic,
                s.a,
                s.x,
                s.y,
                s.p,
                s.sp,
                s.cycles
            ));
        }
    }
}

/// Run a ROM in nestest mode and return up to `max_lines` log lines, one per
/// instruction: `<n> <pc> <opc> <mnemonic> <a> <x> <y> <p> <sp> <cycles>`.
/// Registers show the state before each instruction, as the golden log does.
pub fn nestest_run(rom: &[u8], max_lines: usize) -> Result<Vec<String>, NesError> {
    let hooks = NestestLog {
        lines: Vec::new(),
        limit: max_lines,
    };
    let mut nes = Nes::with_options(
        hooks,
        Options {
            nestest_mode: true,
            ppu_enabled: true,
        },
    );
    nes.load_rom(rom)?;
    nes.reset();
    while nes.hooks().lines.len() < max_lines {
        nes.step_instruction()?;
    }
    Ok(std::mem::take(&mut nes.hooks_mut().lines))
}

/// CPU and RAM snapshot as found in the Harte fixture files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarteState {
    pub pc: u16,
    /// Stack pointer (the fixtures call it `s`).
    pub s: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    /// `(address, value)` pairs; everything else is zero.
    pub ram: Vec<(u16, u8)>,
}

/// One fixture: initial snapshot, expected final snapshot, expected bus
/// cycles.
#[derive(Debug, Clone, Deserialize)]
pub struct HarteCase {
    pub name: String,
    pub initial: HarteState,
    #[serde(rename = "final")]
    pub final_state: HarteState,
    /// `(address, value, "read" | "write")` per bus cycle.
    pub cycles: Vec<(u16, u8, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Read,
    Write,
}

/// One recorded bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCycle {
    pub addr: u16,
    pub val: u8,
    pub kind: CycleKind,
}

impl HarteCase {
    /// The fixture's expected cycle list as typed [`BusCycle`]s.
    pub fn expected_cycles(&self) -> Vec<BusCycle> {
        self.cycles
            .iter()
            .map(|(addr, val, kind)| BusCycle {
                addr: *addr,
                val: *val,
                kind: if kind.as_str() == "read" {
                    CycleKind::Read
                } else {
                    CycleKind::Write
                },
            })
            .collect()
    }
}

/// Parse a Harte fixture file (a JSON array of cases).
pub fn parse_harte_cases(json: &str) -> serde_json::Result<Vec<HarteCase>> {
    serde_json::from_str(json)
}

/// Result of running one case: the final snapshot (RAM sampled at the
/// addresses the fixture's final state lists) and the bus-cycle trace.
#[derive(Debug, Clone)]
pub struct HarteOutcome {
    pub state: HarteState,
    pub cycles: Vec<BusCycle>,
}

#[derive(Default)]
struct CycleRecorder {
    cycles: Vec<BusCycle>,
}

impl Hooks for CycleRecorder {
    fn on_memory(&mut self, a: MemoryAccess) {
        self.cycles.push(BusCycle {
            addr: a.addr,
            val: a.val,
            kind: match a.kind {
                AccessKind::Fetch => CycleKind::Read,
                AccessKind::Write => CycleKind::Write,
            },
        });
    }
}

/// Execute exactly one opcode from the case's initial state against flat
/// 64 KiB memory (PPU disabled). Pending I-flag updates are flushed before
/// the snapshot, which is the timing the fixtures assume.
pub fn harte_case_run(case: &HarteCase) -> Result<HarteOutcome, NesError> {
    let mut nes = Nes::with_options(
        CycleRecorder::default(),
        Options {
            nestest_mode: false,
            ppu_enabled: false,
        },
    );

    {
        let cpu = nes.cpu_mut();
        cpu.set_pc(case.initial.pc);
        cpu.set_sp(case.initial.s);
        cpu.set_a(case.initial.a);
        cpu.set_x(case.initial.x);
        cpu.set_y(case.initial.y);
        cpu.set_p(case.initial.p);
    }
    for &(addr, val) in &case.initial.ram {
        nes.bus_mut().poke(addr, val);
    }

    nes.step_instruction()?;
    nes.cpu_mut().flush_i_latch();

    let ram = case
        .final_state
        .ram
        .iter()
        .map(|&(addr, _)| (addr, nes.bus().peek(addr)))
        .collect();
    let state = HarteState {
        pc: nes.cpu().pc(),
        s: nes.cpu().sp(),
        a: nes.cpu().a(),
        x: nes.cpu().x(),
        y: nes.cpu().y(),
        p: nes.cpu().p(),
        ram,
    };
    let cycles = std::mem::take(&mut nes.hooks_mut().cycles);
    Ok(HarteOutcome { state, cycles })
}
