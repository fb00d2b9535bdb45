//! Headless command-line runner for the emulator core.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ricoh_core::hooks::NullHooks;
use ricoh_core::testing::{nestest_run, NESTEST_LINES};
use ricoh_core::{Nes, Options};

/// NTSC CPU cycles per frame, rounded.
const CYCLES_PER_FRAME: u64 = 29781;

#[derive(Parser, Debug)]
#[command(name = "ricoh-cli")]
#[command(about = "Headless NES emulator runner", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Emit a nestest-style execution log instead of running frames
    #[arg(long)]
    nestest: bool,

    /// Number of log lines in --nestest mode
    #[arg(long, default_value_t = NESTEST_LINES)]
    lines: usize,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Hexdump work RAM after execution
    #[arg(short = 'm', long)]
    dump_ram: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = fs::read(&args.rom)
        .with_context(|| format!("failed to read ROM file {}", args.rom.display()))?;

    if args.nestest {
        let lines = nestest_run(&rom, args.lines)
            .with_context(|| format!("nestest run of {} failed", args.rom.display()))?;
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        return Ok(());
    }

    let mut nes = Nes::with_options(NullHooks, Options::default());
    nes.load_rom(&rom)
        .with_context(|| format!("failed to load {}", args.rom.display()))?;
    nes.reset();

    if let Some(cart) = nes.bus().cartridge() {
        println!("loaded {}:", args.rom.display());
        println!("  PRG ROM: {} bytes", cart.prg_len());
        println!("  CHR:     {} bytes", cart.chr_len());
        println!("  mirroring: {:?}", cart.mirroring());
    }

    let target = args.frames * CYCLES_PER_FRAME;
    while nes.cpu().cycles() < target {
        nes.step_instruction()
            .with_context(|| format!("execution stopped at pc {:04x}", nes.cpu().pc()))?;
    }
    println!(
        "ran {} frames ({} CPU cycles)",
        args.frames,
        nes.cpu().cycles()
    );

    if args.dump_cpu {
        let cpu = nes.cpu();
        println!("\nCPU state:");
        println!("  A:  ${:02X}", cpu.a());
        println!("  X:  ${:02X}", cpu.x());
        println!("  Y:  ${:02X}", cpu.y());
        println!("  PC: ${:04X}", cpu.pc());
        println!("  SP: ${:02X}", cpu.sp());
        println!("  P:  ${:02X}", cpu.p());
        println!("  cycles: {}", cpu.cycles());
    }

    if args.dump_ram {
        println!();
        let mut out = io::stdout().lock();
        nes.bus().dump_ram(&mut out)?;
    }

    Ok(())
}
