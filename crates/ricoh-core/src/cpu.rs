//! CPU - 6502 core (2A03, no decimal mode arithmetic effect)
//!
//! Executes one instruction per `step`, interleaving every bus access with
//! three PPU dots through the bus. Dummy reads and dummy writes happen where
//! the hardware performs them, so the memory-trace channel reproduces the
//! chip's cycle-by-cycle bus traffic.
//!
//! Dispatch is a 256-entry table of `(mnemonic, kind, addressing mode)`
//! rows; the table layout follows the opcode matrix, where every variant of
//! an instruction sits on the same row at fixed column offsets. Illegal
//! opcodes carry a `*` prefix on their mnemonic. Stores and read-modify-write
//! instructions use the `..Ec` addressing variants, which always pay the
//! indexed re-read instead of only on page crossings.
//!
//! CLI, SEI and PLP change the I flag one instruction late, through a
//! two-step latch consulted at each instruction boundary.

use crate::bus::Bus;
use crate::errors::NesError;
use crate::hooks::{CpuState, Hooks};

/// Processor status flags, bit 0 to bit 7.
pub const FLAG_C: u8 = 1 << 0;
pub const FLAG_Z: u8 = 1 << 1;
pub const FLAG_I: u8 = 1 << 2;
pub const FLAG_D: u8 = 1 << 3;
pub const FLAG_B: u8 = 1 << 4;
pub const FLAG_U: u8 = 1 << 5;
pub const FLAG_V: u8 = 1 << 6;
pub const FLAG_N: u8 = 1 << 7;

/// Addressing modes. The `..Ec` variants always perform the indexed re-read;
/// the plain indexed variants only pay it on a page crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Imp,
    Rel,
    Imm,
    Abs,
    AbsX,
    AbsY,
    AbsInd,
    IndX,
    IndY,
    Zp,
    ZpX,
    ZpY,
    AbsXEc,
    AbsYEc,
    IndYEc,
}

impl AddrMode {
    /// Tag string reported on the CPU-state channel.
    pub fn tag(self) -> &'static str {
        match self {
            AddrMode::Imp => "IMP",
            AddrMode::Rel => "REL",
            AddrMode::Imm => "IMM",
            AddrMode::Abs => "ABS",
            AddrMode::AbsX => "ABS_X",
            AddrMode::AbsY => "ABS_Y",
            AddrMode::AbsInd => "ABS_IND",
            AddrMode::IndX => "IND_X",
            AddrMode::IndY => "IND_Y",
            AddrMode::Zp => "ZP",
            AddrMode::ZpX => "ZP_X",
            AddrMode::ZpY => "ZP_Y",
            AddrMode::AbsXEc => "ABS_X_EC",
            AddrMode::AbsYEc => "ABS_Y_EC",
            AddrMode::IndYEc => "IND_Y_EC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    // ALU
    Ora,
    And,
    Eor,
    Adc,
    Sbc,
    Cmp,
    Cpx,
    Cpy,
    Bit,
    // Loads and stores
    Lda,
    Ldx,
    Ldy,
    Sta,
    Stx,
    Sty,
    // Read-modify-write
    Asl,
    Rol,
    Lsr,
    Ror,
    Inc,
    Dec,
    // Register operations
    Tax,
    Txa,
    Tay,
    Tya,
    Tsx,
    Txs,
    Inx,
    Iny,
    Dex,
    Dey,
    // Flags
    Clc,
    Sec,
    Cli,
    Sei,
    Cld,
    Sed,
    Clv,
    // Stack
    Pha,
    Pla,
    Php,
    Plp,
    // Control flow
    Jmp,
    Jsr,
    Rts,
    Brk,
    Rti,
    Bpl,
    Bmi,
    Bvc,
    Bvs,
    Bcc,
    Bcs,
    Bne,
    Beq,
    Nop,
    // Illegal opcodes
    Lax,
    Sax,
    Dcp,
    Isb,
    Slo,
    Rla,
    Sre,
    Rra,
    // Unimplemented: surfaces IllegalOpcode
    Ill,
}

#[derive(Debug, Clone, Copy)]
struct OpEntry {
    mnemonic: &'static str,
    kind: OpKind,
    mode: AddrMode,
}

const fn op(mnemonic: &'static str, kind: OpKind, mode: AddrMode) -> OpEntry {
    OpEntry {
        mnemonic,
        kind,
        mode,
    }
}

/// The opcode matrix. Rows sharing a layout are filled by loops over the
/// shared column offsets; one-off opcodes are assigned directly.
static OPCODES: [OpEntry; 256] = {
    use AddrMode::*;
    use OpKind::*;

    let mut t = [op("???", Ill, Imp); 256];

    // ALU rows: base + {$01 IND_X, $05 ZP, $09 IMM, $0D ABS,
    //                   $11 IND_Y, $15 ZP_X, $19 ABS_Y, $1D ABS_X}
    const ALU_COLS: [(u8, AddrMode); 8] = [
        (0x01, IndX),
        (0x05, Zp),
        (0x09, Imm),
        (0x0D, Abs),
        (0x11, IndY),
        (0x15, ZpX),
        (0x19, AbsY),
        (0x1D, AbsX),
    ];
    const ALU_ROWS: [(u8, &str, OpKind); 7] = [
        (0x00, "ORA", Ora),
        (0x20, "AND", And),
        (0x40, "EOR", Eor),
        (0x60, "ADC", Adc),
        (0xA0, "LDA", Lda),
        (0xC0, "CMP", Cmp),
        (0xE0, "SBC", Sbc),
    ];
    let mut i = 0;
    while i < ALU_ROWS.len() {
        let mut j = 0;
        while j < ALU_COLS.len() {
            let idx = (ALU_ROWS[i].0 + ALU_COLS[j].0) as usize;
            t[idx] = op(ALU_ROWS[i].1, ALU_ROWS[i].2, ALU_COLS[j].1);
            j += 1;
        }
        i += 1;
    }

    // STA shares the ALU layout except that indexed stores always pay the
    // extra read and there is no immediate form.
    t[0x81] = op("STA", Sta, IndX);
    t[0x85] = op("STA", Sta, Zp);
    t[0x8D] = op("STA", Sta, Abs);
    t[0x91] = op("STA", Sta, IndYEc);
    t[0x95] = op("STA", Sta, ZpX);
    t[0x99] = op("STA", Sta, AbsYEc);
    t[0x9D] = op("STA", Sta, AbsXEc);

    // RMW rows: base + {$06 ZP, $0A accumulator, $0E ABS, $16 ZP_X, $1E ABS_X_EC}
    const RMW_ROWS: [(u8, &str, OpKind); 4] = [
        (0x00, "ASL", Asl),
        (0x20, "ROL", Rol),
        (0x40, "LSR", Lsr),
        (0x60, "ROR", Ror),
    ];
    let mut i = 0;
    while i < RMW_ROWS.len() {
        let base = RMW_ROWS[i].0;
        t[(base + 0x06) as usize] = op(RMW_ROWS[i].1, RMW_ROWS[i].2, Zp);
        t[(base + 0x0A) as usize] = op(RMW_ROWS[i].1, RMW_ROWS[i].2, Imp);
        t[(base + 0x0E) as usize] = op(RMW_ROWS[i].1, RMW_ROWS[i].2, Abs);
        t[(base + 0x16) as usize] = op(RMW_ROWS[i].1, RMW_ROWS[i].2, ZpX);
        t[(base + 0x1E) as usize] = op(RMW_ROWS[i].1, RMW_ROWS[i].2, AbsXEc);
        i += 1;
    }

    // INC/DEC: the RMW layout minus the accumulator column.
    t[0xC6] = op("DEC", Dec, Zp);
    t[0xCE] = op("DEC", Dec, Abs);
    t[0xD6] = op("DEC", Dec, ZpX);
    t[0xDE] = op("DEC", Dec, AbsXEc);
    t[0xE6] = op("INC", Inc, Zp);
    t[0xEE] = op("INC", Inc, Abs);
    t[0xF6] = op("INC", Inc, ZpX);
    t[0xFE] = op("INC", Inc, AbsXEc);

    // Remaining loads and stores.
    t[0xA2] = op("LDX", Ldx, Imm);
    t[0xA6] = op("LDX", Ldx, Zp);
    t[0xAE] = op("LDX", Ldx, Abs);
    t[0xB6] = op("LDX", Ldx, ZpY);
    t[0xBE] = op("LDX", Ldx, AbsY);
    t[0xA0] = op("LDY", Ldy, Imm);
    t[0xA4] = op("LDY", Ldy, Zp);
    t[0xAC] = op("LDY", Ldy, Abs);
    t[0xB4] = op("LDY", Ldy, ZpX);
    t[0xBC] = op("LDY", Ldy, AbsX);
    t[0x86] = op("STX", Stx, Zp);
    t[0x8E] = op("STX", Stx, Abs);
    t[0x96] = op("STX", Stx, ZpY);
    t[0x84] = op("STY", Sty, Zp);
    t[0x8C] = op("STY", Sty, Abs);
    t[0x94] = op("STY", Sty, ZpX);

    // Compares and bit test.
    t[0xE0] = op("CPX", Cpx, Imm);
    t[0xE4] = op("CPX", Cpx, Zp);
    t[0xEC] = op("CPX", Cpx, Abs);
    t[0xC0] = op("CPY", Cpy, Imm);
    t[0xC4] = op("CPY", Cpy, Zp);
    t[0xCC] = op("CPY", Cpy, Abs);
    t[0x24] = op("BIT", Bit, Zp);
    t[0x2C] = op("BIT", Bit, Abs);

    // Control flow.
    t[0x4C] = op("JMP", Jmp, Abs);
    t[0x6C] = op("JMP", Jmp, AbsInd);
    t[0x20] = op("JSR", Jsr, Abs);
    t[0x60] = op("RTS", Rts, Imp);
    t[0x00] = op("BRK", Brk, Imp);
    t[0x40] = op("RTI", Rti, Imp);
    t[0x10] = op("BPL", Bpl, Rel);
    t[0x30] = op("BMI", Bmi, Rel);
    t[0x50] = op("BVC", Bvc, Rel);
    t[0x70] = op("BVS", Bvs, Rel);
    t[0x90] = op("BCC", Bcc, Rel);
    t[0xB0] = op("BCS", Bcs, Rel);
    t[0xD0] = op("BNE", Bne, Rel);
    t[0xF0] = op("BEQ", Beq, Rel);

    // Implied one-offs.
    t[0x08] = op("PHP", Php, Imp);
    t[0x28] = op("PLP", Plp, Imp);
    t[0x48] = op("PHA", Pha, Imp);
    t[0x68] = op("PLA", Pla, Imp);
    t[0x18] = op("CLC", Clc, Imp);
    t[0x38] = op("SEC", Sec, Imp);
    t[0x58] = op("CLI", Cli, Imp);
    t[0x78] = op("SEI", Sei, Imp);
    t[0xB8] = op("CLV", Clv, Imp);
    t[0xD8] = op("CLD", Cld, Imp);
    t[0xF8] = op("SED", Sed, Imp);
    t[0x88] = op("DEY", Dey, Imp);
    t[0x8A] = op("TXA", Txa, Imp);
    t[0x98] = op("TYA", Tya, Imp);
    t[0x9A] = op("TXS", Txs, Imp);
    t[0xA8] = op("TAY", Tay, Imp);
    t[0xAA] = op("TAX", Tax, Imp);
    t[0xBA] = op("TSX", Tsx, Imp);
    t[0xC8] = op("INY", Iny, Imp);
    t[0xCA] = op("DEX", Dex, Imp);
    t[0xE8] = op("INX", Inx, Imp);
    t[0xEA] = op("NOP", Nop, Imp);

    // Unofficial NOPs.
    const NOP_ZP: [u8; 3] = [0x04, 0x44, 0x64];
    const NOP_ZP_X: [u8; 6] = [0x14, 0x34, 0x54, 0x74, 0xD4, 0xF4];
    const NOP_ABS_X: [u8; 6] = [0x1C, 0x3C, 0x5C, 0x7C, 0xDC, 0xFC];
    const NOP_IMP: [u8; 6] = [0x1A, 0x3A, 0x5A, 0x7A, 0xDA, 0xFA];
    const NOP_IMM: [u8; 5] = [0x80, 0x82, 0x89, 0xC2, 0xE2];
    let mut i = 0;
    while i < NOP_ZP.len() {
        t[NOP_ZP[i] as usize] = op("*NOP", Nop, Zp);
        i += 1;
    }
    t[0x0C] = op("*NOP", Nop, Abs);
    let mut i = 0;
    while i < NOP_ZP_X.len() {
        t[NOP_ZP_X[i] as usize] = op("*NOP", Nop, ZpX);
        i += 1;
    }
    let mut i = 0;
    while i < NOP_ABS_X.len() {
        t[NOP_ABS_X[i] as usize] = op("*NOP", Nop, AbsX);
        i += 1;
    }
    let mut i = 0;
    while i < NOP_IMP.len() {
        t[NOP_IMP[i] as usize] = op("*NOP", Nop, Imp);
        i += 1;
    }
    let mut i = 0;
    while i < NOP_IMM.len() {
        t[NOP_IMM[i] as usize] = op("*NOP", Nop, Imm);
        i += 1;
    }

    // LAX, SAX and the duplicate SBC.
    t[0xA3] = op("*LAX", Lax, IndX);
    t[0xA7] = op("*LAX", Lax, Zp);
    t[0xAF] = op("*LAX", Lax, Abs);
    t[0xB3] = op("*LAX", Lax, IndY);
    t[0xB7] = op("*LAX", Lax, ZpY);
    t[0xBF] = op("*LAX", Lax, AbsY);
    t[0x83] = op("*SAX", Sax, IndX);
    t[0x87] = op("*SAX", Sax, Zp);
    t[0x8F] = op("*SAX", Sax, Abs);
    t[0x97] = op("*SAX", Sax, ZpY);
    t[0xEB] = op("*SBC", Sbc, Imm);

    // Illegal RMW combos: base + {$03 IND_X, $07 ZP, $0F ABS, $13 IND_Y_EC,
    //                             $17 ZP_X, $1B ABS_Y_EC, $1F ABS_X_EC}
    const ILL_COLS: [(u8, AddrMode); 7] = [
        (0x03, IndX),
        (0x07, Zp),
        (0x0F, Abs),
        (0x13, IndYEc),
        (0x17, ZpX),
        (0x1B, AbsYEc),
        (0x1F, AbsXEc),
    ];
    const ILL_ROWS: [(u8, &str, OpKind); 6] = [
        (0x00, "*SLO", Slo),
        (0x20, "*RLA", Rla),
        (0x40, "*SRE", Sre),
        (0x60, "*RRA", Rra),
        (0xC0, "*DCP", Dcp),
        (0xE0, "*ISB", Isb),
    ];
    let mut i = 0;
    while i < ILL_ROWS.len() {
        let mut j = 0;
        while j < ILL_COLS.len() {
            let idx = (ILL_ROWS[i].0 + ILL_COLS[j].0) as usize;
            t[idx] = op(ILL_ROWS[i].1, ILL_ROWS[i].2, ILL_COLS[j].1);
            j += 1;
        }
        i += 1;
    }

    t
};

/// The 6502 execution engine.
#[derive(Debug, Clone)]
pub struct Cpu {
    a: u8,
    x: u8,
    y: u8,
    pc: u16,
    sp: u8,
    p: u8,
    cycles: u64,
    /// Deferred I-flag latch: 2 = scheduled, 1 = apply before the next
    /// instruction, 0 = idle.
    i_countdown: u8,
    i_pending: bool,
    /// IRQ line; nothing in the machine drives it yet, but the service path
    /// is wired for future cartridge or APU sources.
    irq_pending: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFD,
            p: FLAG_U | FLAG_I,
            cycles: 0,
            i_countdown: 0,
            i_pending: false,
            irq_pending: false,
        }
    }

    /// Reset: SP `$FD`, P `$24`, A=X=Y=0. In normal mode the PC loads from
    /// the `$FFFC` vector (two bus cycles); in nestest mode it is forced to
    /// `$C000` with the cycle counter seeded to 7 and no vector read.
    pub fn reset<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, nestest: bool) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.p = FLAG_U | FLAG_I;
        self.i_countdown = 0;
        self.i_pending = false;
        self.irq_pending = false;
        if nestest {
            self.pc = 0xC000;
            self.cycles = 7;
        } else {
            self.cycles = 0;
            self.pc = self.fetch16(bus, hooks, 0xFFFC);
        }
    }

    /// Execute one instruction, or service a pending NMI. Returns the number
    /// of bus cycles consumed.
    pub fn step<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H) -> Result<u64, NesError> {
        let start = self.cycles;
        let before = (self.pc, self.a, self.x, self.y, self.sp, self.p, self.cycles);
        self.apply_i_latch();

        let (opcode, mnemonic, mode) = if bus.take_nmi() {
            self.nmi(bus, hooks);
            (0, "NMI", AddrMode::Imp)
        } else if std::mem::take(&mut self.irq_pending) && self.p & FLAG_I == 0 {
            self.irq(bus, hooks);
            (0, "IRQ", AddrMode::Imp)
        } else {
            let opc = self.fetch8(bus, hooks, self.pc);
            self.pc = self.pc.wrapping_add(1);
            let entry = OPCODES[opc as usize];
            if entry.kind == OpKind::Ill {
                return Err(NesError::IllegalOpcode(opc));
            }
            self.exec(bus, hooks, entry.kind, entry.mode);
            (opc, entry.mnemonic, entry.mode)
        };

        // A $4014 write latches a DMA request; the CPU runs the copy itself.
        if let Some(page) = bus.take_oamdma() {
            self.oam_dma(bus, hooks, page);
        }

        hooks.on_cpu_state(&CpuState {
            pc: before.0,
            a: before.1,
            x: before.2,
            y: before.3,
            sp: before.4,
            p: before.5,
            cycles: before.6,
            opcode,
            mnemonic,
            mode,
        });
        Ok(self.cycles - start)
    }

    pub fn a(&self) -> u8 {
        self.a
    }
    pub fn x(&self) -> u8 {
        self.x
    }
    pub fn y(&self) -> u8 {
        self.y
    }
    pub fn pc(&self) -> u16 {
        self.pc
    }
    pub fn sp(&self) -> u8 {
        self.sp
    }
    pub fn p(&self) -> u8 {
        self.p
    }
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn set_a(&mut self, v: u8) {
        self.a = v;
    }
    pub fn set_x(&mut self, v: u8) {
        self.x = v;
    }
    pub fn set_y(&mut self, v: u8) {
        self.y = v;
    }
    pub fn set_pc(&mut self, v: u16) {
        self.pc = v;
    }
    pub fn set_sp(&mut self, v: u8) {
        self.sp = v;
    }
    pub fn set_p(&mut self, v: u8) {
        self.p = v;
    }

    /// Apply a pending I-flag update immediately, as single-opcode
    /// conformance fixtures expect.
    pub fn flush_i_latch(&mut self) {
        if self.i_countdown > 0 {
            self.set_flag(FLAG_I, self.i_pending);
            self.i_countdown = 0;
        }
    }

    /*------------------------------ internals -----------------------------*/

    /// CLI/SEI/PLP land here; the flag changes after the *next* instruction.
    fn apply_i_latch(&mut self) {
        match self.i_countdown {
            2 => self.i_countdown = 1,
            1 => {
                self.set_flag(FLAG_I, self.i_pending);
                self.i_countdown = 0;
            }
            _ => {}
        }
    }

    fn schedule_i_update(&mut self, value: bool) {
        self.i_countdown = 2;
        self.i_pending = value;
    }

    fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.p |= mask;
        } else {
            self.p &= !mask;
        }
    }

    fn set_zn(&mut self, val: u8) {
        self.set_flag(FLAG_Z, val == 0);
        self.set_flag(FLAG_N, val & 0x80 != 0);
    }

    fn fetch8<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, addr: u16) -> u8 {
        self.cycles += 1;
        bus.read(addr, hooks)
    }

    fn fetch16<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, addr: u16) -> u16 {
        let lo = self.fetch8(bus, hooks, addr) as u16;
        let hi = self.fetch8(bus, hooks, addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn write8<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, addr: u16, val: u8) {
        bus.write(addr, val, hooks);
        self.cycles += 1;
    }

    /// One bus cycle with no memory traffic (DMA alignment).
    fn tick_cycle<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H) {
        self.cycles += 1;
        for _ in 0..3 {
            bus.step_dot(hooks);
        }
    }

    fn stack_push<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, val: u8) {
        self.write8(bus, hooks, 0x0100 | self.sp as u16, val);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn stack_pop<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.fetch8(bus, hooks, 0x0100 | self.sp as u16)
    }

    /// NMI service: two dummy reads, push PCH/PCL/P (B clear, U set), set I,
    /// load the vector at `$FFFA`. Seven cycles.
    fn nmi<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H) {
        self.fetch8(bus, hooks, self.pc);
        self.fetch8(bus, hooks, self.pc);
        self.stack_push(bus, hooks, (self.pc >> 8) as u8);
        self.stack_push(bus, hooks, self.pc as u8);
        self.stack_push(bus, hooks, (self.p & !(FLAG_B | FLAG_U)) | FLAG_U);
        self.p |= FLAG_I;
        self.pc = self.fetch16(bus, hooks, 0xFFFA);
    }

    /// IRQ service: the NMI sequence with the `$FFFE` vector, honored only
    /// while the I flag is clear.
    fn irq<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H) {
        self.fetch8(bus, hooks, self.pc);
        self.fetch8(bus, hooks, self.pc);
        self.stack_push(bus, hooks, (self.pc >> 8) as u8);
        self.stack_push(bus, hooks, self.pc as u8);
        self.stack_push(bus, hooks, (self.p & !(FLAG_B | FLAG_U)) | FLAG_U);
        self.p |= FLAG_I;
        self.pc = self.fetch16(bus, hooks, 0xFFFE);
    }

    /// Raise the IRQ line; sampled at the next instruction boundary.
    pub fn assert_irq(&mut self) {
        self.irq_pending = true;
    }

    /// The 256-byte OAM copy: one alignment cycle (two from an odd cycle),
    /// then a read/write pair per byte. 513 or 514 cycles.
    fn oam_dma<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, page: u8) {
        let odd = self.cycles & 1 == 1;
        self.tick_cycle(bus, hooks);
        if odd {
            self.tick_cycle(bus, hooks);
        }
        let base = (page as u16) << 8;
        for i in 0..256 {
            let val = self.fetch8(bus, hooks, base + i);
            self.write8(bus, hooks, 0x2004, val);
        }
    }

    /*--------------------------- addressing modes -------------------------*/

    /// Resolve the effective address for `mode`, consuming operand bytes and
    /// emitting the mode's dummy reads. `Imp` returns the PC unconsumed (for
    /// the implied-mode dummy fetch); `Imm` and `Rel` return the operand's
    /// own address.
    fn operand_addr<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, mode: AddrMode) -> u16 {
        match mode {
            AddrMode::Imp => self.pc,
            AddrMode::Imm | AddrMode::Rel => {
                let pc = self.pc;
                self.pc = self.pc.wrapping_add(1);
                pc
            }
            AddrMode::Zp => {
                let pc = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.fetch8(bus, hooks, pc) as u16
            }
            AddrMode::ZpX => {
                let base = self.operand_addr(bus, hooks, AddrMode::Zp) as u8;
                self.fetch8(bus, hooks, base as u16);
                base.wrapping_add(self.x) as u16
            }
            AddrMode::ZpY => {
                let base = self.operand_addr(bus, hooks, AddrMode::Zp) as u8;
                self.fetch8(bus, hooks, base as u16);
                base.wrapping_add(self.y) as u16
            }
            AddrMode::Abs => {
                let addr = self.fetch16(bus, hooks, self.pc);
                self.pc = self.pc.wrapping_add(2);
                addr
            }
            AddrMode::AbsX => self.absolute_indexed(bus, hooks, self.x),
            AddrMode::AbsY => self.absolute_indexed(bus, hooks, self.y),
            AddrMode::AbsXEc => self.absolute_indexed_ec(bus, hooks, self.x),
            AddrMode::AbsYEc => self.absolute_indexed_ec(bus, hooks, self.y),
            AddrMode::AbsInd => {
                let ptr = self.fetch16(bus, hooks, self.pc);
                self.pc = self.pc.wrapping_add(2);
                let lo = self.fetch8(bus, hooks, ptr) as u16;
                // The high-byte fetch wraps within the pointer's page.
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = self.fetch8(bus, hooks, hi_addr) as u16;
                lo | (hi << 8)
            }
            AddrMode::IndX => {
                let zp = self.operand_addr(bus, hooks, AddrMode::Zp) as u8;
                self.fetch8(bus, hooks, zp as u16);
                let lo_addr = zp.wrapping_add(self.x) as u16;
                let hi_addr = zp.wrapping_add(self.x).wrapping_add(1) as u16;
                let lo = self.fetch8(bus, hooks, lo_addr) as u16;
                let hi = self.fetch8(bus, hooks, hi_addr) as u16;
                lo | (hi << 8)
            }
            AddrMode::IndY => {
                let zp = self.operand_addr(bus, hooks, AddrMode::Zp) as u8;
                let lo = self.fetch8(bus, hooks, zp as u16) as u16;
                let hi = self.fetch8(bus, hooks, zp.wrapping_add(1) as u16) as u16;
                let base = lo | (hi << 8);
                let addr = base.wrapping_add(self.y as u16);
                if (base ^ addr) & 0xFF00 != 0 {
                    self.fetch8(bus, hooks, (base & 0xFF00) | (addr & 0x00FF));
                }
                addr
            }
            AddrMode::IndYEc => {
                let zp = self.operand_addr(bus, hooks, AddrMode::Zp) as u8;
                let lo = self.fetch8(bus, hooks, zp as u16) as u16;
                let hi = self.fetch8(bus, hooks, zp.wrapping_add(1) as u16) as u16;
                let base = lo | (hi << 8);
                let addr = base.wrapping_add(self.y as u16);
                self.fetch8(bus, hooks, (base & 0xFF00) | (addr & 0x00FF));
                addr
            }
        }
    }

    /// Indexed absolute with the extra read only on a page crossing; the
    /// dummy read goes to the un-carried address.
    fn absolute_indexed<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, index: u8) -> u16 {
        let base = self.fetch16(bus, hooks, self.pc);
        self.pc = self.pc.wrapping_add(2);
        let addr = base.wrapping_add(index as u16);
        if (base ^ addr) & 0xFF00 != 0 {
            self.fetch8(bus, hooks, (base & 0xFF00) | (addr & 0x00FF));
        }
        addr
    }

    /// Indexed absolute that always pays the re-read (stores and RMW).
    fn absolute_indexed_ec<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, index: u8) -> u16 {
        let base = self.fetch16(bus, hooks, self.pc);
        self.pc = self.pc.wrapping_add(2);
        let addr = base.wrapping_add(index as u16);
        self.fetch8(bus, hooks, (base & 0xFF00) | (addr & 0x00FF));
        addr
    }

    /// Resolve and read the operand.
    fn fetch_operand<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, mode: AddrMode) -> u8 {
        let addr = self.operand_addr(bus, hooks, mode);
        self.fetch8(bus, hooks, addr)
    }

    /*------------------------------ execution -----------------------------*/

    fn exec<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, kind: OpKind, mode: AddrMode) {
        use OpKind::*;
        match kind {
            Ora => {
                self.a |= self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.a);
            }
            And => {
                self.a &= self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.a);
            }
            Eor => {
                self.a ^= self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.a);
            }
            Adc => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.adc_value(m);
            }
            Sbc => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.adc_value(!m);
            }
            Cmp => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.compare(self.a, m);
            }
            Cpx => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.compare(self.x, m);
            }
            Cpy => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.compare(self.y, m);
            }
            Bit => {
                let m = self.fetch_operand(bus, hooks, mode);
                self.set_flag(FLAG_Z, self.a & m == 0);
                self.set_flag(FLAG_N, m & FLAG_N != 0);
                self.set_flag(FLAG_V, m & FLAG_V != 0);
            }

            Lda => {
                self.a = self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.a);
            }
            Ldx => {
                self.x = self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.x);
            }
            Ldy => {
                self.y = self.fetch_operand(bus, hooks, mode);
                self.set_zn(self.y);
            }
            Sta => {
                let addr = self.operand_addr(bus, hooks, mode);
                self.write8(bus, hooks, addr, self.a);
            }
            Stx => {
                let addr = self.operand_addr(bus, hooks, mode);
                self.write8(bus, hooks, addr, self.x);
            }
            Sty => {
                let addr = self.operand_addr(bus, hooks, mode);
                self.write8(bus, hooks, addr, self.y);
            }

            Asl => {
                self.rmw(bus, hooks, mode, shift_left);
            }
            Rol => {
                self.rmw(bus, hooks, mode, rotate_left);
            }
            Lsr => {
                self.rmw(bus, hooks, mode, shift_right);
            }
            Ror => {
                self.rmw(bus, hooks, mode, rotate_right);
            }
            Inc => {
                self.rmw(bus, hooks, mode, |_, v| v.wrapping_add(1));
            }
            Dec => {
                self.rmw(bus, hooks, mode, |_, v| v.wrapping_sub(1));
            }

            Tax => self.transfer(bus, hooks, |cpu| {
                cpu.x = cpu.a;
                cpu.set_zn(cpu.x);
            }),
            Txa => self.transfer(bus, hooks, |cpu| {
                cpu.a = cpu.x;
                cpu.set_zn(cpu.a);
            }),
            Tay => self.transfer(bus, hooks, |cpu| {
                cpu.y = cpu.a;
                cpu.set_zn(cpu.y);
            }),
            Tya => self.transfer(bus, hooks, |cpu| {
                cpu.a = cpu.y;
                cpu.set_zn(cpu.a);
            }),
            Tsx => self.transfer(bus, hooks, |cpu| {
                cpu.x = cpu.sp;
                cpu.set_zn(cpu.x);
            }),
            Txs => self.transfer(bus, hooks, |cpu| {
                cpu.sp = cpu.x;
            }),
            Inx => self.transfer(bus, hooks, |cpu| {
                cpu.x = cpu.x.wrapping_add(1);
                cpu.set_zn(cpu.x);
            }),
            Iny => self.transfer(bus, hooks, |cpu| {
                cpu.y = cpu.y.wrapping_add(1);
                cpu.set_zn(cpu.y);
            }),
            Dex => self.transfer(bus, hooks, |cpu| {
                cpu.x = cpu.x.wrapping_sub(1);
                cpu.set_zn(cpu.x);
            }),
            Dey => self.transfer(bus, hooks, |cpu| {
                cpu.y = cpu.y.wrapping_sub(1);
                cpu.set_zn(cpu.y);
            }),

            Clc => self.transfer(bus, hooks, |cpu| cpu.set_flag(FLAG_C, false)),
            Sec => self.transfer(bus, hooks, |cpu| cpu.set_flag(FLAG_C, true)),
            Cld => self.transfer(bus, hooks, |cpu| cpu.set_flag(FLAG_D, false)),
            Sed => self.transfer(bus, hooks, |cpu| cpu.set_flag(FLAG_D, true)),
            Clv => self.transfer(bus, hooks, |cpu| cpu.set_flag(FLAG_V, false)),
            Cli => self.transfer(bus, hooks, |cpu| cpu.schedule_i_update(false)),
            Sei => self.transfer(bus, hooks, |cpu| cpu.schedule_i_update(true)),

            Pha => {
                self.fetch8(bus, hooks, self.pc);
                self.stack_push(bus, hooks, self.a);
            }
            Php => {
                self.fetch8(bus, hooks, self.pc);
                self.stack_push(bus, hooks, self.p | FLAG_B | FLAG_U);
            }
            Pla => {
                self.fetch8(bus, hooks, self.pc);
                self.fetch8(bus, hooks, 0x0100 | self.sp as u16);
                self.a = self.stack_pop(bus, hooks);
                self.set_zn(self.a);
            }
            Plp => {
                self.fetch8(bus, hooks, self.pc);
                self.fetch8(bus, hooks, 0x0100 | self.sp as u16);
                let flags = self.stack_pop(bus, hooks);
                // B is masked out of the pulled byte, U stays set, and the I
                // update is deferred by one instruction.
                self.schedule_i_update(flags & FLAG_I != 0);
                let keep = FLAG_I | FLAG_B | FLAG_U;
                self.p = (self.p & keep) | (flags & !keep);
            }

            Jmp => {
                self.pc = self.operand_addr(bus, hooks, mode);
            }
            Jsr => {
                let lo = self.fetch8(bus, hooks, self.pc);
                self.fetch8(bus, hooks, 0x0100 | self.sp as u16);
                let ret = self.pc.wrapping_add(1);
                self.stack_push(bus, hooks, (ret >> 8) as u8);
                self.stack_push(bus, hooks, ret as u8);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.fetch8(bus, hooks, self.pc);
                self.pc = ((hi as u16) << 8) | lo as u16;
            }
            Rts => {
                self.fetch8(bus, hooks, self.pc);
                self.fetch8(bus, hooks, 0x0100 | self.sp as u16);
                let lo = self.stack_pop(bus, hooks) as u16;
                let hi = self.stack_pop(bus, hooks) as u16;
                let addr = lo | (hi << 8);
                self.fetch8(bus, hooks, addr);
                self.pc = addr.wrapping_add(1);
            }
            Brk => {
                self.fetch8(bus, hooks, self.pc);
                let ret = self.pc.wrapping_add(1);
                self.stack_push(bus, hooks, (ret >> 8) as u8);
                self.stack_push(bus, hooks, ret as u8);
                self.stack_push(bus, hooks, self.p | FLAG_B | FLAG_U);
                self.p |= FLAG_I;
                self.pc = self.fetch16(bus, hooks, 0xFFFE);
            }
            Rti => {
                self.fetch8(bus, hooks, self.pc);
                self.fetch8(bus, hooks, 0x0100 | self.sp as u16);
                let flags = self.stack_pop(bus, hooks);
                // B is masked out of the pulled byte; U stays set. Unlike
                // PLP, the I flag applies immediately.
                self.p = (self.p & (FLAG_B | FLAG_U)) | (flags & !(FLAG_B | FLAG_U));
                self.p &= !FLAG_B;
                let lo = self.stack_pop(bus, hooks) as u16;
                let hi = self.stack_pop(bus, hooks) as u16;
                self.pc = lo | (hi << 8);
            }

            Bpl => self.branch(bus, hooks, self.p & FLAG_N == 0),
            Bmi => self.branch(bus, hooks, self.p & FLAG_N != 0),
            Bvc => self.branch(bus, hooks, self.p & FLAG_V == 0),
            Bvs => self.branch(bus, hooks, self.p & FLAG_V != 0),
            Bcc => self.branch(bus, hooks, self.p & FLAG_C == 0),
            Bcs => self.branch(bus, hooks, self.p & FLAG_C != 0),
            Bne => self.branch(bus, hooks, self.p & FLAG_Z == 0),
            Beq => self.branch(bus, hooks, self.p & FLAG_Z != 0),

            Nop => {
                // Every NOP variant resolves its mode and performs the read,
                // so the unofficial forms keep their documented bus traffic.
                let addr = self.operand_addr(bus, hooks, mode);
                self.fetch8(bus, hooks, addr);
            }

            Lax => {
                let v = self.fetch_operand(bus, hooks, mode);
                self.x = v;
                self.a = v;
                self.set_zn(v);
            }
            Sax => {
                let addr = self.operand_addr(bus, hooks, mode);
                self.write8(bus, hooks, addr, self.a & self.x);
            }
            Dcp => {
                let res = self.rmw(bus, hooks, mode, |_, v| v.wrapping_sub(1));
                self.compare(self.a, res);
            }
            Isb => {
                let res = self.rmw(bus, hooks, mode, |_, v| v.wrapping_add(1));
                self.adc_value(!res);
            }
            Slo => {
                let res = self.rmw(bus, hooks, mode, shift_left);
                self.a |= res;
                self.set_zn(self.a);
            }
            Rla => {
                let res = self.rmw(bus, hooks, mode, rotate_left);
                self.a &= res;
                self.set_zn(self.a);
            }
            Sre => {
                let res = self.rmw(bus, hooks, mode, shift_right);
                self.a ^= res;
                self.set_zn(self.a);
            }
            Rra => {
                let res = self.rmw(bus, hooks, mode, rotate_right);
                self.adc_value(res);
            }

            Ill => unreachable!("illegal opcodes are rejected before dispatch"),
        }
    }

    /// Shared ADC core; SBC and ISB pass the operand's complement.
    fn adc_value(&mut self, m: u8) {
        let res = self.a as u16 + m as u16 + (self.p & FLAG_C) as u16;
        let trunc = res as u8;
        self.set_flag(FLAG_C, res > 0xFF);
        self.set_flag(FLAG_V, (self.a ^ trunc) & (m ^ trunc) & 0x80 != 0);
        self.a = trunc;
        self.set_zn(trunc);
    }

    fn compare(&mut self, reg: u8, m: u8) {
        let res = reg.wrapping_sub(m);
        self.set_flag(FLAG_C, reg >= m);
        self.set_flag(FLAG_Z, reg == m);
        self.set_flag(FLAG_N, res & 0x80 != 0);
    }

    /// Read-modify-write: read, dummy write of the old value, write of the
    /// new. In implied mode the accumulator is the operand and the dummy
    /// fetch hits the next instruction byte. Returns the written value.
    fn rmw<H: Hooks>(
        &mut self,
        bus: &mut Bus,
        hooks: &mut H,
        mode: AddrMode,
        f: fn(&mut Cpu, u8) -> u8,
    ) -> u8 {
        let res = if mode == AddrMode::Imp {
            self.fetch8(bus, hooks, self.pc);
            let res = f(self, self.a);
            self.a = res;
            res
        } else {
            let addr = self.operand_addr(bus, hooks, mode);
            let val = self.fetch8(bus, hooks, addr);
            self.write8(bus, hooks, addr, val);
            let res = f(self, val);
            self.write8(bus, hooks, addr, res);
            res
        };
        self.set_zn(res);
        res
    }

    /// Implied-mode register/flag operation: dummy fetch of the next byte,
    /// then the register transfer.
    fn transfer<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, f: fn(&mut Cpu)) {
        self.fetch8(bus, hooks, self.pc);
        f(self);
    }

    /// Relative branch: +1 cycle when taken, +1 more when the target is on a
    /// different page; the page-cross dummy read goes to the un-carried
    /// address.
    fn branch<H: Hooks>(&mut self, bus: &mut Bus, hooks: &mut H, taken: bool) {
        let offset = {
            let addr = self.operand_addr(bus, hooks, AddrMode::Rel);
            self.fetch8(bus, hooks, addr)
        };
        if taken {
            self.fetch8(bus, hooks, self.pc);
            let page = self.pc & 0xFF00;
            self.pc = self.pc.wrapping_add(offset as i8 as u16);
            if page != self.pc & 0xFF00 {
                self.fetch8(bus, hooks, page | (self.pc & 0x00FF));
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

fn shift_left(cpu: &mut Cpu, v: u8) -> u8 {
    cpu.set_flag(FLAG_C, v & 0x80 != 0);
    v << 1
}

fn shift_right(cpu: &mut Cpu, v: u8) -> u8 {
    cpu.set_flag(FLAG_C, v & 0x01 != 0);
    v >> 1
}

fn rotate_left(cpu: &mut Cpu, v: u8) -> u8 {
    let carry_in = cpu.p & FLAG_C;
    cpu.set_flag(FLAG_C, v & 0x80 != 0);
    (v << 1) | carry_in
}

fn rotate_right(cpu: &mut Cpu, v: u8) -> u8 {
    let carry_in = (cpu.p & FLAG_C) << 7;
    cpu.set_flag(FLAG_C, v & 0x01 != 0);
    (v >> 1) | carry_in
}
