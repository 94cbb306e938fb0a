//! Opcode descriptors for the 256 base and 256 CB-prefixed instructions.
//!
//! The table is pure data: every slot carries its encoded size, base and taken
//! cycle counts (in clock cycles), two operand descriptors and an [`Action`]
//! tag that the CPU dispatches with a single `match`. It is built on first use
//! from the declarative row list below plus the regular opcode grids
//! (`LD r,r'`, `ALU A,r`, the CB block).

use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::alu::Shift;
use crate::registers::{Reg8, Reg16};

/// Branch condition encoded in JR/JP/CALL/RET.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    C,
}

impl Cond {
    pub const fn name(self) -> &'static str {
        match self {
            Cond::NZ => "NZ",
            Cond::Z => "Z",
            Cond::NC => "NC",
            Cond::C => "C",
        }
    }
}

/// Where an instruction reads or writes a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Implied,
    R8(Reg8),
    R16(Reg16),
    /// `(rr)`
    Ind(Reg16),
    /// `(HL+)`
    HlInc,
    /// `(HL-)`
    HlDec,
    Imm8,
    Imm16,
    /// Signed 8-bit displacement.
    Simm8,
    /// `(a16)`
    Abs16,
    /// `(FF00+a8)`
    HighImm8,
    /// `(FF00+C)`
    HighC,
    /// `SP+e8`
    SpOffset,
    Cond(Cond),
    Vector(u8),
    Bit(u8),
}

impl Operand {
    /// Number of immediate bytes this operand consumes from the stream.
    pub const fn imm_len(self) -> u8 {
        match self {
            Operand::Imm8 | Operand::Simm8 | Operand::HighImm8 | Operand::SpOffset => 1,
            Operand::Imm16 | Operand::Abs16 => 2,
            _ => 0,
        }
    }

    /// True when the operand goes through the bus rather than a register.
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            Operand::Ind(_)
                | Operand::HlInc
                | Operand::HlDec
                | Operand::Abs16
                | Operand::HighImm8
                | Operand::HighC
        )
    }

    fn render(self, imm: u16, out: &mut String) {
        let _ = match self {
            Operand::Implied => Ok(()),
            Operand::R8(r) => out.write_str(r.name()),
            Operand::R16(r) => out.write_str(r.name()),
            Operand::Ind(r) => write!(out, "({})", r.name()),
            Operand::HlInc => out.write_str("(HL+)"),
            Operand::HlDec => out.write_str("(HL-)"),
            Operand::Imm8 => write!(out, "${:02X}", imm as u8),
            Operand::Imm16 => write!(out, "${imm:04X}"),
            Operand::Simm8 => write!(out, "{}", imm as u8 as i8),
            Operand::Abs16 => write!(out, "(${imm:04X})"),
            Operand::HighImm8 => write!(out, "($FF00+${:02X})", imm as u8),
            Operand::HighC => out.write_str("($FF00+C)"),
            Operand::SpOffset => write!(out, "SP{:+}", imm as u8 as i8),
            Operand::Cond(c) => out.write_str(c.name()),
            Operand::Vector(v) => write!(out, "${v:02X}"),
            Operand::Bit(b) => write!(out, "{b}"),
        };
    }
}

/// Semantic tag executed by the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Nop,
    Ld8,
    Ld16,
    LdHlSp,
    Push,
    Pop,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Inc8,
    Dec8,
    Inc16,
    Dec16,
    AddHl,
    AddSp,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Rlca,
    Rrca,
    Rla,
    Rra,
    Jr,
    Jp,
    Call,
    Ret,
    Reti,
    Rst,
    Di,
    Ei,
    Halt,
    Stop,
    /// Placeholder in the base table for 0xCB; the CPU switches tables.
    Prefix,
    /// Unused opcode slot: logs and behaves as a 4-cycle NOP.
    Illegal,
    Shift(Shift),
    Bit,
    Res,
    Set,
}

impl Action {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Action::Nop => "NOP",
            Action::Ld8 | Action::Ld16 | Action::LdHlSp => "LD",
            Action::Push => "PUSH",
            Action::Pop => "POP",
            Action::Add | Action::AddHl | Action::AddSp => "ADD",
            Action::Adc => "ADC",
            Action::Sub => "SUB",
            Action::Sbc => "SBC",
            Action::And => "AND",
            Action::Xor => "XOR",
            Action::Or => "OR",
            Action::Cp => "CP",
            Action::Inc8 | Action::Inc16 => "INC",
            Action::Dec8 | Action::Dec16 => "DEC",
            Action::Daa => "DAA",
            Action::Cpl => "CPL",
            Action::Scf => "SCF",
            Action::Ccf => "CCF",
            Action::Rlca => "RLCA",
            Action::Rrca => "RRCA",
            Action::Rla => "RLA",
            Action::Rra => "RRA",
            Action::Jr => "JR",
            Action::Jp => "JP",
            Action::Call => "CALL",
            Action::Ret => "RET",
            Action::Reti => "RETI",
            Action::Rst => "RST",
            Action::Di => "DI",
            Action::Ei => "EI",
            Action::Halt => "HALT",
            Action::Stop => "STOP",
            Action::Prefix => "PREFIX",
            Action::Illegal => "ILLEGAL",
            Action::Shift(kind) => kind.mnemonic(),
            Action::Bit => "BIT",
            Action::Res => "RES",
            Action::Set => "SET",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub prefixed: bool,
    /// Encoded length including the opcode (and the 0xCB prefix).
    pub size: u8,
    /// Clock cycles when a condition is not taken (or always, if unconditional).
    pub cycles: u8,
    pub cycles_taken: u8,
    pub op1: Operand,
    pub op2: Operand,
    pub action: Action,
    pub mnemonic: &'static str,
}

impl Instruction {
    fn new(opcode: u8, prefixed: bool, row: Row) -> Self {
        let size = 1 + prefixed as u8 + row.op1.imm_len() + row.op2.imm_len();
        Self {
            opcode,
            prefixed,
            size,
            cycles: row.cycles,
            cycles_taken: if row.taken == 0 { row.cycles } else { row.taken },
            op1: row.op1,
            op2: row.op2,
            action: row.action,
            mnemonic: row.action.mnemonic(),
        }
    }

    /// Number of immediate bytes that follow the opcode.
    pub fn imm_len(&self) -> u8 {
        self.op1.imm_len() + self.op2.imm_len()
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.op1, Operand::Cond(_))
    }

    /// Assembly text for this instruction with `imm` as its immediate value.
    pub fn render(&self, imm: u16) -> String {
        let mut out = String::from(self.mnemonic);
        if self.op1 != Operand::Implied {
            out.push(' ');
            self.op1.render(imm, &mut out);
        }
        if self.op2 != Operand::Implied {
            out.push(',');
            self.op2.render(imm, &mut out);
        }
        out
    }
}

#[derive(Clone, Copy)]
struct Row {
    action: Action,
    op1: Operand,
    op2: Operand,
    cycles: u8,
    /// 0 for unconditional instructions.
    taken: u8,
}

const fn row(action: Action, op1: Operand, op2: Operand, cycles: u8) -> Row {
    Row {
        action,
        op1,
        op2,
        cycles,
        taken: 0,
    }
}

const fn branch(action: Action, op1: Operand, op2: Operand, cycles: u8, taken: u8) -> Row {
    Row {
        action,
        op1,
        op2,
        cycles,
        taken,
    }
}

const NONE: Operand = Operand::Implied;
const A: Operand = Operand::R8(Reg8::A);
const B: Operand = Operand::R8(Reg8::B);
const C: Operand = Operand::R8(Reg8::C);
const D: Operand = Operand::R8(Reg8::D);
const E: Operand = Operand::R8(Reg8::E);
const H: Operand = Operand::R8(Reg8::H);
const L: Operand = Operand::R8(Reg8::L);
const AF: Operand = Operand::R16(Reg16::AF);
const BC: Operand = Operand::R16(Reg16::BC);
const DE: Operand = Operand::R16(Reg16::DE);
const HL: Operand = Operand::R16(Reg16::HL);
const SP: Operand = Operand::R16(Reg16::SP);
const IND_BC: Operand = Operand::Ind(Reg16::BC);
const IND_DE: Operand = Operand::Ind(Reg16::DE);
const IND_HL: Operand = Operand::Ind(Reg16::HL);
const D8: Operand = Operand::Imm8;
const D16: Operand = Operand::Imm16;
const E8: Operand = Operand::Simm8;
const A16: Operand = Operand::Abs16;
const CC_NZ: Operand = Operand::Cond(Cond::NZ);
const CC_Z: Operand = Operand::Cond(Cond::Z);
const CC_NC: Operand = Operand::Cond(Cond::NC);
const CC_C: Operand = Operand::Cond(Cond::C);

/// Opcode order of the 3-bit register field: B, C, D, E, H, L, (HL), A.
const R8_FIELD: [Operand; 8] = [B, C, D, E, H, L, IND_HL, A];

const ILLEGAL_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

/// Base opcodes outside the `LD r,r'` and `ALU A,r` grids.
#[rustfmt::skip]
const BASE_ROWS: &[(u8, Row)] = &[
    (0x00, row(Action::Nop, NONE, NONE, 4)),
    (0x01, row(Action::Ld16, BC, D16, 12)),
    (0x02, row(Action::Ld8, IND_BC, A, 8)),
    (0x03, row(Action::Inc16, BC, NONE, 8)),
    (0x04, row(Action::Inc8, B, NONE, 4)),
    (0x05, row(Action::Dec8, B, NONE, 4)),
    (0x06, row(Action::Ld8, B, D8, 8)),
    (0x07, row(Action::Rlca, NONE, NONE, 4)),
    (0x08, row(Action::Ld16, A16, SP, 20)),
    (0x09, row(Action::AddHl, HL, BC, 8)),
    (0x0A, row(Action::Ld8, A, IND_BC, 8)),
    (0x0B, row(Action::Dec16, BC, NONE, 8)),
    (0x0C, row(Action::Inc8, C, NONE, 4)),
    (0x0D, row(Action::Dec8, C, NONE, 4)),
    (0x0E, row(Action::Ld8, C, D8, 8)),
    (0x0F, row(Action::Rrca, NONE, NONE, 4)),

    (0x10, row(Action::Stop, D8, NONE, 4)),
    (0x11, row(Action::Ld16, DE, D16, 12)),
    (0x12, row(Action::Ld8, IND_DE, A, 8)),
    (0x13, row(Action::Inc16, DE, NONE, 8)),
    (0x14, row(Action::Inc8, D, NONE, 4)),
    (0x15, row(Action::Dec8, D, NONE, 4)),
    (0x16, row(Action::Ld8, D, D8, 8)),
    (0x17, row(Action::Rla, NONE, NONE, 4)),
    (0x18, row(Action::Jr, E8, NONE, 12)),
    (0x19, row(Action::AddHl, HL, DE, 8)),
    (0x1A, row(Action::Ld8, A, IND_DE, 8)),
    (0x1B, row(Action::Dec16, DE, NONE, 8)),
    (0x1C, row(Action::Inc8, E, NONE, 4)),
    (0x1D, row(Action::Dec8, E, NONE, 4)),
    (0x1E, row(Action::Ld8, E, D8, 8)),
    (0x1F, row(Action::Rra, NONE, NONE, 4)),

    (0x20, branch(Action::Jr, CC_NZ, E8, 8, 12)),
    (0x21, row(Action::Ld16, HL, D16, 12)),
    (0x22, row(Action::Ld8, Operand::HlInc, A, 8)),
    (0x23, row(Action::Inc16, HL, NONE, 8)),
    (0x24, row(Action::Inc8, H, NONE, 4)),
    (0x25, row(Action::Dec8, H, NONE, 4)),
    (0x26, row(Action::Ld8, H, D8, 8)),
    (0x27, row(Action::Daa, NONE, NONE, 4)),
    (0x28, branch(Action::Jr, CC_Z, E8, 8, 12)),
    (0x29, row(Action::AddHl, HL, HL, 8)),
    (0x2A, row(Action::Ld8, A, Operand::HlInc, 8)),
    (0x2B, row(Action::Dec16, HL, NONE, 8)),
    (0x2C, row(Action::Inc8, L, NONE, 4)),
    (0x2D, row(Action::Dec8, L, NONE, 4)),
    (0x2E, row(Action::Ld8, L, D8, 8)),
    (0x2F, row(Action::Cpl, NONE, NONE, 4)),

    (0x30, branch(Action::Jr, CC_NC, E8, 8, 12)),
    (0x31, row(Action::Ld16, SP, D16, 12)),
    (0x32, row(Action::Ld8, Operand::HlDec, A, 8)),
    (0x33, row(Action::Inc16, SP, NONE, 8)),
    (0x34, row(Action::Inc8, IND_HL, NONE, 12)),
    (0x35, row(Action::Dec8, IND_HL, NONE, 12)),
    (0x36, row(Action::Ld8, IND_HL, D8, 12)),
    (0x37, row(Action::Scf, NONE, NONE, 4)),
    (0x38, branch(Action::Jr, CC_C, E8, 8, 12)),
    (0x39, row(Action::AddHl, HL, SP, 8)),
    (0x3A, row(Action::Ld8, A, Operand::HlDec, 8)),
    (0x3B, row(Action::Dec16, SP, NONE, 8)),
    (0x3C, row(Action::Inc8, A, NONE, 4)),
    (0x3D, row(Action::Dec8, A, NONE, 4)),
    (0x3E, row(Action::Ld8, A, D8, 8)),
    (0x3F, row(Action::Ccf, NONE, NONE, 4)),

    (0x76, row(Action::Halt, NONE, NONE, 4)),

    (0xC0, branch(Action::Ret, CC_NZ, NONE, 8, 20)),
    (0xC1, row(Action::Pop, BC, NONE, 12)),
    (0xC2, branch(Action::Jp, CC_NZ, D16, 12, 16)),
    (0xC3, row(Action::Jp, D16, NONE, 16)),
    (0xC4, branch(Action::Call, CC_NZ, D16, 12, 24)),
    (0xC5, row(Action::Push, BC, NONE, 16)),
    (0xC6, row(Action::Add, A, D8, 8)),
    (0xC7, row(Action::Rst, Operand::Vector(0x00), NONE, 16)),
    (0xC8, branch(Action::Ret, CC_Z, NONE, 8, 20)),
    (0xC9, row(Action::Ret, NONE, NONE, 16)),
    (0xCA, branch(Action::Jp, CC_Z, D16, 12, 16)),
    (0xCB, row(Action::Prefix, NONE, NONE, 4)),
    (0xCC, branch(Action::Call, CC_Z, D16, 12, 24)),
    (0xCD, row(Action::Call, D16, NONE, 24)),
    (0xCE, row(Action::Adc, A, D8, 8)),
    (0xCF, row(Action::Rst, Operand::Vector(0x08), NONE, 16)),

    (0xD0, branch(Action::Ret, CC_NC, NONE, 8, 20)),
    (0xD1, row(Action::Pop, DE, NONE, 12)),
    (0xD2, branch(Action::Jp, CC_NC, D16, 12, 16)),
    (0xD4, branch(Action::Call, CC_NC, D16, 12, 24)),
    (0xD5, row(Action::Push, DE, NONE, 16)),
    (0xD6, row(Action::Sub, A, D8, 8)),
    (0xD7, row(Action::Rst, Operand::Vector(0x10), NONE, 16)),
    (0xD8, branch(Action::Ret, CC_C, NONE, 8, 20)),
    (0xD9, row(Action::Reti, NONE, NONE, 16)),
    (0xDA, branch(Action::Jp, CC_C, D16, 12, 16)),
    (0xDC, branch(Action::Call, CC_C, D16, 12, 24)),
    (0xDE, row(Action::Sbc, A, D8, 8)),
    (0xDF, row(Action::Rst, Operand::Vector(0x18), NONE, 16)),

    (0xE0, row(Action::Ld8, Operand::HighImm8, A, 12)),
    (0xE1, row(Action::Pop, HL, NONE, 12)),
    (0xE2, row(Action::Ld8, Operand::HighC, A, 8)),
    (0xE5, row(Action::Push, HL, NONE, 16)),
    (0xE6, row(Action::And, A, D8, 8)),
    (0xE7, row(Action::Rst, Operand::Vector(0x20), NONE, 16)),
    (0xE8, row(Action::AddSp, SP, E8, 16)),
    (0xE9, row(Action::Jp, HL, NONE, 4)),
    (0xEA, row(Action::Ld8, A16, A, 16)),
    (0xEE, row(Action::Xor, A, D8, 8)),
    (0xEF, row(Action::Rst, Operand::Vector(0x28), NONE, 16)),

    (0xF0, row(Action::Ld8, A, Operand::HighImm8, 12)),
    (0xF1, row(Action::Pop, AF, NONE, 12)),
    (0xF2, row(Action::Ld8, A, Operand::HighC, 8)),
    (0xF3, row(Action::Di, NONE, NONE, 4)),
    (0xF5, row(Action::Push, AF, NONE, 16)),
    (0xF6, row(Action::Or, A, D8, 8)),
    (0xF7, row(Action::Rst, Operand::Vector(0x30), NONE, 16)),
    (0xF8, row(Action::LdHlSp, HL, Operand::SpOffset, 12)),
    (0xF9, row(Action::Ld16, SP, HL, 8)),
    (0xFA, row(Action::Ld8, A, A16, 16)),
    (0xFB, row(Action::Ei, NONE, NONE, 4)),
    (0xFE, row(Action::Cp, A, D8, 8)),
    (0xFF, row(Action::Rst, Operand::Vector(0x38), NONE, 16)),
];

const ALU_ACTIONS: [Action; 8] = [
    Action::Add,
    Action::Adc,
    Action::Sub,
    Action::Sbc,
    Action::And,
    Action::Xor,
    Action::Or,
    Action::Cp,
];

const SHIFTS: [Shift; 8] = [
    Shift::Rlc,
    Shift::Rrc,
    Shift::Rl,
    Shift::Rr,
    Shift::Sla,
    Shift::Sra,
    Shift::Swap,
    Shift::Srl,
];

fn build() -> Vec<Instruction> {
    let illegal = row(Action::Illegal, NONE, NONE, 4);
    let mut table: Vec<Instruction> = (0..=255u8)
        .map(|op| Instruction::new(op, false, illegal))
        .collect();

    // LD r,r' (0x40-0x7F, 0x76 is HALT)
    for op in 0x40..=0x7Fu8 {
        if op == 0x76 {
            continue;
        }
        let dst = R8_FIELD[((op >> 3) & 7) as usize];
        let src = R8_FIELD[(op & 7) as usize];
        let cycles = if dst.is_memory() || src.is_memory() { 8 } else { 4 };
        table[op as usize] = Instruction::new(op, false, row(Action::Ld8, dst, src, cycles));
    }

    // ALU A,r (0x80-0xBF)
    for op in 0x80..=0xBFu8 {
        let action = ALU_ACTIONS[((op >> 3) & 7) as usize];
        let src = R8_FIELD[(op & 7) as usize];
        let cycles = if src.is_memory() { 8 } else { 4 };
        table[op as usize] = Instruction::new(op, false, row(action, A, src, cycles));
    }

    for &(op, r) in BASE_ROWS {
        table[op as usize] = Instruction::new(op, false, r);
    }

    for op in 0..=0xFFu8 {
        let target = R8_FIELD[(op & 7) as usize];
        let on_hl = target.is_memory();
        let n = (op >> 3) & 7;
        let r = match op >> 6 {
            0 => row(Action::Shift(SHIFTS[n as usize]), target, NONE, if on_hl { 16 } else { 8 }),
            1 => row(Action::Bit, Operand::Bit(n), target, if on_hl { 12 } else { 8 }),
            2 => row(Action::Res, Operand::Bit(n), target, if on_hl { 16 } else { 8 }),
            _ => row(Action::Set, Operand::Bit(n), target, if on_hl { 16 } else { 8 }),
        };
        table.push(Instruction::new(op, true, r));
    }

    table
}

fn table() -> &'static [Instruction] {
    static TABLE: OnceLock<Vec<Instruction>> = OnceLock::new();
    TABLE.get_or_init(build)
}

/// Base-table descriptor for `opcode`.
#[inline]
pub fn lookup(opcode: u8) -> &'static Instruction {
    &table()[opcode as usize]
}

/// CB-table descriptor for the byte following a 0xCB prefix.
#[inline]
pub fn lookup_cb(opcode: u8) -> &'static Instruction {
    &table()[0x100 + opcode as usize]
}

/// All 512 descriptors, base table first.
pub fn all() -> &'static [Instruction] {
    table()
}

pub fn is_illegal(opcode: u8) -> bool {
    ILLEGAL_OPCODES.contains(&opcode)
}
