//! Every function returns the result together with the complete new F value.
//! Half-carry is always taken from the operands before the operation.

use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

#[inline]
pub const fn flags(z: bool, n: bool, h: bool, c: bool) -> u8 {
    (if z { FLAG_Z } else { 0 })
        | (if n { FLAG_N } else { 0 })
        | (if h { FLAG_H } else { 0 })
        | (if c { FLAG_C } else { 0 })
}

/// ADD / ADC.
pub fn add8(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = carry_in as u16;
    let sum = a as u16 + b as u16 + c;
    let res = sum as u8;
    let half = (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F;
    (res, flags(res == 0, false, half, sum > 0xFF))
}

/// SUB / SBC / CP.
pub fn sub8(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = carry_in as u16;
    let res = (a as u16).wrapping_sub(b as u16).wrapping_sub(c) as u8;
    let half = ((a & 0x0F) as u16) < (b & 0x0F) as u16 + c;
    let borrow = (a as u16) < b as u16 + c;
    (res, flags(res == 0, true, half, borrow))
}

pub fn and8(a: u8, b: u8) -> (u8, u8) {
    let res = a & b;
    (res, flags(res == 0, false, true, false))
}

pub fn xor8(a: u8, b: u8) -> (u8, u8) {
    let res = a ^ b;
    (res, flags(res == 0, false, false, false))
}

pub fn or8(a: u8, b: u8) -> (u8, u8) {
    let res = a | b;
    (res, flags(res == 0, false, false, false))
}

/// INC r8 leaves C untouched.
pub fn inc8(v: u8, f: u8) -> (u8, u8) {
    let res = v.wrapping_add(1);
    (res, (f & FLAG_C) | flags(res == 0, false, v & 0x0F == 0x0F, false))
}

/// DEC r8 leaves C untouched.
pub fn dec8(v: u8, f: u8) -> (u8, u8) {
    let res = v.wrapping_sub(1);
    (res, (f & FLAG_C) | flags(res == 0, true, v & 0x0F == 0, false))
}

/// ADD HL,r16: Z preserved, H from bit 11, C from bit 15.
pub fn add16(hl: u16, rr: u16, f: u8) -> (u16, u8) {
    let res = hl.wrapping_add(rr);
    let half = (hl & 0x0FFF) + (rr & 0x0FFF) > 0x0FFF;
    let carry = hl as u32 + rr as u32 > 0xFFFF;
    (res, (f & FLAG_Z) | flags(false, false, half, carry))
}

/// ADD SP,i8 and LD HL,SP+i8. H and C come from the unsigned low byte of SP
/// plus the immediate viewed as an unsigned byte.
pub fn add_sp(sp: u16, offset: i8) -> (u16, u8) {
    let imm = offset as u8;
    let res = sp.wrapping_add(offset as i16 as u16);
    let half = (sp & 0x000F) + (imm & 0x0F) as u16 > 0x000F;
    let carry = (sp & 0x00FF) + imm as u16 > 0x00FF;
    (res, flags(false, false, half, carry))
}

pub fn daa(a: u8, f: u8) -> (u8, u8) {
    let subtract = f & FLAG_N != 0;
    let mut correction = 0u8;
    let mut carry = f & FLAG_C != 0;
    if f & FLAG_H != 0 || (!subtract && (a & 0x0F) > 9) {
        correction |= 0x06;
    }
    if carry || (!subtract && a > 0x99) {
        correction |= 0x60;
        carry = true;
    }
    let res = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    (res, flags(res == 0, subtract, false, carry))
}

/// CB-prefixed shift/rotate family. Returns result and flags with Z from
/// the result and C from the bit shifted out.
pub fn shift(kind: Shift, v: u8, f: u8) -> (u8, u8) {
    let carry_in = f & FLAG_C != 0;
    let (res, carry) = match kind {
        Shift::Rlc => (v.rotate_left(1), v & 0x80 != 0),
        Shift::Rrc => (v.rotate_right(1), v & 0x01 != 0),
        Shift::Rl => ((v << 1) | carry_in as u8, v & 0x80 != 0),
        Shift::Rr => ((v >> 1) | ((carry_in as u8) << 7), v & 0x01 != 0),
        Shift::Sla => (v << 1, v & 0x80 != 0),
        Shift::Sra => ((v >> 1) | (v & 0x80), v & 0x01 != 0),
        Shift::Swap => (v.rotate_left(4), false),
        Shift::Srl => (v >> 1, v & 0x01 != 0),
    };
    (res, flags(res == 0, false, false, carry))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shift {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl Shift {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Shift::Rlc => "RLC",
            Shift::Rrc => "RRC",
            Shift::Rl => "RL",
            Shift::Rr => "RR",
            Shift::Sla => "SLA",
            Shift::Sra => "SRA",
            Shift::Swap => "SWAP",
            Shift::Srl => "SRL",
        }
    }
}

/// BIT n: Z set when the bit is clear, H set, C preserved.
pub fn bit(n: u8, v: u8, f: u8) -> u8 {
    (f & FLAG_C) | flags(v & (1 << n) == 0, false, true, false)
}
