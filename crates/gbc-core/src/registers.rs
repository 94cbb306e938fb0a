// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

/// A 16-bit register that can also be addressed as two 8-bit halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterPair(u16);

impl RegisterPair {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn full(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn high(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn low(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub fn set(&mut self, value: u16) {
        self.0 = value;
    }

    #[inline]
    pub fn set_high(&mut self, value: u8) {
        self.0 = ((value as u16) << 8) | (self.0 & 0x00FF);
    }

    #[inline]
    pub fn set_low(&mut self, value: u8) {
        self.0 = (self.0 & 0xFF00) | value as u16;
    }
}

/// 8-bit register names as encoded in opcode bits (6 = `(HL)` is not a register).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg8 {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl Reg8 {
    pub const fn name(self) -> &'static str {
        match self {
            Reg8::A => "A",
            Reg8::F => "F",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg16 {
    AF,
    BC,
    DE,
    HL,
    SP,
    PC,
}

impl Reg16 {
    pub const fn name(self) -> &'static str {
        match self {
            Reg16::AF => "AF",
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::PC => "PC",
        }
    }
}

/// AF/BC/DE/HL pairs plus SP and PC.
///
/// The low nibble of F is hard-wired to zero; every path that stores F masks
/// it, so `f() & 0x0F == 0` always holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    af: RegisterPair,
    pub bc: RegisterPair,
    pub de: RegisterPair,
    pub hl: RegisterPair,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    #[inline]
    pub fn a(&self) -> u8 {
        self.af.high()
    }

    #[inline]
    pub fn set_a(&mut self, value: u8) {
        self.af.set_high(value);
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.af.low()
    }

    #[inline]
    pub fn set_f(&mut self, value: u8) {
        self.af.set_low(value & 0xF0);
    }

    #[inline]
    pub fn af(&self) -> u16 {
        self.af.full()
    }

    #[inline]
    pub fn set_af(&mut self, value: u16) {
        self.af.set(value & 0xFFF0);
    }

    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.f() & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        let f = if on { self.f() | mask } else { self.f() & !mask };
        self.set_f(f);
    }

    pub fn read8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.af.high(),
            Reg8::F => self.af.low(),
            Reg8::B => self.bc.high(),
            Reg8::C => self.bc.low(),
            Reg8::D => self.de.high(),
            Reg8::E => self.de.low(),
            Reg8::H => self.hl.high(),
            Reg8::L => self.hl.low(),
        }
    }

    pub fn write8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.af.set_high(value),
            Reg8::F => self.set_f(value),
            Reg8::B => self.bc.set_high(value),
            Reg8::C => self.bc.set_low(value),
            Reg8::D => self.de.set_high(value),
            Reg8::E => self.de.set_low(value),
            Reg8::H => self.hl.set_high(value),
            Reg8::L => self.hl.set_low(value),
        }
    }

    pub fn read16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AF => self.af.full(),
            Reg16::BC => self.bc.full(),
            Reg16::DE => self.de.full(),
            Reg16::HL => self.hl.full(),
            Reg16::SP => self.sp,
            Reg16::PC => self.pc,
        }
    }

    pub fn write16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::AF => self.set_af(value),
            Reg16::BC => self.bc.set(value),
            Reg16::DE => self.de.set(value),
            Reg16::HL => self.hl.set(value),
            Reg16::SP => self.sp = value,
            Reg16::PC => self.pc = value,
        }
    }
}
