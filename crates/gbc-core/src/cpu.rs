use crate::alu::{self, Shift};
use crate::instructions::{self, Action, Cond, Instruction, Operand};
use crate::interrupts::{ExecState, Interrupt};
use crate::mmu::Mmu;
use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Registers};

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

const CGB_BOOT_A: u8 = 0x11;
const CGB_BOOT_F: u8 = 0x80;
const CGB_BOOT_B: u8 = 0x00;
const CGB_BOOT_C: u8 = 0x00;
const CGB_BOOT_D: u8 = 0xFF;
const CGB_BOOT_E: u8 = 0x56;
const CGB_BOOT_H: u8 = 0x00;
const CGB_BOOT_L: u8 = 0x0D;

const CYCLES_PER_M_CYCLE: u32 = 4;
/// Cost of one HALT/STOP idle step.
const IDLE_CYCLES: u32 = 4;
/// Interrupt dispatch: 5 M-cycles.
const DISPATCH_CYCLES: u32 = 20;

pub struct Cpu {
    pub regs: Registers,
    /// Clock cycles executed since construction.
    pub cycles: u64,
}

impl Cpu {
    /// CPU in the CGB post-boot state, ready to run from the cartridge entry
    /// point.
    pub fn new() -> Self {
        let mut regs = Registers::default();
        regs.set_a(CGB_BOOT_A);
        regs.set_f(CGB_BOOT_F);
        regs.bc.set_high(CGB_BOOT_B);
        regs.bc.set_low(CGB_BOOT_C);
        regs.de.set_high(CGB_BOOT_D);
        regs.de.set_low(CGB_BOOT_E);
        regs.hl.set_high(CGB_BOOT_H);
        regs.hl.set_low(CGB_BOOT_L);
        regs.sp = BOOT_SP;
        regs.pc = BOOT_PC;
        Self { regs, cycles: 0 }
    }

    /// Zeroed registers with PC at 0x0000, for running a boot ROM.
    pub fn new_power_on() -> Self {
        Self {
            regs: Registers::default(),
            cycles: 0,
        }
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.regs.af(),
            self.regs.bc.full(),
            self.regs.de.full(),
            self.regs.hl.full(),
            self.regs.pc,
            self.regs.sp,
            self.cycles
        )
    }

    /// Run one instruction, or one idle step while halted or stopped, and
    /// return the clock cycles it took including interrupt dispatch and any
    /// VRAM DMA stall.
    pub fn step(&mut self, mmu: &mut Mmu) -> u32 {
        let cycles = match mmu.interrupts().state() {
            ExecState::Halted => self.step_halted(mmu),
            ExecState::Stopped => {
                if mmu.interrupts().is_requested(Interrupt::Joypad) {
                    mmu.interrupts_mut().set_state(ExecState::Running);
                }
                IDLE_CYCLES
            }
            ExecState::Running | ExecState::HaltBug => self.step_instruction(mmu),
        };
        let cycles = cycles + mmu.take_dma_stall() * CYCLES_PER_M_CYCLE;
        self.cycles += cycles as u64;
        cycles
    }

    fn step_halted(&mut self, mmu: &mut Mmu) -> u32 {
        if mmu.interrupts().pending() == 0 {
            return IDLE_CYCLES;
        }
        mmu.interrupts_mut().set_state(ExecState::Running);
        IDLE_CYCLES + self.service_interrupt(mmu)
    }

    fn step_instruction(&mut self, mmu: &mut Mmu) -> u32 {
        let at = self.regs.pc;
        let mut pc = at;
        let opcode = mmu.read_byte(pc);
        if mmu.interrupts().state() == ExecState::HaltBug {
            // The byte after HALT is fetched twice.
            mmu.interrupts_mut().set_state(ExecState::Running);
        } else {
            pc = pc.wrapping_add(1);
        }

        let ins = if opcode == 0xCB {
            let sub = mmu.read_byte(pc);
            pc = pc.wrapping_add(1);
            instructions::lookup_cb(sub)
        } else {
            instructions::lookup(opcode)
        };

        let imm = match ins.imm_len() {
            0 => 0,
            1 => mmu.read_byte(pc) as u16,
            _ => mmu.read_word(pc),
        };
        self.regs.pc = pc.wrapping_add(ins.imm_len() as u16);

        #[cfg(feature = "cpu-trace")]
        log::trace!("{at:04X}  {:<20} {}", ins.render(imm), self.debug_state());

        let taken = self.execute(ins, imm, at, mmu);
        mmu.interrupts_mut().end_instruction();

        let cycles = u32::from(if taken { ins.cycles_taken } else { ins.cycles });
        cycles + self.service_interrupt(mmu)
    }

    /// Dispatch the highest-priority pending interrupt if IME allows it.
    fn service_interrupt(&mut self, mmu: &mut Mmu) -> u32 {
        let Some(interrupt) = mmu.interrupts_mut().take_next() else {
            return 0;
        };
        let mut ret = self.regs.pc;
        match mmu.interrupts().state() {
            ExecState::Halted => mmu.interrupts_mut().set_state(ExecState::Running),
            ExecState::HaltBug => {
                // EI; HALT with a source pending: return to the HALT itself.
                ret = ret.wrapping_sub(1);
                mmu.interrupts_mut().set_state(ExecState::Running);
            }
            ExecState::Running | ExecState::Stopped => {}
        }
        self.push(mmu, ret);
        self.regs.pc = interrupt.vector();
        DISPATCH_CYCLES
    }

    fn push(&mut self, mmu: &mut Mmu, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, val as u8);
    }

    fn pop(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = mmu.read_byte(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = mmu.read_byte(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn read8(&mut self, mmu: &mut Mmu, op: Operand, imm: u16) -> u8 {
        match op {
            Operand::R8(r) => self.regs.read8(r),
            Operand::Imm8 => imm as u8,
            Operand::Ind(rr) => mmu.read_byte(self.regs.read16(rr)),
            Operand::HlInc | Operand::HlDec => {
                let addr = self.step_hl(op);
                mmu.read_byte(addr)
            }
            Operand::Abs16 => mmu.read_byte(imm),
            Operand::HighImm8 => mmu.read_byte(0xFF00 | (imm & 0x00FF)),
            Operand::HighC => mmu.read_byte(0xFF00 | self.regs.bc.low() as u16),
            _ => unreachable!(),
        }
    }

    fn write8(&mut self, mmu: &mut Mmu, op: Operand, imm: u16, val: u8) {
        match op {
            Operand::R8(r) => self.regs.write8(r, val),
            Operand::Ind(rr) => {
                mmu.write_byte(self.regs.read16(rr), val);
            }
            Operand::HlInc | Operand::HlDec => {
                let addr = self.step_hl(op);
                mmu.write_byte(addr, val);
            }
            Operand::Abs16 => {
                mmu.write_byte(imm, val);
            }
            Operand::HighImm8 => {
                mmu.write_byte(0xFF00 | (imm & 0x00FF), val);
            }
            Operand::HighC => {
                mmu.write_byte(0xFF00 | self.regs.bc.low() as u16, val);
            }
            _ => unreachable!(),
        }
    }

    /// Post-increment/decrement HL, returning the address before the step.
    fn step_hl(&mut self, op: Operand) -> u16 {
        let hl = self.regs.hl.full();
        let next = if op == Operand::HlInc {
            hl.wrapping_add(1)
        } else {
            hl.wrapping_sub(1)
        };
        self.regs.hl.set(next);
        hl
    }

    fn read16(&self, op: Operand, imm: u16) -> u16 {
        match op {
            Operand::R16(r) => self.regs.read16(r),
            Operand::Imm16 => imm,
            _ => unreachable!(),
        }
    }

    fn condition(&self, op: Operand) -> bool {
        match op {
            Operand::Cond(Cond::NZ) => !self.regs.flag(FLAG_Z),
            Operand::Cond(Cond::Z) => self.regs.flag(FLAG_Z),
            Operand::Cond(Cond::NC) => !self.regs.flag(FLAG_C),
            Operand::Cond(Cond::C) => self.regs.flag(FLAG_C),
            _ => true,
        }
    }

    fn alu_a(&mut self, action: Action, b: u8) {
        let a = self.regs.a();
        let carry = self.regs.flag(FLAG_C);
        let (res, f) = match action {
            Action::Add => alu::add8(a, b, false),
            Action::Adc => alu::add8(a, b, carry),
            Action::Sub | Action::Cp => alu::sub8(a, b, false),
            Action::Sbc => alu::sub8(a, b, carry),
            Action::And => alu::and8(a, b),
            Action::Xor => alu::xor8(a, b),
            Action::Or => alu::or8(a, b),
            _ => unreachable!(),
        };
        if action != Action::Cp {
            self.regs.set_a(res);
        }
        self.regs.set_f(f);
    }

    /// Execute a decoded instruction. Returns true when a conditional branch
    /// was taken.
    fn execute(&mut self, ins: &Instruction, imm: u16, at: u16, mmu: &mut Mmu) -> bool {
        let f = self.regs.f();
        // Branch target operand follows the condition when there is one.
        let (taken, target) = if ins.is_conditional() {
            (self.condition(ins.op1), ins.op2)
        } else {
            (true, ins.op1)
        };

        match ins.action {
            Action::Nop | Action::Prefix => {}
            Action::Illegal => {
                log::warn!("illegal opcode {:02X} at {at:04X}", ins.opcode);
            }
            Action::Ld8 => {
                let val = self.read8(mmu, ins.op2, imm);
                self.write8(mmu, ins.op1, imm, val);
            }
            Action::Ld16 => match ins.op1 {
                Operand::Abs16 => mmu.write_word(imm, self.regs.sp),
                Operand::R16(r) => {
                    let val = self.read16(ins.op2, imm);
                    self.regs.write16(r, val);
                }
                _ => unreachable!(),
            },
            Action::LdHlSp => {
                let (res, flags) = alu::add_sp(self.regs.sp, imm as u8 as i8);
                self.regs.hl.set(res);
                self.regs.set_f(flags);
            }
            Action::Push => {
                let val = self.read16(ins.op1, imm);
                self.push(mmu, val);
            }
            Action::Pop => {
                let val = self.pop(mmu);
                if let Operand::R16(r) = ins.op1 {
                    self.regs.write16(r, val);
                }
            }
            Action::Add
            | Action::Adc
            | Action::Sub
            | Action::Sbc
            | Action::And
            | Action::Xor
            | Action::Or
            | Action::Cp => {
                let b = self.read8(mmu, ins.op2, imm);
                self.alu_a(ins.action, b);
            }
            Action::Inc8 | Action::Dec8 => {
                let val = self.read8(mmu, ins.op1, imm);
                let (res, flags) = if ins.action == Action::Inc8 {
                    alu::inc8(val, f)
                } else {
                    alu::dec8(val, f)
                };
                self.write8(mmu, ins.op1, imm, res);
                self.regs.set_f(flags);
            }
            Action::Inc16 | Action::Dec16 => {
                if let Operand::R16(r) = ins.op1 {
                    let val = self.regs.read16(r);
                    let res = if ins.action == Action::Inc16 {
                        val.wrapping_add(1)
                    } else {
                        val.wrapping_sub(1)
                    };
                    self.regs.write16(r, res);
                }
            }
            Action::AddHl => {
                let rr = self.read16(ins.op2, imm);
                let (res, flags) = alu::add16(self.regs.hl.full(), rr, f);
                self.regs.hl.set(res);
                self.regs.set_f(flags);
            }
            Action::AddSp => {
                let (res, flags) = alu::add_sp(self.regs.sp, imm as u8 as i8);
                self.regs.sp = res;
                self.regs.set_f(flags);
            }
            Action::Daa => {
                let (res, flags) = alu::daa(self.regs.a(), f);
                self.regs.set_a(res);
                self.regs.set_f(flags);
            }
            Action::Cpl => {
                self.regs.set_a(!self.regs.a());
                self.regs.set_f(f | FLAG_N | FLAG_H);
            }
            Action::Scf => self.regs.set_f((f & FLAG_Z) | FLAG_C),
            Action::Ccf => self.regs.set_f((f & FLAG_Z) | ((f ^ FLAG_C) & FLAG_C)),
            Action::Rlca | Action::Rrca | Action::Rla | Action::Rra => {
                let kind = match ins.action {
                    Action::Rlca => Shift::Rlc,
                    Action::Rrca => Shift::Rrc,
                    Action::Rla => Shift::Rl,
                    _ => Shift::Rr,
                };
                let (res, flags) = alu::shift(kind, self.regs.a(), f);
                self.regs.set_a(res);
                self.regs.set_f(flags & !FLAG_Z);
            }
            Action::Jr => {
                if taken {
                    let offset = imm as u8 as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
                }
            }
            Action::Jp => {
                if taken {
                    self.regs.pc = self.read16(target, imm);
                }
            }
            Action::Call => {
                if taken {
                    let ret = self.regs.pc;
                    self.push(mmu, ret);
                    self.regs.pc = imm;
                }
            }
            Action::Ret => {
                if taken {
                    self.regs.pc = self.pop(mmu);
                }
            }
            Action::Reti => {
                self.regs.pc = self.pop(mmu);
                mmu.interrupts_mut().enable_now();
            }
            Action::Rst => {
                if let Operand::Vector(vector) = ins.op1 {
                    let ret = self.regs.pc;
                    self.push(mmu, ret);
                    self.regs.pc = vector as u16;
                }
            }
            Action::Di => mmu.interrupts_mut().disable(),
            Action::Ei => mmu.interrupts_mut().schedule_enable(),
            Action::Halt => {
                let ic = mmu.interrupts_mut();
                let state = if !ic.ime() && ic.pending() != 0 {
                    ExecState::HaltBug
                } else {
                    ExecState::Halted
                };
                ic.set_state(state);
            }
            Action::Stop => {
                mmu.reset_div();
                if !mmu.speed_switch() {
                    mmu.interrupts_mut().set_state(ExecState::Stopped);
                }
            }
            Action::Shift(kind) => {
                let val = self.read8(mmu, ins.op1, imm);
                let (res, flags) = alu::shift(kind, val, f);
                self.write8(mmu, ins.op1, imm, res);
                self.regs.set_f(flags);
            }
            Action::Bit | Action::Res | Action::Set => {
                let Operand::Bit(n) = ins.op1 else {
                    unreachable!()
                };
                let val = self.read8(mmu, ins.op2, imm);
                match ins.action {
                    Action::Bit => self.regs.set_f(alu::bit(n, val, f)),
                    Action::Res => self.write8(mmu, ins.op2, imm, val & !(1 << n)),
                    _ => self.write8(mmu, ins.op2, imm, val | (1 << n)),
                }
            }
        }

        taken
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the instruction at `addr` as assembly text, with its encoded size.
pub fn disassemble(mmu: &mut Mmu, addr: u16) -> (String, u8) {
    let opcode = mmu.read_byte(addr);
    let (ins, imm_at) = if opcode == 0xCB {
        let sub = mmu.read_byte(addr.wrapping_add(1));
        (instructions::lookup_cb(sub), addr.wrapping_add(2))
    } else {
        (instructions::lookup(opcode), addr.wrapping_add(1))
    };
    let imm = match ins.imm_len() {
        0 => 0,
        1 => mmu.read_byte(imm_at) as u16,
        _ => mmu.read_word(imm_at),
    };
    (ins.render(imm), ins.size)
}
