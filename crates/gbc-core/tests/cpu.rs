mod common;

use common::{init_logger, machine, program_rom, run};
use gbc_core::cpu::{Cpu, disassemble};
use gbc_core::gameboy::GameBoy;
use gbc_core::interrupts::{ExecState, Interrupt};
use gbc_core::io::{Button, KEY1};
use gbc_core::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

#[test]
fn post_boot_registers() {
    let cpu = Cpu::new();
    assert_eq!(cpu.regs.af(), 0x1180);
    assert_eq!(cpu.regs.bc.full(), 0x0000);
    assert_eq!(cpu.regs.de.full(), 0xFF56);
    assert_eq!(cpu.regs.hl.full(), 0x000D);
    assert_eq!(cpu.regs.sp, 0xFFFE);
    assert_eq!(cpu.regs.pc, 0x0100);
    assert_eq!(
        cpu.debug_state(),
        "AF:1180 BC:0000 DE:FF56 HL:000D PC:0100 SP:FFFE CY:0"
    );
}

#[test]
fn push_pop_through_stack() {
    // LD BC,$1234; PUSH BC; POP DE
    let mut gb = machine(&[0x01, 0x34, 0x12, 0xC5, 0xD1]);
    assert_eq!(run(&mut gb, 2), vec![12, 16]);
    assert_eq!(gb.cpu.regs.sp, 0xFFFC);
    assert_eq!(gb.mmu.read_byte(0xFFFD), 0x12);
    assert_eq!(gb.mmu.read_byte(0xFFFC), 0x34);

    assert_eq!(gb.step(), 12);
    assert_eq!(gb.cpu.regs.de.full(), 0x1234);
    assert_eq!(gb.cpu.regs.sp, 0xFFFE);
    assert_eq!(gb.cpu.cycles, 40);
}

#[test]
fn pop_af_masks_low_flag_nibble() {
    // LD BC,$12FF; PUSH BC; POP AF
    let mut gb = machine(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
    run(&mut gb, 3);
    assert_eq!(gb.cpu.regs.af(), 0x12F0);
}

#[test]
fn conditional_jr_timing() {
    // JR NZ,+2 (Z set: not taken); OR A; JR NZ,+2 (taken)
    let mut gb = machine(&[0x20, 0x02, 0xB7, 0x20, 0x02]);
    assert_eq!(gb.step(), 8);
    assert_eq!(gb.cpu.regs.pc, 0x0102);
    assert_eq!(gb.step(), 4);
    assert!(!gb.cpu.regs.flag(FLAG_Z));
    assert_eq!(gb.step(), 12);
    assert_eq!(gb.cpu.regs.pc, 0x0107);
}

#[test]
fn call_and_ret() {
    // CALL $0105; NOP; NOP; RET
    let mut gb = machine(&[0xCD, 0x05, 0x01, 0x00, 0x00, 0xC9]);
    assert_eq!(gb.step(), 24);
    assert_eq!(gb.cpu.regs.pc, 0x0105);
    assert_eq!(gb.cpu.regs.sp, 0xFFFC);
    assert_eq!(gb.step(), 16);
    assert_eq!(gb.cpu.regs.pc, 0x0103);
    assert_eq!(gb.cpu.regs.sp, 0xFFFE);
}

#[test]
fn conditional_ret_not_taken() {
    // RET C with carry clear
    let mut gb = machine(&[0xD8]);
    assert_eq!(gb.step(), 8);
    assert_eq!(gb.cpu.regs.pc, 0x0101);
}

#[test]
fn add_sets_half_and_full_carry() {
    // LD A,$3C; LD B,$C6; ADD A,B
    let mut gb = machine(&[0x3E, 0x3C, 0x06, 0xC6, 0x80]);
    assert_eq!(run(&mut gb, 3), vec![8, 8, 4]);
    assert_eq!(gb.cpu.regs.a(), 0x02);
    assert_eq!(gb.cpu.regs.f(), FLAG_H | FLAG_C);
}

#[test]
fn daa_adjusts_bcd_addition() {
    // LD A,$15; ADD A,$27; DAA
    let mut gb = machine(&[0x3E, 0x15, 0xC6, 0x27, 0x27]);
    run(&mut gb, 3);
    assert_eq!(gb.cpu.regs.a(), 0x42);
    assert_eq!(gb.cpu.regs.f(), 0x00);
}

#[test]
fn sp_relative_flags_use_low_byte() {
    // LD SP,$00FF; ADD SP,1; LD HL,SP-1
    let mut gb = machine(&[0x31, 0xFF, 0x00, 0xE8, 0x01, 0xF8, 0xFF]);
    assert_eq!(run(&mut gb, 2), vec![12, 16]);
    assert_eq!(gb.cpu.regs.sp, 0x0100);
    assert_eq!(gb.cpu.regs.f(), FLAG_H | FLAG_C);

    assert_eq!(gb.step(), 12);
    assert_eq!(gb.cpu.regs.hl.full(), 0x00FF);
    assert_eq!(gb.cpu.regs.f(), 0x00);
}

#[test]
fn hl_increment_and_decrement_loads() {
    // LD HL,$C000; LD A,$AA; LD (HL+),A; LD (HL-),A
    let mut gb = machine(&[0x21, 0x00, 0xC0, 0x3E, 0xAA, 0x22, 0x32]);
    run(&mut gb, 3);
    assert_eq!(gb.cpu.regs.hl.full(), 0xC001);
    assert_eq!(gb.step(), 8);
    assert_eq!(gb.cpu.regs.hl.full(), 0xC000);
    assert_eq!(gb.mmu.read_byte(0xC000), 0xAA);
    assert_eq!(gb.mmu.read_byte(0xC001), 0xAA);
}

#[test]
fn cb_prefixed_ops() {
    // LD A,$F0; SWAP A; BIT 7,A; LD HL,$C000; BIT 0,(HL); SET 0,(HL)
    let mut gb = machine(&[
        0x3E, 0xF0, 0xCB, 0x37, 0xCB, 0x7F, 0x21, 0x00, 0xC0, 0xCB, 0x46, 0xCB, 0xC6,
    ]);
    gb.step();
    assert_eq!(gb.step(), 8);
    assert_eq!(gb.cpu.regs.a(), 0x0F);
    assert_eq!(gb.cpu.regs.f(), 0x00);

    assert_eq!(gb.step(), 8);
    assert_eq!(gb.cpu.regs.f(), FLAG_Z | FLAG_H);

    gb.step();
    assert_eq!(gb.step(), 12);
    assert_eq!(gb.step(), 16);
    assert_eq!(gb.mmu.read_byte(0xC000), 0x01);
    assert_eq!(gb.cpu.regs.pc, 0x010D);
}

#[test]
fn rotate_a_clears_zero() {
    // XOR A; RLA
    let mut gb = machine(&[0xAF, 0x17]);
    gb.step();
    assert!(gb.cpu.regs.flag(FLAG_Z));
    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x00);
    assert!(!gb.cpu.regs.flag(FLAG_Z));
    assert!(!gb.cpu.regs.flag(FLAG_N));
}

#[test]
fn illegal_opcode_is_a_four_cycle_nop() {
    let mut gb = machine(&[0xD3, 0x00]);
    let before = gb.cpu.regs;
    assert_eq!(gb.step(), 4);
    assert_eq!(gb.cpu.regs.pc, 0x0101);
    assert_eq!(gb.cpu.regs.af(), before.af());
}

#[test]
fn ei_takes_effect_after_next_instruction() {
    // LD A,1; LDH ($FF),A; DI; EI; NOP; NOP
    let mut gb = machine(&[0x3E, 0x01, 0xE0, 0xFF, 0xF3, 0xFB, 0x00, 0x00]);
    // VBlank is latched in IF after boot.
    assert!(gb.mmu.interrupts().is_requested(Interrupt::VBlank));

    assert_eq!(run(&mut gb, 4), vec![8, 12, 4, 4]);
    assert_eq!(gb.cpu.regs.pc, 0x0106);
    assert!(!gb.mmu.interrupts().ime());

    assert_eq!(gb.step(), 4 + 20);
    assert_eq!(gb.cpu.regs.pc, 0x0040);
    assert_eq!(gb.cpu.regs.sp, 0xFFFC);
    assert_eq!(gb.mmu.read_word(0xFFFC), 0x0107);
    assert!(!gb.mmu.interrupts().ime());
    assert!(!gb.mmu.interrupts().is_requested(Interrupt::VBlank));
}

#[test]
fn repeated_ei_does_not_postpone_enable() {
    // LD A,1; LDH ($FF),A; EI; EI; NOP
    let mut gb = machine(&[0x3E, 0x01, 0xE0, 0xFF, 0xFB, 0xFB, 0x00]);
    run(&mut gb, 3);
    assert_eq!(gb.step(), 4 + 20);
    assert_eq!(gb.mmu.read_word(0xFFFC), 0x0106);
    assert_eq!(gb.cpu.regs.pc, 0x0040);
}

#[test]
fn reti_enables_immediately() {
    // LD HL,$0150; PUSH HL; RETI
    let mut gb = machine(&[0x21, 0x50, 0x01, 0xE5, 0xD9]);
    run(&mut gb, 2);
    assert_eq!(gb.step(), 16);
    assert_eq!(gb.cpu.regs.pc, 0x0150);
    assert!(gb.mmu.interrupts().ime());
}

#[test]
fn halt_idles_until_interrupt_requested() {
    // HALT; INC A
    let mut gb = machine(&[0x76, 0x3C]);
    assert_eq!(gb.step(), 4);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Halted);
    assert_eq!(run(&mut gb, 3), vec![4, 4, 4]);
    assert_eq!(gb.cpu.regs.pc, 0x0101);

    gb.mmu.interrupts_mut().set_ie(Interrupt::Timer.bit());
    gb.mmu.request_interrupt(Interrupt::Timer);
    // IME is off, so HALT just ends.
    assert_eq!(gb.step(), 4);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Running);
    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x12);
    assert_eq!(gb.cpu.regs.pc, 0x0102);
}

#[test]
fn halt_with_ime_dispatches_on_wake() {
    // EI; NOP; HALT; NOP
    let mut gb = machine(&[0xFB, 0x00, 0x76, 0x00]);
    run(&mut gb, 3);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Halted);
    assert_eq!(gb.step(), 4);

    gb.mmu.interrupts_mut().set_ie(Interrupt::Timer.bit());
    gb.mmu.request_interrupt(Interrupt::Timer);
    assert_eq!(gb.step(), 4 + 20);
    assert_eq!(gb.cpu.regs.pc, 0x0050);
    assert_eq!(gb.mmu.read_word(gb.cpu.regs.sp), 0x0103);
}

#[test]
fn halt_bug_repeats_next_byte() {
    // HALT; INC A; NOP with IME off and VBlank already pending
    let mut gb = machine(&[0x76, 0x3C, 0x00]);
    gb.mmu.interrupts_mut().set_ie(Interrupt::VBlank.bit());

    gb.step();
    assert_eq!(gb.mmu.interrupts().state(), ExecState::HaltBug);
    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x12);
    assert_eq!(gb.cpu.regs.pc, 0x0101);
    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x13);
    assert_eq!(gb.cpu.regs.pc, 0x0102);
}

#[test]
fn ei_halt_with_pending_interrupt_runs_handler_intact() {
    // LD A,1; LDH ($FF),A; EI; HALT; NOP with LD A,$42; RETI at the VBlank vector
    let mut rom = program_rom(&[0x3E, 0x01, 0xE0, 0xFF, 0xFB, 0x76, 0x00]);
    rom[0x0040..0x0043].copy_from_slice(&[0x3E, 0x42, 0xD9]);
    init_logger();
    let mut gb = GameBoy::new(rom).expect("rom loads");

    assert_eq!(run(&mut gb, 3), vec![8, 12, 4]);
    // HALT sees IME off with VBlank pending, then EI lands and dispatches.
    assert_eq!(gb.step(), 4 + 20);
    assert_eq!(gb.cpu.regs.pc, 0x0040);
    assert_eq!(gb.mmu.read_word(gb.cpu.regs.sp), 0x0105);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Running);

    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x42);
    assert_eq!(gb.cpu.regs.pc, 0x0042);

    assert_eq!(gb.step(), 16);
    assert_eq!(gb.cpu.regs.pc, 0x0105);
    assert!(gb.mmu.interrupts().ime());

    // Back on the HALT, with nothing left pending.
    assert_eq!(gb.step(), 4);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Halted);
    assert_eq!(gb.cpu.regs.pc, 0x0106);
}

#[test]
fn ei_halt_without_pending_interrupt_waits() {
    // EI; HALT; NOP
    let mut gb = machine(&[0xFB, 0x76, 0x00]);
    run(&mut gb, 2);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Halted);
    assert_eq!(gb.cpu.regs.pc, 0x0102);
    assert!(gb.mmu.interrupts().ime());
    assert_eq!(gb.step(), 4);

    gb.mmu.interrupts_mut().set_ie(Interrupt::Timer.bit());
    gb.mmu.request_interrupt(Interrupt::Timer);
    assert_eq!(gb.step(), 4 + 20);
    assert_eq!(gb.cpu.regs.pc, 0x0050);
    assert_eq!(gb.mmu.read_word(gb.cpu.regs.sp), 0x0102);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Running);
}

#[test]
fn stop_switches_speed_when_armed() {
    // LD A,1; LDH ($4D),A; STOP
    let mut gb = machine(&[0x3E, 0x01, 0xE0, 0x4D, 0x10, 0x00, 0x00]);
    run(&mut gb, 3);
    assert!(gb.mmu.double_speed());
    assert_eq!(gb.mmu.read_byte(KEY1), 0xFE);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Running);
    assert_eq!(gb.cpu.regs.pc, 0x0106);
}

#[test]
fn stop_waits_for_joypad() {
    // STOP; INC A
    let mut gb = machine(&[0x10, 0x00, 0x3C]);
    gb.step();
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Stopped);
    assert_eq!(run(&mut gb, 2), vec![4, 4]);
    assert_eq!(gb.cpu.regs.pc, 0x0102);

    gb.mmu.set_buttons(Button::A.mask());
    assert_eq!(gb.step(), 4);
    assert_eq!(gb.mmu.interrupts().state(), ExecState::Running);
    gb.step();
    assert_eq!(gb.cpu.regs.a(), 0x12);
}

#[test]
fn disassembles_from_the_bus() {
    let mut gb = machine(&[0xC3, 0x50, 0x01, 0xCB, 0x7C, 0x20, 0xFE]);
    assert_eq!(disassemble(&mut gb.mmu, 0x0100), ("JP $0150".to_string(), 3));
    assert_eq!(disassemble(&mut gb.mmu, 0x0103), ("BIT 7,H".to_string(), 2));
    assert_eq!(disassemble(&mut gb.mmu, 0x0105), ("JR NZ,-2".to_string(), 2));
}
