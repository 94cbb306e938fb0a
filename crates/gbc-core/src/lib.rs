//! Instruction- and bus-level Game Boy Color emulation core.
//!
//! This crate contains the CPU, the memory bus with its bank-switched devices,
//! the cartridge memory bank controllers and the interrupt controller. Pixel
//! rendering, audio synthesis and timer counting are left to the host, which
//! drives the core through the [`gameboy`] facade or [`cpu::Cpu::step`] and
//! talks to the bus through the peripheral helpers on [`mmu::Mmu`].

/// Pure 8/16-bit arithmetic with flag computation.
pub mod alu;

/// Cartridge header view and memory bank controllers (MBC1/MBC5).
pub mod cartridge;

/// SM83 fetch/decode/execute engine.
pub mod cpu;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Opcode descriptor table (base and CB-prefixed).
pub mod instructions;

/// Interrupt enable/flag state and CPU execution state.
pub mod interrupts;

/// I/O port block, palettes and HDMA channel.
pub mod io;

/// Flat RAM devices: WRAM, echo RAM, OAM, HRAM, VRAM.
pub mod memory;

/// Region table and address resolution.
pub mod mmu;

/// Register file.
pub mod registers;
