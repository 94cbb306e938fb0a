#![allow(dead_code)]

use gbc_core::gameboy::GameBoy;

pub const ROM_BANK_SIZE: usize = 0x4000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// ROM image of `banks` 16 KiB banks whose first byte holds the bank number.
pub fn rom_image(cart_type: u8, banks: usize, ram_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
    for (bank, chunk) in rom.chunks_mut(ROM_BANK_SIZE).enumerate() {
        chunk[0] = bank as u8;
    }
    rom[0x0143] = 0x80;
    rom[0x0147] = cart_type;
    rom[0x0148] = (banks / 2).max(1).trailing_zeros() as u8;
    rom[0x0149] = ram_code;
    rom
}

/// 32 KiB ROM-only image with `program` at the entry point.
pub fn program_rom(program: &[u8]) -> Vec<u8> {
    let mut rom = rom_image(0x00, 2, 0);
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    rom
}

/// Post-boot machine running `program` from 0x0100.
pub fn machine(program: &[u8]) -> GameBoy {
    init_logger();
    GameBoy::new(program_rom(program)).expect("test ROM loads")
}

/// Step `n` instructions and return the cycles of each.
pub fn run(gb: &mut GameBoy, n: usize) -> Vec<u32> {
    (0..n).map(|_| gb.step()).collect()
}
