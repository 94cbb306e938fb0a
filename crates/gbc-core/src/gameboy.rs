use thiserror::Error;

use crate::{
    cartridge::{Cartridge, CartridgeError},
    cpu::Cpu,
    mmu::{BusError, Mmu},
};

/// Clock cycles in one 60 Hz frame at normal speed (4,194,304 / 60).
pub const CYCLES_PER_FRAME: u32 = 69_905;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
}

impl GameBoy {
    /// Machine in the post-boot state with `rom` inserted.
    pub fn new(rom: Vec<u8>) -> Result<Self, Error> {
        let cart = Cartridge::load(rom)?;
        let mut mmu = Mmu::new()?;
        mmu.load_cart(cart);
        Ok(Self {
            cpu: Cpu::new(),
            mmu,
        })
    }

    /// Machine at power-on with `boot_rom` mapped, starting from 0x0000.
    pub fn new_power_on(rom: Vec<u8>, boot_rom: Vec<u8>) -> Result<Self, Error> {
        let mut gb = Self::new(rom)?;
        gb.cpu = Cpu::new_power_on();
        gb.mmu.load_boot_rom(boot_rom);
        Ok(gb)
    }

    /// Execute one instruction and return its clock cycles.
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.mmu)
    }

    /// Run until a frame's worth of cycles has elapsed, calling `tick` after
    /// every step so the host can advance its own peripherals. In double
    /// speed the CPU gets twice as many cycles per frame.
    pub fn run_frame_with<F>(&mut self, mut tick: F) -> u32
    where
        F: FnMut(&mut Mmu, u32),
    {
        let budget = if self.mmu.double_speed() {
            CYCLES_PER_FRAME * 2
        } else {
            CYCLES_PER_FRAME
        };
        let mut elapsed = 0;
        while elapsed < budget {
            let cycles = self.cpu.step(&mut self.mmu);
            tick(&mut self.mmu, cycles);
            elapsed += cycles;
        }
        elapsed
    }

    pub fn run_frame(&mut self) -> u32 {
        self.run_frame_with(|_, _| {})
    }
}
