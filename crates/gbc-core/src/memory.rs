use crate::io::BusContext;
use crate::mmu::BusDevice;

pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const WRAM_BANKS: usize = 8;
pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;
pub const HRAM_SIZE: usize = 0x7F;

/// Work RAM: bank 0 at 0xC000-0xCFFF, banks 1-7 at 0xD000-0xDFFF via SVBK.
pub struct WorkRam {
    banks: Box<[[u8; WRAM_BANK_SIZE]; WRAM_BANKS]>,
}

impl WorkRam {
    pub fn new() -> Self {
        Self {
            banks: Box::new([[0; WRAM_BANK_SIZE]; WRAM_BANKS]),
        }
    }

    fn slot(addr: u16, ctx: &BusContext) -> (usize, usize) {
        let offset = (addr as usize) & (WRAM_BANK_SIZE - 1);
        if addr < 0xD000 {
            (0, offset)
        } else {
            (ctx.wram_bank(), offset)
        }
    }

    pub fn bank(&self, n: usize) -> &[u8; WRAM_BANK_SIZE] {
        &self.banks[n % WRAM_BANKS]
    }
}

impl Default for WorkRam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for WorkRam {
    fn read(&mut self, addr: u16, ctx: &BusContext) -> u8 {
        let (bank, offset) = Self::slot(addr, ctx);
        self.banks[bank][offset]
    }

    fn write(&mut self, addr: u16, val: u8, ctx: &mut BusContext) -> u8 {
        let (bank, offset) = Self::slot(addr, ctx);
        self.banks[bank][offset] = val;
        val
    }
}

/// 0xE000-0xFDFF. Holds no storage; every access is redirected 0x2000 lower.
#[derive(Debug, Default)]
pub struct EchoRam;

impl BusDevice for EchoRam {
    fn read(&mut self, _addr: u16, _ctx: &BusContext) -> u8 {
        0xFF
    }

    fn write(&mut self, _addr: u16, _val: u8, _ctx: &mut BusContext) -> u8 {
        0xFF
    }

    fn mirror_of(&self, addr: u16) -> Option<u16> {
        Some(addr - 0x2000)
    }
}

/// Video RAM with two 8 KiB banks selected by VBK bit 0. Stands in for the
/// PPU-owned memory; a host renderer reads it back through
/// [`Mmu::vram_bank`](crate::mmu::Mmu::vram_bank).
pub struct VideoRam {
    banks: Box<[[u8; VRAM_BANK_SIZE]; 2]>,
}

impl VideoRam {
    pub fn new() -> Self {
        Self {
            banks: Box::new([[0; VRAM_BANK_SIZE]; 2]),
        }
    }

    pub fn bank(&self, n: usize) -> &[u8; VRAM_BANK_SIZE] {
        &self.banks[n & 1]
    }
}

impl Default for VideoRam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for VideoRam {
    fn read(&mut self, addr: u16, ctx: &BusContext) -> u8 {
        self.banks[ctx.vram_bank()][(addr - 0x8000) as usize]
    }

    fn write(&mut self, addr: u16, val: u8, ctx: &mut BusContext) -> u8 {
        self.banks[ctx.vram_bank()][(addr - 0x8000) as usize] = val;
        val
    }
}

/// Sprite attribute table, 0xFE00-0xFE9F.
pub struct Oam {
    data: [u8; OAM_SIZE],
}

impl Oam {
    pub fn new() -> Self {
        Self {
            data: [0; OAM_SIZE],
        }
    }

    pub fn data(&self) -> &[u8; OAM_SIZE] {
        &self.data
    }
}

impl Default for Oam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Oam {
    fn read(&mut self, addr: u16, _ctx: &BusContext) -> u8 {
        self.data[(addr - 0xFE00) as usize]
    }

    fn write(&mut self, addr: u16, val: u8, _ctx: &mut BusContext) -> u8 {
        self.data[(addr - 0xFE00) as usize] = val;
        val
    }
}

/// 0xFEA0-0xFEFF, modelled after CGB revision E.
#[derive(Debug, Default)]
pub struct NotUsable;

impl BusDevice for NotUsable {
    fn read(&mut self, addr: u16, ctx: &BusContext) -> u8 {
        // OAM search and pixel transfer lock the region.
        if matches!(ctx.ppu_mode(), 2 | 3) {
            return 0xFF;
        }
        let hi = (addr & 0xF0) as u8;
        hi | (hi >> 4)
    }

    fn write(&mut self, addr: u16, val: u8, _ctx: &mut BusContext) -> u8 {
        log::debug!("write {val:02X} to unusable address {addr:04X} ignored");
        0
    }
}

/// High RAM, 0xFF80-0xFFFE.
pub struct HighRam {
    data: [u8; HRAM_SIZE],
}

impl HighRam {
    pub fn new() -> Self {
        Self {
            data: [0; HRAM_SIZE],
        }
    }
}

impl Default for HighRam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for HighRam {
    fn read(&mut self, addr: u16, _ctx: &BusContext) -> u8 {
        self.data[(addr - 0xFF80) as usize]
    }

    fn write(&mut self, addr: u16, val: u8, _ctx: &mut BusContext) -> u8 {
        self.data[(addr - 0xFF80) as usize] = val;
        val
    }
}

/// IE at 0xFFFF, backed by the interrupt controller.
#[derive(Debug, Default)]
pub struct InterruptEnable;

impl BusDevice for InterruptEnable {
    fn read(&mut self, _addr: u16, ctx: &BusContext) -> u8 {
        ctx.interrupts.ie()
    }

    fn write(&mut self, _addr: u16, val: u8, ctx: &mut BusContext) -> u8 {
        ctx.interrupts.set_ie(val);
        val
    }
}

/// Empty cartridge slot: reads float high and writes are dropped.
#[derive(Debug, Default)]
pub struct OpenBus;

impl BusDevice for OpenBus {
    fn read(&mut self, _addr: u16, _ctx: &BusContext) -> u8 {
        0xFF
    }

    fn write(&mut self, _addr: u16, _val: u8, _ctx: &mut BusContext) -> u8 {
        0xFF
    }
}
