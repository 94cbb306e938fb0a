use std::any::Any;
use std::ops::RangeInclusive;

use thiserror::Error;

use crate::cartridge::Cartridge;
use crate::interrupts::{Interrupt, InterruptController};
use crate::io::{self, BusContext, IoPorts, Transfer};
use crate::memory::{
    EchoRam, HighRam, InterruptEnable, NotUsable, Oam, OpenBus, VideoRam, WorkRam, OAM_SIZE,
    VRAM_BANK_SIZE,
};

/// Longest chain of mirror redirections a single access may follow.
const MAX_MIRROR_HOPS: usize = 4;
const VRAM_END: u16 = 0x9FFF;

/// A backing store or register block reachable through the bus.
///
/// Devices receive the absolute address and the shared [`BusContext`] on
/// every access. `write` returns the byte that ended up stored, which is what
/// [`Mmu::write_byte`] hands back to the caller.
pub trait BusDevice: Any + Send {
    fn read(&mut self, addr: u16, ctx: &BusContext) -> u8;

    fn write(&mut self, addr: u16, val: u8, ctx: &mut BusContext) -> u8;

    /// Redirect an access to another bus address instead of handling it.
    fn mirror_of(&self, _addr: u16) -> Option<u16> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionId {
    Rom,
    Vram,
    ExternalRam,
    Wram0,
    WramX,
    Echo,
    Oam,
    NotUsable,
    Io,
    Hram,
    InterruptEnable,
    /// Regions added by a host after construction.
    Custom(&'static str),
}

/// Handle returned by [`Mmu::attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub begin: u16,
    pub end: u16,
    pub device: DeviceId,
}

impl Region {
    #[inline]
    fn contains(&self, addr: u16) -> bool {
        self.begin <= addr && addr <= self.end
    }

    fn overlaps(&self, begin: u16, end: u16) -> bool {
        self.begin <= end && begin <= self.end
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("region {id:?} has an empty range {begin:#06X}-{end:#06X}")]
    InvalidRange { id: RegionId, begin: u16, end: u16 },

    #[error("region {id:?} already claims part of {begin:#06X}-{end:#06X}")]
    DuplicateRegion { id: RegionId, begin: u16, end: u16 },

    #[error("no region covers address {0:#06X}")]
    Unmapped(u16),

    #[error("no device attached as {0:?}")]
    UnknownDevice(DeviceId),
}

pub struct Mmu {
    devices: Vec<Box<dyn BusDevice>>,
    regions: Vec<Region>,
    ctx: BusContext,
    boot_rom: Option<Vec<u8>>,
    cart: DeviceId,
    vram: DeviceId,
    oam: DeviceId,
}

impl Mmu {
    /// Bus with every standard region registered and an empty cartridge slot.
    pub fn new() -> Result<Self, BusError> {
        let mut mmu = Self {
            devices: Vec::new(),
            regions: Vec::new(),
            ctx: BusContext::new(),
            boot_rom: None,
            cart: DeviceId(0),
            vram: DeviceId(0),
            oam: DeviceId(0),
        };

        mmu.cart = mmu.attach(Box::new(OpenBus));
        mmu.vram = mmu.attach(Box::new(VideoRam::new()));
        mmu.oam = mmu.attach(Box::new(Oam::new()));
        let wram = mmu.attach(Box::new(WorkRam::new()));
        let echo = mmu.attach(Box::new(EchoRam));
        let not_usable = mmu.attach(Box::new(NotUsable));
        let io = mmu.attach(Box::new(IoPorts));
        let hram = mmu.attach(Box::new(HighRam::new()));
        let ie = mmu.attach(Box::new(InterruptEnable));

        mmu.register_region(RegionId::Rom, 0x0000..=0x7FFF, mmu.cart)?;
        mmu.register_region(RegionId::Vram, 0x8000..=0x9FFF, mmu.vram)?;
        mmu.register_region(RegionId::ExternalRam, 0xA000..=0xBFFF, mmu.cart)?;
        mmu.register_region(RegionId::Wram0, 0xC000..=0xCFFF, wram)?;
        mmu.register_region(RegionId::WramX, 0xD000..=0xDFFF, wram)?;
        mmu.register_region(RegionId::Echo, 0xE000..=0xFDFF, echo)?;
        mmu.register_region(RegionId::Oam, 0xFE00..=0xFE9F, mmu.oam)?;
        mmu.register_region(RegionId::NotUsable, 0xFEA0..=0xFEFF, not_usable)?;
        mmu.register_region(RegionId::Io, 0xFF00..=0xFF7F, io)?;
        mmu.register_region(RegionId::Hram, 0xFF80..=0xFFFE, hram)?;
        mmu.register_region(RegionId::InterruptEnable, 0xFFFF..=0xFFFF, ie)?;

        mmu.check_coverage()?;
        Ok(mmu)
    }

    /// Take ownership of a device and return its handle.
    pub fn attach(&mut self, device: Box<dyn BusDevice>) -> DeviceId {
        self.devices.push(device);
        DeviceId(self.devices.len() - 1)
    }

    /// Replace the device behind `id`, returning the previous one. Regions
    /// bound to `id` keep pointing at the slot.
    pub fn swap_device(
        &mut self,
        id: DeviceId,
        device: Box<dyn BusDevice>,
    ) -> Result<Box<dyn BusDevice>, BusError> {
        let slot = self
            .devices
            .get_mut(id.0)
            .ok_or(BusError::UnknownDevice(id))?;
        Ok(std::mem::replace(slot, device))
    }

    /// Append an address range. Lookups take the first matching region, so
    /// a range that overlaps an earlier region only sees the addresses the
    /// earlier one leaves uncovered.
    pub fn register_region(
        &mut self,
        id: RegionId,
        range: RangeInclusive<u16>,
        device: DeviceId,
    ) -> Result<(), BusError> {
        let (begin, end) = (*range.start(), *range.end());
        if begin > end {
            return Err(BusError::InvalidRange { id, begin, end });
        }
        if device.0 >= self.devices.len() {
            return Err(BusError::UnknownDevice(device));
        }
        if self
            .regions
            .iter()
            .any(|r| r.id == id && r.overlaps(begin, end))
        {
            return Err(BusError::DuplicateRegion { id, begin, end });
        }
        log::debug!("region {id:?} {begin:04X}-{end:04X} -> device {}", device.0);
        self.regions.push(Region {
            id,
            begin,
            end,
            device,
        });
        Ok(())
    }

    /// First address no region covers, as an error.
    pub fn check_coverage(&self) -> Result<(), BusError> {
        match (0..=0xFFFFu16).find(|&a| !self.regions.iter().any(|r| r.contains(a))) {
            Some(gap) => Err(BusError::Unmapped(gap)),
            None => Ok(()),
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region that would serve `addr`, before mirror redirection.
    pub fn region_at(&self, addr: u16) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    fn resolve(&self, addr: u16) -> (usize, u16) {
        let mut addr = addr;
        for _ in 0..MAX_MIRROR_HOPS {
            let Some(region) = self.region_at(addr) else {
                panic!("bus address {addr:#06X} is not covered by any region");
            };
            let idx = region.device.0;
            match self.devices[idx].mirror_of(addr) {
                Some(target) if target != addr => addr = target,
                _ => return (idx, addr),
            }
        }
        panic!("bus address {addr:#06X} mirrors too deep");
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        if self.ctx.boot_mapped && matches!(addr, 0x0000..=0x00FF | 0x0200..=0x08FF) {
            return self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF);
        }
        let (idx, addr) = self.resolve(addr);
        self.devices[idx].read(addr, &self.ctx)
    }

    /// Store `val` at `addr` and return the byte the device actually kept.
    pub fn write_byte(&mut self, addr: u16, val: u8) -> u8 {
        let (idx, addr) = self.resolve(addr);
        let stored = self.devices[idx].write(addr, val, &mut self.ctx);
        if let Some(transfer) = self.ctx.pending.take() {
            self.run_transfer(transfer);
        }
        stored
    }

    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write_word(&mut self, addr: u16, val: u16) {
        self.write_byte(addr, val as u8);
        self.write_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn run_transfer(&mut self, transfer: Transfer) {
        match transfer {
            Transfer::Oam { src } => {
                for i in 0..OAM_SIZE as u16 {
                    let byte = self.read_byte(src.wrapping_add(i));
                    self.write_byte(0xFE00 + i, byte);
                }
            }
            Transfer::General { src, dst, blocks } => {
                let (src, dst, copied) = self.copy_to_vram(src, dst, blocks as usize * 0x10);
                self.ctx.hdma.src = src;
                self.ctx.hdma.dst = dst;
                self.ctx.add_dma_stall(copied.div_ceil(0x10) as u16);
            }
        }
    }

    /// Copy up to `len` bytes into VRAM, stopping at the end of 0x9FFF.
    /// Returns the source and destination pointers after the copy and the
    /// number of bytes written.
    fn copy_to_vram(&mut self, mut src: u16, mut dst: u16, len: usize) -> (u16, u16, usize) {
        let mut copied = 0;
        while copied < len && dst <= VRAM_END {
            let byte = self.read_byte(src);
            self.write_byte(dst, byte);
            src = src.wrapping_add(1);
            dst += 1;
            copied += 1;
        }
        (src, dst, copied)
    }

    /// Called by the host at the start of each HBlank. Copies one 16-byte
    /// block of an armed HBlank DMA; returns false when none is active.
    pub fn hblank(&mut self) -> bool {
        if !self.ctx.hdma.active {
            return false;
        }
        let (src, dst, _) = self.copy_to_vram(self.ctx.hdma.src, self.ctx.hdma.dst, 0x10);
        self.ctx.hdma_block_done(src, dst);
        if dst > VRAM_END {
            self.ctx.hdma_finish();
        }
        true
    }

    /// Machine cycles owed to VRAM DMA since the last call.
    pub fn take_dma_stall(&mut self) -> u32 {
        std::mem::take(&mut self.ctx.dma_stall)
    }

    /// Put `cart` in the cartridge slot behind the ROM and external RAM
    /// regions, replacing whatever was there.
    pub fn load_cart(&mut self, cart: Cartridge) {
        self.devices[self.cart.0] = Box::new(cart);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.device::<Cartridge>(self.cart)
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.device_mut::<Cartridge>(self.cart)
    }

    /// Concrete device behind `id`, if it is a `T`.
    pub fn device<T: BusDevice>(&self, id: DeviceId) -> Option<&T> {
        let dev: &dyn BusDevice = self.devices.get(id.0)?.as_ref();
        let any: &dyn Any = dev;
        any.downcast_ref::<T>()
    }

    pub fn device_mut<T: BusDevice>(&mut self, id: DeviceId) -> Option<&mut T> {
        let dev: &mut dyn BusDevice = self.devices.get_mut(id.0)?.as_mut();
        let any: &mut dyn Any = dev;
        any.downcast_mut::<T>()
    }

    /// Map a boot ROM over 0x0000-0x00FF and 0x0200-0x08FF until the program
    /// writes 0x11 to BOOT.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.ctx.boot_mapped = true;
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.ctx.boot_mapped
    }

    pub fn context(&self) -> &BusContext {
        &self.ctx
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.ctx.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.ctx.interrupts
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.ctx.interrupts.request(interrupt);
    }

    /// Raw register access for peripherals (timer, PPU, serial) that own the
    /// ports and must bypass write side effects.
    pub fn io_port(&self, addr: u16) -> u8 {
        self.ctx.port(addr)
    }

    pub fn set_io_port(&mut self, addr: u16, val: u8) {
        self.ctx.set_port(addr, val);
    }

    /// Update the pressed-button mask (see [`io::Button::mask`]). A newly
    /// pressed, currently selected button requests the joypad interrupt.
    pub fn set_buttons(&mut self, pressed: u8) {
        if self.ctx.set_buttons(pressed) {
            self.ctx.interrupts.request(Interrupt::Joypad);
        }
    }

    pub fn double_speed(&self) -> bool {
        self.ctx.double_speed()
    }

    /// Toggle CPU speed if KEY1 is armed. Returns true when a switch happened.
    pub fn speed_switch(&mut self) -> bool {
        let key1 = self.ctx.port(io::KEY1);
        if key1 & 0x01 == 0 {
            return false;
        }
        let switched = (key1 ^ 0x80) & 0x80;
        self.ctx.set_port(io::KEY1, switched);
        log::info!(
            "switched to {} speed",
            if switched != 0 { "double" } else { "normal" }
        );
        true
    }

    pub fn reset_div(&mut self) {
        self.ctx.set_port(io::DIV, 0);
    }

    pub fn bg_palette(&self) -> &[u8; 64] {
        self.ctx.bg_palette()
    }

    pub fn obj_palette(&self) -> &[u8; 64] {
        self.ctx.obj_palette()
    }

    pub fn oam(&self) -> Option<&[u8; OAM_SIZE]> {
        self.device::<Oam>(self.oam).map(Oam::data)
    }

    /// VRAM bank `n` (0 or 1) regardless of VBK.
    pub fn vram_bank(&self, n: usize) -> Option<&[u8; VRAM_BANK_SIZE]> {
        self.device::<VideoRam>(self.vram).map(|v| v.bank(n))
    }
}
