mod common;

use common::{init_logger, machine, program_rom};
use gbc_core::gameboy::GameBoy;
use gbc_core::interrupts::Interrupt;
use gbc_core::io::{
    BCPD, BCPS, BOOT, BusContext, Button, DMA, HDMA1, HDMA2, HDMA3, HDMA4, HDMA5, IF, OCPD,
    OCPS, P1, STAT, SVBK, VBK,
};
use gbc_core::mmu::{BusDevice, BusError, Mmu, RegionId};

fn bus() -> Mmu {
    init_logger();
    Mmu::new().expect("standard map is valid")
}

#[test]
fn standard_map_covers_every_address() {
    let mmu = bus();
    assert_eq!(mmu.check_coverage(), Ok(()));
    assert_eq!(mmu.regions().len(), 11);
    assert_eq!(mmu.regions().last().map(|r| r.id), Some(RegionId::InterruptEnable));
    assert_eq!(mmu.region_at(0x0000).map(|r| r.id), Some(RegionId::Rom));
    assert_eq!(mmu.region_at(0xE123).map(|r| r.id), Some(RegionId::Echo));
    assert_eq!(mmu.region_at(0xFEA0).map(|r| r.id), Some(RegionId::NotUsable));
    assert_eq!(
        mmu.region_at(0xFFFF).map(|r| r.id),
        Some(RegionId::InterruptEnable)
    );
}

#[test]
fn empty_cartridge_slot_floats_high() {
    let mut mmu = bus();
    assert_eq!(mmu.read_byte(0x0100), 0xFF);
    assert_eq!(mmu.read_byte(0xA000), 0xFF);
    assert_eq!(mmu.write_byte(0x2000, 0x05), 0xFF);
    assert!(mmu.cartridge().is_none());
}

#[test]
fn echo_mirrors_work_ram_both_ways() {
    let mut mmu = bus();
    mmu.write_byte(0xC000, 0xAA);
    assert_eq!(mmu.read_byte(0xE000), 0xAA);
    mmu.write_byte(0xFDFF, 0xBB);
    assert_eq!(mmu.read_byte(0xDDFF), 0xBB);
}

#[test]
fn echo_follows_selected_wram_bank() {
    let mut mmu = bus();
    mmu.write_byte(SVBK, 0x03);
    mmu.write_byte(0xD010, 0x33);
    assert_eq!(mmu.read_byte(0xF010), 0x33);
    mmu.write_byte(SVBK, 0x04);
    assert_eq!(mmu.read_byte(0xF010), 0x00);
}

#[test]
fn wram_bank_switching() {
    let mut mmu = bus();
    mmu.write_byte(SVBK, 0x00);
    assert_eq!(mmu.context().wram_bank(), 1);
    mmu.write_byte(0xD000, 0x11);
    mmu.write_byte(SVBK, 0x01);
    assert_eq!(mmu.read_byte(0xD000), 0x11);
    assert_eq!(mmu.read_byte(SVBK), 0xF9);

    mmu.write_byte(SVBK, 0x02);
    assert_eq!(mmu.context().wram_bank(), 2);
    assert_eq!(mmu.read_byte(0xD000), 0x00);
    mmu.write_byte(0xD000, 0x22);
    mmu.write_byte(SVBK, 0x01);
    assert_eq!(mmu.read_byte(0xD000), 0x11);

    // Bank 0 at 0xC000 does not move.
    mmu.write_byte(0xC000, 0x99);
    mmu.write_byte(SVBK, 0x07);
    assert_eq!(mmu.read_byte(0xC000), 0x99);
}

#[test]
fn vram_bank_switching() {
    let mut mmu = bus();
    mmu.write_byte(0x8000, 0x11);
    assert_eq!(mmu.write_byte(VBK, 0xFF), 0x01);
    assert_eq!(mmu.read_byte(VBK), 0xFF);
    assert_eq!(mmu.read_byte(0x8000), 0x00);
    mmu.write_byte(0x8000, 0x22);

    let bank0 = mmu.vram_bank(0).expect("video ram");
    assert_eq!(bank0[0], 0x11);
    let bank1 = mmu.vram_bank(1).expect("video ram");
    assert_eq!(bank1[0], 0x22);
}

#[test]
fn not_usable_region() {
    let mut mmu = bus();
    mmu.set_io_port(STAT, 0x80);
    assert_eq!(mmu.read_byte(0xFEA0), 0xAA);
    assert_eq!(mmu.read_byte(0xFEB5), 0xBB);
    assert_eq!(mmu.write_byte(0xFEA0, 0x12), 0);
    mmu.set_io_port(STAT, 0x82);
    assert_eq!(mmu.read_byte(0xFEA0), 0xFF);
}

#[test]
fn if_and_ie_through_the_bus() {
    let mut mmu = bus();
    assert_eq!(mmu.read_byte(IF), 0xE1);
    mmu.write_byte(IF, 0x04);
    assert_eq!(mmu.read_byte(IF), 0xE4);
    assert!(mmu.interrupts().is_requested(Interrupt::Timer));
    assert!(!mmu.interrupts().is_requested(Interrupt::VBlank));

    mmu.write_byte(0xFFFF, 0x1F);
    assert_eq!(mmu.interrupts().ie(), 0x1F);
    assert_eq!(mmu.read_byte(0xFFFF), 0x1F);
    assert_eq!(mmu.interrupts().pending(), 0x04);
}

#[test]
fn oam_dma_copies_160_bytes() {
    let mut mmu = bus();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC100 + i, i as u8 ^ 0x5A);
    }
    mmu.write_byte(DMA, 0xC1);
    let oam = mmu.oam().expect("oam device");
    for (i, &b) in oam.iter().enumerate() {
        assert_eq!(b, i as u8 ^ 0x5A);
    }
}

fn program_hdma(mmu: &mut Mmu, src: u16, dst: u16) {
    mmu.write_byte(HDMA1, (src >> 8) as u8);
    mmu.write_byte(HDMA2, src as u8);
    mmu.write_byte(HDMA3, (dst >> 8) as u8);
    mmu.write_byte(HDMA4, dst as u8);
}

#[test]
fn general_dma_copies_immediately_and_stalls() {
    let mut mmu = bus();
    for i in 0..0x20u16 {
        mmu.write_byte(0xC000 + i, i as u8 + 1);
    }
    program_hdma(&mut mmu, 0xC000, 0x8800);
    mmu.write_byte(HDMA5, 0x01);

    let vram = mmu.vram_bank(0).expect("video ram");
    assert_eq!(&vram[0x800..0x820], &(1..=0x20).collect::<Vec<u8>>()[..]);
    assert_eq!(mmu.read_byte(HDMA5), 0xFF);
    assert_eq!(mmu.take_dma_stall(), 16);
    assert_eq!(mmu.take_dma_stall(), 0);
}

#[test]
fn hblank_dma_copies_one_block_per_call() {
    let mut mmu = bus();
    for i in 0..0x20u16 {
        mmu.write_byte(0xC000 + i, 0xA0 + i as u8);
    }
    program_hdma(&mut mmu, 0xC000, 0x8000);
    mmu.write_byte(HDMA5, 0x81);
    assert_eq!(mmu.read_byte(HDMA5), 0x01);

    assert!(mmu.hblank());
    assert_eq!(mmu.read_byte(HDMA5), 0x00);
    assert_eq!(mmu.vram_bank(0).expect("video ram")[0x0F], 0xAF);
    assert_eq!(mmu.vram_bank(0).expect("video ram")[0x10], 0x00);

    assert!(mmu.hblank());
    assert_eq!(mmu.read_byte(HDMA5), 0xFF);
    assert_eq!(mmu.vram_bank(0).expect("video ram")[0x1F], 0xBF);
    assert!(!mmu.hblank());
    assert_eq!(mmu.take_dma_stall(), 16);
}

#[test]
fn general_dma_stops_at_end_of_vram() {
    let mut mmu = bus();
    for i in 0..0x20u16 {
        mmu.write_byte(0xC000 + i, 0x50 + i as u8);
    }
    program_hdma(&mut mmu, 0xC000, 0x9FF0);
    mmu.write_byte(HDMA5, 0x01);

    let vram = mmu.vram_bank(0).expect("video ram");
    assert_eq!(vram[0x1FF0], 0x50);
    assert_eq!(vram[0x1FFF], 0x5F);
    assert!(vram[..0x10].iter().all(|&b| b == 0));
    assert_eq!(mmu.read_byte(HDMA5), 0xFF);
    // Only the block that fit is charged.
    assert_eq!(mmu.take_dma_stall(), 8);
}

#[test]
fn hblank_dma_ends_at_end_of_vram() {
    let mut mmu = bus();
    for i in 0..0x30u16 {
        mmu.write_byte(0xC000 + i, 0x77);
    }
    program_hdma(&mut mmu, 0xC000, 0x9FF0);
    mmu.write_byte(HDMA5, 0x82);
    assert_eq!(mmu.read_byte(HDMA5), 0x02);

    assert!(mmu.hblank());
    assert_eq!(mmu.read_byte(HDMA5), 0xFF);
    assert!(!mmu.hblank());
    let vram = mmu.vram_bank(0).expect("video ram");
    assert_eq!(vram[0x1FFF], 0x77);
    assert!(vram[..0x10].iter().all(|&b| b == 0));
    assert_eq!(mmu.take_dma_stall(), 8);
}

#[test]
fn hblank_dma_can_be_cancelled() {
    let mut mmu = bus();
    program_hdma(&mut mmu, 0xC000, 0x8000);
    mmu.write_byte(HDMA5, 0x83);
    assert!(mmu.hblank());
    mmu.write_byte(HDMA5, 0x00);
    assert_eq!(mmu.read_byte(HDMA5), 0x82);
    assert!(!mmu.hblank());
}

#[test]
fn palette_ram_auto_increment() {
    let mut mmu = bus();
    mmu.write_byte(BCPS, 0x80);
    for val in [0x1F, 0x00, 0xE0, 0x03] {
        mmu.write_byte(BCPD, val);
    }
    assert_eq!(mmu.read_byte(BCPS), 0x84);
    assert_eq!(&mmu.bg_palette()[..4], &[0x1F, 0x00, 0xE0, 0x03]);

    mmu.write_byte(BCPS, 0x02);
    assert_eq!(mmu.read_byte(BCPD), 0xE0);
    mmu.write_byte(BCPD, 0x44);
    assert_eq!(mmu.read_byte(BCPS), 0x02);

    mmu.write_byte(OCPS, 0xBF);
    mmu.write_byte(OCPD, 0x7C);
    assert_eq!(mmu.obj_palette()[0x3F], 0x7C);
    assert_eq!(mmu.read_byte(OCPS), 0x80);
}

#[test]
fn joypad_selection_and_interrupt() {
    let mut mmu = bus();
    mmu.write_byte(P1, 0x20);
    mmu.write_byte(IF, 0x00);
    mmu.set_buttons(Button::Right.mask() | Button::Start.mask());
    assert_eq!(mmu.read_byte(P1), 0xEE);
    assert!(mmu.interrupts().is_requested(Interrupt::Joypad));

    mmu.write_byte(P1, 0x10);
    assert_eq!(mmu.read_byte(P1), 0xD7);
    mmu.write_byte(P1, 0x30);
    assert_eq!(mmu.read_byte(P1), 0xFF);
}

#[test]
fn boot_rom_overlay_until_disabled() {
    init_logger();
    let mut boot = vec![0u8; 0x900];
    boot[0x0000] = 0x31;
    boot[0x0200] = 0x77;
    let mut gb = GameBoy::new_power_on(program_rom(&[0xAB]), boot).expect("rom loads");
    assert_eq!(gb.cpu.regs.pc, 0x0000);
    assert!(gb.mmu.boot_rom_mapped());

    assert_eq!(gb.mmu.read_byte(0x0000), 0x31);
    assert_eq!(gb.mmu.read_byte(0x0100), 0xAB);
    assert_eq!(gb.mmu.read_byte(0x0200), 0x77);

    gb.mmu.write_byte(BOOT, 0x01);
    assert!(gb.mmu.boot_rom_mapped());
    gb.mmu.write_byte(BOOT, 0x11);
    assert!(!gb.mmu.boot_rom_mapped());
    assert_eq!(gb.mmu.read_byte(0x0000), 0x00);
    assert_eq!(gb.mmu.read_byte(0x0200), 0x00);
}

#[test]
fn write_returns_stored_byte() {
    let mut gb = machine(&[]);
    assert_eq!(gb.mmu.write_byte(0xC000, 0x42), 0x42);
    assert_eq!(gb.mmu.write_byte(0x0100, 0x42), 0xFF);
    assert_eq!(gb.mmu.write_byte(SVBK, 0xFA), 0x02);
}

/// Bus device that answers every read with a fixed byte.
struct Constant(u8);

impl BusDevice for Constant {
    fn read(&mut self, _addr: u16, _ctx: &BusContext) -> u8 {
        self.0
    }

    fn write(&mut self, _addr: u16, val: u8, _ctx: &mut BusContext) -> u8 {
        self.0 = val;
        val
    }
}

#[test]
fn devices_can_be_swapped_and_downcast() {
    let mut mmu = bus();
    let hram = mmu.region_at(0xFF80).expect("hram region").device;
    mmu.swap_device(hram, Box::new(Constant(0x5A)))
        .expect("known device");

    assert_eq!(mmu.read_byte(0xFF80), 0x5A);
    assert_eq!(mmu.read_byte(0xFFFE), 0x5A);
    mmu.write_byte(0xFF90, 0x17);
    assert_eq!(mmu.read_byte(0xFF80), 0x17);
    assert_eq!(mmu.device::<Constant>(hram).map(|d| d.0), Some(0x17));
}

#[test]
fn region_registration_errors() {
    let mut mmu = bus();
    let dev = mmu.attach(Box::new(Constant(0)));
    assert_eq!(
        mmu.register_region(RegionId::Custom("bad"), 0x2000..=0x1000, dev),
        Err(BusError::InvalidRange {
            id: RegionId::Custom("bad"),
            begin: 0x2000,
            end: 0x1000,
        })
    );
    assert_eq!(
        mmu.register_region(RegionId::Hram, 0xFF90..=0xFF9F, dev),
        Err(BusError::DuplicateRegion {
            id: RegionId::Hram,
            begin: 0xFF90,
            end: 0xFF9F,
        })
    );

    // Earlier regions win, so a late overlay is shadowed.
    mmu.register_region(RegionId::Custom("shadow"), 0xC000..=0xC0FF, dev)
        .expect("distinct id");
    mmu.write_byte(0xC000, 0x42);
    assert_eq!(mmu.read_byte(0xC000), 0x42);
}
