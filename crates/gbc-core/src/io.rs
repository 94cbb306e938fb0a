//! The I/O port block at 0xFF00-0xFF7F and the state it shares with the rest
//! of the bus.
//!
//! [`BusContext`] is handed to every [`BusDevice`](crate::mmu::BusDevice) on
//! each access. It carries the raw port bytes, the CGB palette memories, the
//! interrupt controller, the joypad lines, the HDMA channel and any transfer
//! that a port write has requested but the bus has not yet carried out.

use crate::interrupts::InterruptController;
use crate::mmu::BusDevice;

pub const P1: u16 = 0xFF00;
pub const SB: u16 = 0xFF01;
pub const SC: u16 = 0xFF02;
pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;
pub const IF: u16 = 0xFF0F;
pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const LY: u16 = 0xFF44;
pub const DMA: u16 = 0xFF46;
pub const BGP: u16 = 0xFF47;
pub const KEY1: u16 = 0xFF4D;
pub const VBK: u16 = 0xFF4F;
pub const BOOT: u16 = 0xFF50;
pub const HDMA1: u16 = 0xFF51;
pub const HDMA2: u16 = 0xFF52;
pub const HDMA3: u16 = 0xFF53;
pub const HDMA4: u16 = 0xFF54;
pub const HDMA5: u16 = 0xFF55;
pub const RP: u16 = 0xFF56;
pub const BCPS: u16 = 0xFF68;
pub const BCPD: u16 = 0xFF69;
pub const OCPS: u16 = 0xFF6A;
pub const OCPD: u16 = 0xFF6B;
pub const SVBK: u16 = 0xFF70;
pub const IE: u16 = 0xFFFF;

const PORT_COUNT: usize = 0x80;
const PALETTE_SIZE: usize = 0x40;

/// Port offset relative to 0xFF00.
#[inline]
pub const fn port(addr: u16) -> usize {
    (addr & 0x7F) as usize
}

/// Joypad inputs. The low nibble of P1 reports the direction keys when bit 4
/// is cleared and the action keys when bit 5 is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const fn mask(self) -> u8 {
        match self {
            Button::Right => 0x01,
            Button::Left => 0x02,
            Button::Up => 0x04,
            Button::Down => 0x08,
            Button::A => 0x10,
            Button::B => 0x20,
            Button::Select => 0x40,
            Button::Start => 0x80,
        }
    }
}

/// Work requested by a port write that needs the whole bus to carry out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transfer {
    /// 160 bytes from `src` into OAM.
    Oam { src: u16 },
    /// General-purpose VRAM DMA of `blocks` 16-byte blocks.
    General { src: u16, dst: u16, blocks: u16 },
}

/// HBlank-paced VRAM DMA channel.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Hdma {
    pub src: u16,
    pub dst: u16,
    /// Blocks still to copy while active.
    pub remaining: u16,
    pub active: bool,
    pub cancelled: bool,
}

impl Hdma {
    fn status(&self) -> u8 {
        if self.active {
            (self.remaining.saturating_sub(1) as u8) & 0x7F
        } else if self.cancelled {
            0x80 | ((self.remaining.saturating_sub(1) as u8) & 0x7F)
        } else {
            0xFF
        }
    }
}

pub struct BusContext {
    ports: [u8; PORT_COUNT],
    bg_palette: [u8; PALETTE_SIZE],
    obj_palette: [u8; PALETTE_SIZE],
    pub interrupts: InterruptController,
    pub(crate) boot_mapped: bool,
    /// Pressed buttons, one bit per [`Button`].
    buttons: u8,
    pub(crate) hdma: Hdma,
    pub(crate) pending: Option<Transfer>,
    /// Machine cycles the CPU still owes to a finished VRAM DMA.
    pub(crate) dma_stall: u32,
}

impl BusContext {
    /// Port block in its post-boot state (Pan Docs "Power Up Sequence").
    pub fn new() -> Self {
        let mut ports = [0u8; PORT_COUNT];
        ports[port(P1)] = 0xCF;
        ports[port(SC)] = 0x7F;
        ports[port(TAC)] = 0xF8;
        ports[port(LCDC)] = 0x91;
        ports[port(BGP)] = 0xFC;
        ports[port(VBK)] = 0xFE;
        ports[port(RP)] = 0x3E;
        ports[port(SVBK)] = 0xF8;
        ports[port(HDMA5)] = 0xFF;
        Self {
            ports,
            bg_palette: [0xFF; PALETTE_SIZE],
            obj_palette: [0xFF; PALETTE_SIZE],
            interrupts: InterruptController::new_post_boot(),
            boot_mapped: false,
            buttons: 0,
            hdma: Hdma::default(),
            pending: None,
            dma_stall: 0,
        }
    }

    /// Raw port byte as last stored, without read-side masking.
    #[inline]
    pub fn port(&self, addr: u16) -> u8 {
        self.ports[port(addr)]
    }

    #[inline]
    pub fn set_port(&mut self, addr: u16, val: u8) {
        self.ports[port(addr)] = val;
    }

    pub fn double_speed(&self) -> bool {
        self.port(KEY1) & 0x80 != 0
    }

    /// Current PPU mode as reported by STAT bits 0-1.
    pub fn ppu_mode(&self) -> u8 {
        self.port(STAT) & 0x03
    }

    pub fn vram_bank(&self) -> usize {
        (self.port(VBK) & 0x01) as usize
    }

    /// Switchable WRAM bank; bank 0 selects bank 1.
    pub fn wram_bank(&self) -> usize {
        match self.port(SVBK) & 0x07 {
            0 => 1,
            n => n as usize,
        }
    }

    pub fn bg_palette(&self) -> &[u8; PALETTE_SIZE] {
        &self.bg_palette
    }

    pub fn obj_palette(&self) -> &[u8; PALETTE_SIZE] {
        &self.obj_palette
    }

    /// Update the pressed-button mask and refresh the P1 input nibble.
    /// Returns true when a selected line went from released to pressed.
    pub(crate) fn set_buttons(&mut self, pressed: u8) -> bool {
        let before = self.port(P1) & 0x0F;
        self.buttons = pressed;
        let p1 = self.port(P1);
        let after = self.joypad_nibble(p1);
        self.set_port(P1, (p1 & 0xF0) | after);
        // A 1 -> 0 transition on any input line requests the interrupt.
        before & !after != 0
    }

    fn joypad_nibble(&self, select: u8) -> u8 {
        let mut lines = 0u8;
        if select & 0x10 == 0 {
            lines |= self.buttons & 0x0F;
        }
        if select & 0x20 == 0 {
            lines |= self.buttons >> 4;
        }
        !lines & 0x0F
    }

    fn write_palette(&mut self, index_port: u16, val: u8) {
        let index = self.port(index_port);
        let slot = (index & 0x3F) as usize;
        if index_port == BCPS {
            self.bg_palette[slot] = val;
        } else {
            self.obj_palette[slot] = val;
        }
        if index & 0x80 != 0 {
            self.set_port(index_port, (index.wrapping_add(1) & 0x3F) | 0x80);
        }
    }

    fn read_palette(&self, index_port: u16) -> u8 {
        let slot = (self.port(index_port) & 0x3F) as usize;
        if index_port == BCPS {
            self.bg_palette[slot]
        } else {
            self.obj_palette[slot]
        }
    }

    fn hdma_source(&self) -> u16 {
        ((self.port(HDMA1) as u16) << 8 | self.port(HDMA2) as u16) & 0xFFF0
    }

    fn hdma_dest(&self) -> u16 {
        0x8000 | (((self.port(HDMA3) as u16) << 8 | self.port(HDMA4) as u16) & 0x1FF0)
    }

    fn write_hdma5(&mut self, val: u8) -> u8 {
        let blocks = (val & 0x7F) as u16 + 1;
        if self.hdma.active && val & 0x80 == 0 {
            self.hdma.active = false;
            self.hdma.cancelled = true;
            return self.hdma.status();
        }
        if val & 0x80 == 0 {
            self.hdma.cancelled = false;
            self.pending = Some(Transfer::General {
                src: self.hdma_source(),
                dst: self.hdma_dest(),
                blocks,
            });
            return 0xFF;
        }
        self.hdma = Hdma {
            src: self.hdma_source(),
            dst: self.hdma_dest(),
            remaining: blocks,
            active: true,
            cancelled: false,
        };
        self.hdma.status()
    }

    /// Records one finished HBlank block.
    pub(crate) fn hdma_block_done(&mut self, src: u16, dst: u16) {
        self.hdma.src = src;
        self.hdma.dst = dst;
        self.hdma.remaining = self.hdma.remaining.saturating_sub(1);
        if self.hdma.remaining == 0 {
            self.hdma.active = false;
        }
        let status = self.hdma.status();
        self.set_port(HDMA5, status);
        self.add_dma_stall(1);
    }

    /// Ends an HBlank transfer early, as when it runs off the end of VRAM.
    pub(crate) fn hdma_finish(&mut self) {
        self.hdma.active = false;
        self.hdma.remaining = 0;
        self.set_port(HDMA5, 0xFF);
    }

    pub(crate) fn add_dma_stall(&mut self, blocks: u16) {
        let per_block = if self.double_speed() { 16 } else { 8 };
        self.dma_stall += blocks as u32 * per_block;
    }
}

impl Default for BusContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus device for 0xFF00-0xFF7F.
#[derive(Debug, Default)]
pub struct IoPorts;

impl BusDevice for IoPorts {
    fn read(&mut self, addr: u16, ctx: &BusContext) -> u8 {
        match addr {
            IF => ctx.interrupts.read_if(),
            KEY1 => (ctx.port(KEY1) & 0x81) | 0x7E,
            VBK => ctx.port(VBK) | 0xFE,
            SVBK => ctx.port(SVBK) | 0xF8,
            HDMA5 => ctx.hdma.status(),
            BCPD => ctx.read_palette(BCPS),
            OCPD => ctx.read_palette(OCPS),
            P1 => ctx.port(P1) | 0xC0,
            _ => ctx.port(addr),
        }
    }

    fn write(&mut self, addr: u16, val: u8, ctx: &mut BusContext) -> u8 {
        let stored = match addr {
            DIV => 0,
            BOOT => {
                if val == 0x11 && ctx.boot_mapped {
                    ctx.boot_mapped = false;
                    log::debug!("boot ROM unmapped");
                }
                val
            }
            // Only the select lines are writable; with both lines high the
            // nibble reads 0xF.
            P1 => (val & 0xF0) | ctx.joypad_nibble(val),
            IF => {
                ctx.interrupts.write_if(val);
                val & 0x1F
            }
            BCPD => {
                ctx.write_palette(BCPS, val);
                val
            }
            OCPD => {
                ctx.write_palette(OCPS, val);
                val
            }
            DMA => {
                ctx.pending = Some(Transfer::Oam {
                    src: (val as u16) << 8,
                });
                val
            }
            VBK => val & 0x01,
            SVBK => val & 0x07,
            KEY1 => (ctx.port(KEY1) & 0x80) | (val & 0x01),
            HDMA5 => ctx.write_hdma5(val),
            _ => val,
        };
        ctx.set_port(addr, stored);
        stored
    }
}
