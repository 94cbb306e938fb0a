use thiserror::Error;

use crate::io::BusContext;
use crate::mmu::BusDevice;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x0150;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("ROM image is {0} bytes, too short to contain a cartridge header")]
    TooShort(usize),

    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc5,
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    pub mbc: MbcType,
    pub cgb: bool,
    pub title: String,
    cart_type: u8,
    rom_banks: usize,
    mbc_state: MbcState,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        /// 5-bit register at 0x2000, never 0.
        rom_bank: u8,
        /// 2-bit register at 0x4000.
        upper: u8,
        /// 0 = ROM banking, 1 = RAM banking.
        mode: u8,
        ram_enable: bool,
    },
    Mbc5 {
        /// 9 bits: LSB from 0x2000, bit 8 from 0x3000.
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

impl Cartridge {
    /// Parse the header and set up the bank controller for `data`.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;

        let rom_banks = (data.len() / ROM_BANK_SIZE).max(1);
        if let Some(declared) = header.rom_size() {
            if declared != data.len() {
                log::warn!(
                    "header declares {declared} bytes of ROM but image has {}",
                    data.len()
                );
            }
        } else {
            log::warn!("unknown ROM size code {:#04X}", header.rom_size_code());
        }

        let ram_size = header.ram_size();
        if ram_size > 0 && !header.has_ram() {
            log::warn!("cartridge type {cart_type:#04X} has no RAM but header declares {ram_size} bytes");
        }

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                upper: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        let title = header.title();
        let cgb = header.cgb_supported();
        log::debug!(
            "cartridge \"{title}\" type={cart_type:#04X} mbc={mbc:?} rom_banks={rom_banks} ram={ram_size}"
        );

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            cgb,
            title,
            cart_type,
            rom_banks,
            mbc_state,
        })
    }

    pub fn cart_type(&self) -> u8 {
        self.cart_type
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom_banks
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram.len().div_ceil(RAM_BANK_SIZE)
    }

    /// Battery-backed cartridge types keep RAM across power cycles.
    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x09 | 0x1B | 0x1E)
    }

    /// External RAM contents, for a host that persists saves.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Restore external RAM from a save. Extra bytes are ignored and a short
    /// save only fills the start of RAM.
    pub fn load_ram(&mut self, data: &[u8]) {
        let n = data.len().min(self.ram.len());
        self.ram[..n].copy_from_slice(&data[..n]);
        if data.len() != self.ram.len() {
            log::warn!(
                "save is {} bytes but cartridge RAM is {} bytes",
                data.len(),
                self.ram.len()
            );
        }
    }

    /// Bank mapped at 0x4000-0x7FFF.
    pub fn rom_bank(&self) -> usize {
        let raw = match self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_bank,
                upper,
                mode,
                ..
            } => {
                if mode == 0 {
                    ((upper as usize) << 5) | rom_bank as usize
                } else {
                    rom_bank as usize
                }
            }
            MbcState::Mbc5 { rom_bank, .. } => rom_bank as usize,
        };
        raw % self.rom_banks
    }

    /// Bank mapped at 0xA000-0xBFFF.
    pub fn ram_bank(&self) -> usize {
        let raw = match self.mbc_state {
            MbcState::NoMbc => 0,
            MbcState::Mbc1 { upper, mode, .. } => {
                if mode == 1 {
                    upper as usize
                } else {
                    0
                }
            }
            MbcState::Mbc5 { ram_bank, .. } => ram_bank as usize,
        };
        raw % self.ram_bank_count().max(1)
    }

    fn ram_enabled(&self) -> bool {
        match self.mbc_state {
            MbcState::NoMbc => true,
            MbcState::Mbc1 { ram_enable, .. } | MbcState::Mbc5 { ram_enable, .. } => ram_enable,
        }
    }

    fn ram_index(&self, addr: u16) -> Option<usize> {
        if self.ram.is_empty() || !self.ram_enabled() {
            return None;
        }
        let offset = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
        // 2 KiB parts mirror inside the 8 KiB window.
        Some(offset % self.ram.len())
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let offset = self.rom_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => match self.ram_index(addr) {
                Some(idx) => self.ram[idx],
                None => 0xFF,
            },
            _ => 0xFF,
        }
    }

    /// Returns the byte latched by the write: the register value for control
    /// writes, the stored byte for RAM, 0xFF when nothing was stored.
    pub fn write(&mut self, addr: u16, val: u8) -> u8 {
        if (0xA000..=0xBFFF).contains(&addr) {
            return match self.ram_index(addr) {
                Some(idx) => {
                    self.ram[idx] = val;
                    val
                }
                None => 0xFF,
            };
        }

        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, _) => {
                log::debug!("write {val:02X} to ROM at {addr:04X} ignored, no MBC");
                0xFF
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
                val
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                let bank = val & 0x1F;
                *rom_bank = if bank == 0 { 1 } else { bank };
                *rom_bank
            }
            (MbcState::Mbc1 { upper, .. }, 0x4000..=0x5FFF) => {
                *upper = val & 0x03;
                *upper
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
                *mode
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
                val
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
                val & 0x01
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
                *ram_bank
            }
            _ => 0xFF,
        }
    }
}

impl BusDevice for Cartridge {
    fn read(&mut self, addr: u16, _ctx: &BusContext) -> u8 {
        Cartridge::read(self, addr)
    }

    fn write(&mut self, addr: u16, val: u8, _ctx: &mut BusContext) -> u8 {
        Cartridge::write(self, addr, val)
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooShort(data.len()));
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0143];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.data[0x0143] & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnsupportedType(other)),
        }
    }

    fn has_ram(&self) -> bool {
        matches!(
            self.cart_type(),
            0x02 | 0x03 | 0x08 | 0x09 | 0x1A | 0x1B | 0x1D | 0x1E
        )
    }

    fn rom_size_code(&self) -> u8 {
        self.data[0x0148]
    }

    /// Declared ROM size in bytes (32 KiB << code).
    fn rom_size(&self) -> Option<usize> {
        match self.rom_size_code() {
            code @ 0x00..=0x08 => Some(0x8000 << code),
            _ => None,
        }
    }

    fn ram_size(&self) -> usize {
        match self.data[0x0149] {
            0x00 => 0,
            0x01 => 0x800,   // 2KB
            0x02 => 0x2000,  // 8KB
            0x03 => 0x8000,  // 32KB (4 banks)
            0x04 => 0x20000, // 128KB (16 banks)
            0x05 => 0x10000, // 64KB (8 banks)
            _ => 0,
        }
    }
}
