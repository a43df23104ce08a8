use log::warn;
use thiserror::Error;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x0150;

/// Reasons a ROM image is refused at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("ROM image is empty")]
    Empty,
    #[error("ROM image is {0} bytes, not a multiple of 16 KiB")]
    Misaligned(usize),
    /// Only reachable through [`Header::parse`]; any image accepted by the
    /// 16 KiB alignment check already covers the header.
    #[error("ROM image is {0} bytes, too short to hold a cartridge header")]
    HeaderTooShort(usize),
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),
    #[error("unknown ROM size code {0:#04X}")]
    UnknownRomSize(u8),
    #[error("unknown RAM size code {0:#04X}")]
    UnknownRamSize(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
}

/// Parsed cartridge header (0x0134-0x014F).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub new_licensee: [u8; 2],
    pub sgb_flag: u8,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub destination: u8,
    pub old_licensee: u8,
    pub version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
    computed_checksum: u8,
}

impl Header {
    /// Decode the header at 0x0100-0x014F. Works on any slice holding it,
    /// such as the first bytes of a file read before the full image.
    pub fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::HeaderTooShort(data.len()));
        }

        let mut title = &data[0x0134..0x0143];
        if let Some(pos) = title.iter().position(|&b| b == 0) {
            title = &title[..pos];
        }

        Ok(Self {
            title: String::from_utf8_lossy(title).trim().to_string(),
            new_licensee: [data[0x0144], data[0x0145]],
            sgb_flag: data[0x0146],
            cart_type: data[0x0147],
            rom_size_code: data[0x0148],
            ram_size_code: data[0x0149],
            destination: data[0x014A],
            old_licensee: data[0x014B],
            version: data[0x014C],
            header_checksum: data[0x014D],
            global_checksum: u16::from_be_bytes([data[0x014E], data[0x014F]]),
            computed_checksum: header_checksum(data),
        })
    }

    pub fn computed_checksum(&self) -> u8 {
        self.computed_checksum
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed_checksum == self.header_checksum
    }

    pub fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            other => Err(CartridgeError::UnsupportedType(other)),
        }
    }

    /// ROM size in bytes declared by the header.
    pub fn rom_size(&self) -> Result<usize, CartridgeError> {
        match self.rom_size_code {
            code @ 0x00..=0x08 => Ok(0x8000 << code),
            0x52 => Ok(72 * ROM_BANK_SIZE),
            0x53 => Ok(80 * ROM_BANK_SIZE),
            0x54 => Ok(96 * ROM_BANK_SIZE),
            other => Err(CartridgeError::UnknownRomSize(other)),
        }
    }

    /// External RAM size in bytes declared by the header.
    pub fn ram_size(&self) -> Result<usize, CartridgeError> {
        match self.ram_size_code {
            0x00 => Ok(0),
            0x01 => Ok(0x800),
            0x02 => Ok(0x2000),
            0x03 => Ok(0x8000),
            0x04 => Ok(0x20000),
            0x05 => Ok(0x10000),
            other => Err(CartridgeError::UnknownRamSize(other)),
        }
    }
}

/// Header checksum over 0x0134-0x014C: `sum = sum - byte - 1`.
pub fn header_checksum(data: &[u8]) -> u8 {
    data[0x0134..=0x014C]
        .iter()
        .fold(0u8, |sum, &b| sum.wrapping_sub(b).wrapping_sub(1))
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    header: Header,
    mbc: MbcType,
    mbc_state: MbcState,
    /// First 0x100 bytes of ROM while the boot program is mapped over them.
    displaced: Option<Box<[u8; 0x100]>>,
}

impl Cartridge {
    /// Validate and map a ROM image. Nothing is allocated until the whole
    /// header has been accepted.
    pub fn load(mut data: Vec<u8>) -> Result<Self, CartridgeError> {
        if data.is_empty() {
            return Err(CartridgeError::Empty);
        }
        if data.len() % ROM_BANK_SIZE != 0 {
            return Err(CartridgeError::Misaligned(data.len()));
        }

        let header = Header::parse(&data)?;
        let mbc = header.mbc_type()?;
        let rom_size = header.rom_size()?;
        let ram_size = header.ram_size()?;

        if !header.checksum_ok() {
            warn!(
                "Header checksum mismatch: header says {:02X}, computed {:02X}",
                header.header_checksum,
                header.computed_checksum()
            );
        }

        if data.len() < rom_size {
            data.resize(rom_size, 0xFF);
        }

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
        };

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            header,
            mbc,
            mbc_state,
            displaced: None,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn mbc(&self) -> MbcType {
        self.mbc
    }

    pub fn rom_len(&self) -> usize {
        self.rom.len()
    }

    pub fn ram_len(&self) -> usize {
        self.ram.len()
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    /// Bank currently visible at 0x4000-0x7FFF.
    pub fn rom_bank(&self) -> usize {
        match self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_bank, ram_bank, ..
            } => {
                let mut bank = ((ram_bank as usize & 0x03) << 5) | (rom_bank as usize & 0x1F);
                // Bank 0 and every multiple of 0x20 are unreachable here.
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank % self.rom_bank_count()
            }
        }
    }

    /// Bank currently visible at 0x0000-0x3FFF.
    fn low_rom_bank(&self) -> usize {
        match self.mbc_state {
            MbcState::Mbc1 { ram_bank, mode, .. } if mode == 1 => {
                ((ram_bank as usize & 0x03) << 5) % self.rom_bank_count()
            }
            _ => 0,
        }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        debug_assert!(addr <= 0x7FFF, "ROM read outside 0000-7FFF: {addr:04X}");
        let bank = if addr < 0x4000 {
            self.low_rom_bank()
        } else {
            self.rom_bank()
        };
        let offset = bank * ROM_BANK_SIZE + (addr as usize & 0x3FFF);
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        debug_assert!(addr <= 0x7FFF, "ROM write outside 0000-7FFF: {addr:04X}");
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, _) => {}
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, _) => {
                *mode = val & 0x01;
            }
        }
    }

    fn ram_index(&self, addr: u16) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }
        let offset = addr as usize - 0xA000;
        let idx = match self.mbc_state {
            MbcState::NoMbc => offset,
            MbcState::Mbc1 {
                ram_enable: false, ..
            } => return None,
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                let bank = if mode == 1 { ram_bank as usize & 0x03 } else { 0 };
                bank * RAM_BANK_SIZE + offset
            }
        };
        Some(idx % self.ram.len())
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        debug_assert!(
            (0xA000..=0xBFFF).contains(&addr),
            "cart RAM read outside A000-BFFF: {addr:04X}"
        );
        self.ram_index(addr).map_or(0xFF, |idx| self.ram[idx])
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        debug_assert!(
            (0xA000..=0xBFFF).contains(&addr),
            "cart RAM write outside A000-BFFF: {addr:04X}"
        );
        if let Some(idx) = self.ram_index(addr) {
            self.ram[idx] = val;
        }
    }

    /// Map the built-in boot program over the first 256 bytes of ROM.
    pub fn install_boot_overlay(&mut self) {
        if self.displaced.is_some() {
            return;
        }
        let mut saved = Box::new([0u8; 0x100]);
        saved.copy_from_slice(&self.rom[..0x100]);
        self.rom[..0x100].copy_from_slice(&BOOT_PROGRAM);
        self.displaced = Some(saved);
    }

    /// Restore the bytes hidden by the boot program. No-op when the overlay
    /// is not mapped.
    pub fn finish_boot(&mut self) -> bool {
        match self.displaced.take() {
            Some(saved) => {
                self.rom[..0x100].copy_from_slice(&saved[..]);
                true
            }
            None => false,
        }
    }

    pub fn boot_active(&self) -> bool {
        self.displaced.is_some()
    }
}

/// Small DMG boot program: clear VRAM, switch the LCD on with the usual
/// palette, load the post-boot register values, then unmap itself with
/// `LDH (0x50),A` at 0x00FE so execution falls through to 0x0100.
pub const BOOT_PROGRAM: [u8; 0x100] = build_boot_program();

const fn build_boot_program() -> [u8; 0x100] {
    const CODE: [u8; 0x25] = [
        0x31, 0xFE, 0xFF, // LD SP,$FFFE
        0xAF, // XOR A
        0x21, 0xFF, 0x9F, // LD HL,$9FFF
        0x32, // .clear: LD (HL-),A
        0xCB, 0x7C, // BIT 7,H
        0x20, 0xFB, // JR NZ,.clear
        0x3E, 0x91, // LD A,$91
        0xE0, 0x40, // LDH (LCDC),A
        0x3E, 0xFC, // LD A,$FC
        0xE0, 0x47, // LDH (BGP),A
        0x01, 0xB0, 0x01, // LD BC,$01B0
        0xC5, // PUSH BC
        0xF1, // POP AF
        0x01, 0x13, 0x00, // LD BC,$0013
        0x11, 0xD8, 0x00, // LD DE,$00D8
        0x21, 0x4D, 0x01, // LD HL,$014D
        0xC3, 0xFE, 0x00, // JP $00FE
    ];
    let mut rom = [0u8; 0x100];
    let mut i = 0;
    while i < CODE.len() {
        rom[i] = CODE[i];
        i += 1;
    }
    rom[0xFE] = 0xE0; // LDH (BOOT),A
    rom[0xFF] = 0x50;
    rom
}
