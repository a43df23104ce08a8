//! Synthetic ROM images for integration tests. Nothing here touches the
//! network or needs ROM binaries checked in.
#![allow(dead_code)]

use dotboy_core::{
    GameBoy,
    cartridge::{ROM_BANK_SIZE, header_checksum},
    cpu::Cpu,
    mmu::Mmu,
};

/// Builds a cartridge image with a valid header.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    /// A no-controller image of `banks` 16 KiB banks (power of two, >= 2).
    pub fn new(banks: usize) -> Self {
        assert!(banks.is_power_of_two() && banks >= 2);
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x0134..0x013F].copy_from_slice(b"DOTBOY TEST");
        rom[0x0148] = (banks / 2).trailing_zeros() as u8;
        Self { rom }
    }

    pub fn cart_type(mut self, cart_type: u8) -> Self {
        self.rom[0x0147] = cart_type;
        self
    }

    pub fn ram_code(mut self, code: u8) -> Self {
        self.rom[0x0149] = code;
        self
    }

    /// Copy `bytes` into the image at `offset`.
    pub fn code(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.rom[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Stamp every bank's first switchable byte with its bank number.
    pub fn tag_banks(mut self) -> Self {
        for bank in 1..self.rom.len() / ROM_BANK_SIZE {
            self.rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.rom[0x014D] = header_checksum(&self.rom);
        self.rom
    }

    pub fn build_with_bad_checksum(mut self) -> Vec<u8> {
        self.rom[0x014D] = header_checksum(&self.rom).wrapping_add(1);
        self.rom
    }
}

/// Machine with a 32 KiB ROM whose entry point holds `program`.
pub fn machine_with_program(program: &[u8]) -> GameBoy {
    let rom = RomBuilder::new(2).code(0x0100, program).build();
    let mut gb = GameBoy::new();
    gb.load_rom(rom).expect("synthetic ROM should load");
    gb
}

/// Bare CPU and bus with `program` in work RAM at 0xC000.
pub fn cpu_in_wram(program: &[u8]) -> (Cpu, Mmu) {
    let mut mmu = Mmu::new();
    for (i, b) in program.iter().enumerate() {
        mmu.write_byte(0xC000 + i as u16, *b);
    }
    let mut cpu = Cpu::new();
    cpu.regs.pc = 0xC000;
    (cpu, mmu)
}
