use log::debug;

use crate::{
    cartridge::Cartridge,
    input::{Button, Joypad},
    memory::{
        BGP, BOOT, DIV, DMA, IE, IF, InternalMemory, Interrupt, LCDC, LY, P1, SB, SC, STAT,
        TAC,
    },
    ppu::Ppu,
};

const OAM_DMA_LEN: u16 = 0xA0;

/// Memory bus. Every CPU access goes through [`Mmu::read_byte`] and
/// [`Mmu::write_byte`], which route by address range to the cartridge, the
/// PPU's VRAM/OAM, or the internal RAM and I/O array.
pub struct Mmu {
    pub cart: Option<Cartridge>,
    pub ppu: Ppu,
    pub joypad: Joypad,
    memory: InternalMemory,
    serial_out: Vec<u8>,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            cart: None,
            ppu: Ppu::new(),
            joypad: Joypad::new(),
            memory: InternalMemory::new(),
            serial_out: Vec::new(),
        }
    }

    /// I/O register values left behind by the DMG boot ROM.
    pub fn apply_post_boot_io(&mut self) {
        self.joypad.write(0x00);
        self.memory.write(DIV, 0xAB);
        self.memory.write(TAC, 0xF8);
        self.memory.write(IF, 0xE1);
        self.memory.write(LCDC, 0x91);
        self.memory.write(STAT, 0x85);
        self.memory.write(BGP, 0xFC);
    }

    /// Clear everything except the cartridge.
    pub fn reset(&mut self) {
        self.ppu = Ppu::new();
        self.joypad = Joypad::new();
        self.memory.clear();
        self.serial_out.clear();
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cart.as_ref().map_or(0, |c| c.read_rom(addr)),
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => self.cart.as_ref().map_or(0, |c| c.read_ram(addr)),
            0xFE00..=0xFE9F => self.ppu.read_oam(addr),
            0xE000..=0xFDFF => self.memory.read(addr - 0x2000),
            0xFEA0..=0xFEFF => 0xFF,
            P1 => self.joypad.read(),
            IF => self.memory.read(IF) | 0xE0,
            STAT => self.memory.read(STAT) | 0x80,
            TAC => self.memory.read(TAC) | 0xF8,
            _ => self.memory.read(addr),
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write_rom(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write_ram(addr, val);
                }
            }
            0xFE00..=0xFE9F => self.ppu.write_oam(addr, val),
            0xE000..=0xFDFF => self.memory.write(addr - 0x2000, val),
            0xFEA0..=0xFEFF => {}
            P1 => self.joypad.write(val),
            SC => {
                self.memory.write(SC, val);
                if val == 0x81 {
                    self.serial_transfer();
                }
            }
            DIV => self.memory.write(DIV, 0),
            LY => {}
            STAT => {
                let stat = self.memory.read(STAT);
                self.memory.write(STAT, (stat & 0x87) | (val & 0x78));
            }
            DMA => {
                self.memory.write(DMA, val);
                self.oam_dma(val);
            }
            BOOT => {
                self.memory.write(BOOT, val);
                if val != 0 {
                    self.finish_boot();
                }
            }
            _ => self.memory.write(addr, val),
        }
    }

    /// Register read without the masking applied to CPU reads.
    pub fn read_register(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    /// Register write without the side effects of CPU writes. Timer and PPU
    /// use this to update the values they own.
    pub fn write_register(&mut self, addr: u16, val: u8) {
        self.memory.write(addr, val);
    }

    pub fn set_interrupt_flag(&mut self, interrupt: Interrupt, value: bool) {
        self.memory.set_interrupt_flag(interrupt, value);
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.memory.request_interrupt(interrupt);
    }

    pub fn pending_interrupts(&self) -> u8 {
        self.memory.pending_interrupts()
    }

    pub fn interrupt_enable(&self) -> u8 {
        self.memory.read(IE)
    }

    /// Advance the PPU; it reads and writes its registers in the internal
    /// array directly.
    pub fn tick_ppu(&mut self, cycles: u32) {
        self.ppu.tick(cycles, &mut self.memory);
    }

    pub fn press(&mut self, button: Button) {
        if self.joypad.press(button) {
            self.request_interrupt(Interrupt::Joypad);
        }
    }

    pub fn release(&mut self, button: Button) {
        self.joypad.release(button);
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_out)
    }

    pub fn finish_boot(&mut self) -> bool {
        self.cart.as_mut().is_some_and(|cart| cart.finish_boot())
    }

    pub fn boot_active(&self) -> bool {
        self.cart.as_ref().is_some_and(|cart| cart.boot_active())
    }

    fn serial_transfer(&mut self) {
        let byte = self.memory.read(SB);
        debug!("Serial byte {byte:02X} ({:?})", byte as char);
        self.serial_out.push(byte);
        self.memory.write(SC, 0x01);
        self.request_interrupt(Interrupt::Serial);
    }

    fn oam_dma(&mut self, page: u8) {
        let src = (page as u16) << 8;
        for i in 0..OAM_DMA_LEN {
            let byte = self.read_byte(src.wrapping_add(i));
            self.ppu.write_oam(0xFE00 + i, byte);
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
