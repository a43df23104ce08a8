use log::{debug, info};

use crate::{
    cartridge::{Cartridge, CartridgeError, Header},
    cpu::Cpu,
    input::Button,
    mmu::Mmu,
    ppu::{DOTS_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH},
    registers::Registers,
    timer::Timer,
};

/// Machine cycles in one video frame.
pub const CYCLES_PER_FRAME: u32 = DOTS_PER_FRAME / 4;

const BOOT_EXIT_PC: u16 = 0x0100;

/// How the machine gets from power-on to the cartridge entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootMode {
    /// Start directly at 0x0100 with the registers the boot ROM leaves.
    #[default]
    Skip,
    /// Run the built-in boot program mapped over the first 256 ROM bytes.
    BuiltIn,
}

/// Result of a successful ROM load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub header: Header,
    pub checksum_ok: bool,
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub timer: Timer,
    boot_mode: BootMode,
}

impl GameBoy {
    pub fn new() -> Self {
        Self::with_boot(BootMode::Skip)
    }

    pub fn with_boot(boot_mode: BootMode) -> Self {
        let mut gb = Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
            timer: Timer::new(),
            boot_mode,
        };
        gb.power_on();
        gb
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    fn power_on(&mut self) {
        self.timer = Timer::new();
        self.mmu.reset();
        match self.boot_mode {
            BootMode::Skip => {
                self.cpu = Cpu::new();
                self.mmu.apply_post_boot_io();
            }
            BootMode::BuiltIn => {
                self.cpu = Cpu::new_power_on();
                if let Some(cart) = self.mmu.cart.as_mut() {
                    cart.finish_boot();
                    cart.install_boot_overlay();
                }
            }
        }
    }

    /// Validate `rom` and insert it, restarting the machine. On error the
    /// machine, including any previously inserted cartridge, is untouched.
    pub fn load_rom(&mut self, rom: Vec<u8>) -> Result<LoadReport, CartridgeError> {
        let cart = Cartridge::load(rom)?;
        let header = cart.header().clone();
        info!(
            "Loaded \"{}\": {:?}, {} KiB ROM, {} KiB RAM",
            header.title,
            cart.mbc(),
            cart.rom_len() / 1024,
            cart.ram_len() / 1024
        );
        let report = LoadReport {
            checksum_ok: header.checksum_ok(),
            header,
        };
        self.mmu.load_cart(cart);
        self.power_on();
        Ok(report)
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.mmu.cart.as_ref()
    }

    /// Restart from power-on, keeping the cartridge.
    pub fn reset(&mut self) {
        self.power_on();
    }

    /// One CPU step; the timer and PPU then catch up by the same number of
    /// cycles. Returns the cycles consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.mmu) as u32;
        self.timer.update(cycles, &mut self.mmu);
        self.mmu.tick_ppu(cycles);

        if self.cpu.regs.pc == BOOT_EXIT_PC && self.mmu.finish_boot() {
            debug!("Boot program finished");
        }
        cycles
    }

    /// Step until at least `cycles` machine cycles have elapsed. Returns the
    /// exact count, which may overshoot by part of one instruction.
    pub fn run_cycles(&mut self, cycles: u64) -> u64 {
        let mut elapsed = 0u64;
        while elapsed < cycles {
            elapsed += self.step() as u64;
        }
        elapsed
    }

    /// Step until the PPU finishes a frame. With the LCD off no frame ever
    /// completes, so this gives up after one frame's worth of cycles and
    /// returns false.
    pub fn run_frame(&mut self) -> bool {
        self.mmu.ppu.clear_frame_flag();
        let mut elapsed = 0u32;
        while !self.mmu.ppu.frame_ready() {
            if elapsed >= CYCLES_PER_FRAME {
                return false;
            }
            elapsed += self.step();
        }
        true
    }

    pub fn frame_ready(&self) -> bool {
        self.mmu.ppu.frame_ready()
    }

    pub fn frames(&self) -> u64 {
        self.mmu.ppu.frames()
    }

    pub fn framebuffer(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.mmu.ppu.framebuffer()
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.press(button);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.release(button);
    }

    pub fn registers(&self) -> Registers {
        self.cpu.regs
    }

    pub fn cycles(&self) -> u32 {
        self.cpu.cycles
    }

    pub fn halted(&self) -> bool {
        self.cpu.halted
    }

    /// Bus read with no side effects, for inspection.
    pub fn peek(&self, addr: u16) -> u8 {
        self.mmu.read_byte(addr)
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
