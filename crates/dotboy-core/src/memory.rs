/// Interrupt enable register (IE).
pub const IE: u16 = 0xFFFF;
/// Interrupt flag register (IF).
pub const IF: u16 = 0xFF0F;

pub const P1: u16 = 0xFF00;
pub const SB: u16 = 0xFF01;
pub const SC: u16 = 0xFF02;
pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;
pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LY: u16 = 0xFF44;
pub const LYC: u16 = 0xFF45;
pub const DMA: u16 = 0xFF46;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;
pub const WY: u16 = 0xFF4A;
pub const WX: u16 = 0xFF4B;
pub const BOOT: u16 = 0xFF50;

/// The five interrupt sources in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub const fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0,
            Interrupt::Stat => 1,
            Interrupt::Timer => 2,
            Interrupt::Serial => 3,
            Interrupt::Joypad => 4,
        }
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub const fn vector(self) -> u16 {
        0x0040 + (self.bit() as u16) * 8
    }

    /// Highest priority source in a pending mask (lowest bit wins).
    pub fn highest(pending: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| pending & i.mask() != 0)
    }
}

/// Flat 64 KiB backing store for everything the bus does not route to a
/// component: work RAM, high RAM and the I/O register file. Regions that
/// are owned elsewhere (ROM, VRAM, cart RAM, OAM) simply go unused.
pub struct InternalMemory {
    bytes: Box<[u8; 0x10000]>,
}

impl InternalMemory {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; 0x10000]),
        }
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u8) {
        self.bytes[addr as usize] = val;
    }

    /// Set or clear one bit of IF. This is the only path other components
    /// use to request an interrupt; servicing is left to the CPU.
    pub fn set_interrupt_flag(&mut self, interrupt: Interrupt, value: bool) {
        let flags = self.read(IF);
        let flags = if value {
            flags | interrupt.mask()
        } else {
            flags & !interrupt.mask()
        };
        self.write(IF, flags);
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.set_interrupt_flag(interrupt, true);
    }

    /// Enabled and requested interrupts.
    pub fn pending_interrupts(&self) -> u8 {
        self.read(IE) & self.read(IF) & 0x1F
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}

impl Default for InternalMemory {
    fn default() -> Self {
        Self::new()
    }
}
