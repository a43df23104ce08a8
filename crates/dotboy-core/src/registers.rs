// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Byte slots in the backing array. Each pair is stored high byte first so a
// 16-bit pair is always `bytes[hi]:bytes[hi + 1]`.
const A: usize = 0;
const F: usize = 1;
const B: usize = 2;
const C: usize = 3;
const D: usize = 4;
const E: usize = 5;
const H: usize = 6;
const L: usize = 7;

/// SM83 register file.
///
/// The eight 8-bit registers live in one byte array and the pairs AF, BC, DE
/// and HL are composed from adjacent slots, so byte-level and pair-level
/// accessors always observe the same value. The low nibble of F is forced to
/// zero on every write path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    bytes: [u8; 8],
    pub sp: u16,
    pub pc: u16,
}

macro_rules! byte_accessors {
    ($($get:ident, $set:ident, $slot:expr;)*) => {
        $(
            #[inline]
            pub fn $get(&self) -> u8 {
                self.bytes[$slot]
            }

            #[inline]
            pub fn $set(&mut self, val: u8) {
                self.bytes[$slot] = val;
            }
        )*
    };
}

macro_rules! pair_accessors {
    ($($get:ident, $set:ident, $hi:expr;)*) => {
        $(
            #[inline]
            pub fn $get(&self) -> u16 {
                u16::from_be_bytes([self.bytes[$hi], self.bytes[$hi + 1]])
            }

            #[inline]
            pub fn $set(&mut self, val: u16) {
                let [hi, lo] = val.to_be_bytes();
                self.bytes[$hi] = hi;
                self.bytes[$hi + 1] = lo;
            }
        )*
    };
}

impl Registers {
    /// All registers cleared, as seen right after power-on.
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; 8],
            sp: 0,
            pc: 0,
        }
    }

    byte_accessors! {
        a, set_a, A;
        b, set_b, B;
        c, set_c, C;
        d, set_d, D;
        e, set_e, E;
        h, set_h, H;
        l, set_l, L;
    }

    pair_accessors! {
        bc, set_bc, B;
        de, set_de, D;
        hl, set_hl, H;
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.bytes[F]
    }

    #[inline]
    pub fn set_f(&mut self, val: u8) {
        self.bytes[F] = val & 0xF0;
    }

    #[inline]
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.bytes[A], self.bytes[F]])
    }

    #[inline]
    pub fn set_af(&mut self, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.bytes[A] = hi;
        self.set_f(lo);
    }

    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.bytes[F] & mask != 0
    }

    #[inline]
    pub fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.bytes[F] |= mask & 0xF0;
        } else {
            self.bytes[F] &= !mask;
        }
    }

    /// Read one of the seven plain 8-bit registers by its opcode encoding
    /// (B, C, D, E, H, L, -, A). Index 6 is `(HL)` and must be handled by the
    /// caller because it needs the bus.
    pub fn get8(&self, index: u8) -> u8 {
        match index {
            0 => self.b(),
            1 => self.c(),
            2 => self.d(),
            3 => self.e(),
            4 => self.h(),
            5 => self.l(),
            7 => self.a(),
            _ => unreachable!("register index {index} is a memory operand"),
        }
    }

    pub fn set8(&mut self, index: u8, val: u8) {
        match index {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            4 => self.set_h(val),
            5 => self.set_l(val),
            7 => self.set_a(val),
            _ => unreachable!("register index {index} is a memory operand"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_and_byte_views_share_storage() {
        let mut regs = Registers::zeroed();
        regs.set_b(0x12);
        regs.set_c(0x34);
        assert_eq!(regs.bc(), 0x1234);

        regs.set_hl(0xBEEF);
        assert_eq!(regs.h(), 0xBE);
        assert_eq!(regs.l(), 0xEF);

        regs.set_e(0x99);
        regs.set_de(regs.de().wrapping_add(1));
        assert_eq!(regs.e(), 0x9A);
    }

    #[test]
    fn f_low_nibble_always_zero() {
        let mut regs = Registers::zeroed();
        regs.set_f(0xFF);
        assert_eq!(regs.f(), 0xF0);

        regs.set_af(0x12FF);
        assert_eq!(regs.a(), 0x12);
        assert_eq!(regs.af(), 0x12F0);

        regs.set_flag(0x0F, true);
        assert_eq!(regs.f() & 0x0F, 0);
    }

    #[test]
    fn flag_helpers_toggle_single_bits() {
        let mut regs = Registers::zeroed();
        regs.set_flag(FLAG_Z, true);
        regs.set_flag(FLAG_C, true);
        assert_eq!(regs.f(), FLAG_Z | FLAG_C);
        regs.set_flag(FLAG_Z, false);
        assert!(!regs.flag(FLAG_Z));
        assert!(regs.flag(FLAG_C));
    }
}
