use log::debug;
#[cfg(feature = "cpu-trace")]
use log::trace;

use crate::{
    memory::{DIV, Interrupt},
    mmu::Mmu,
    registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Registers},
};

/// Machine clock in ticks per second; the cycle counter wraps here.
pub const CLOCK_HZ: u32 = 4_194_304;

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;
const BOOT_AF: u16 = 0x01B0;
const BOOT_BC: u16 = 0x0013;
const BOOT_DE: u16 = 0x00D8;
const BOOT_HL: u16 = 0x014D;

/// Cost of dispatching an interrupt (two wait states, two pushes, jump).
const INTERRUPT_CYCLES: u8 = 5;

// Extra cycles when a conditional branch is taken.
const JR_TAKEN: u8 = 1;
const JP_TAKEN: u8 = 1;
const CALL_TAKEN: u8 = 3;
const RET_TAKEN: u8 = 3;

/// Machine cycles per primary opcode. Conditional branches list the
/// not-taken cost. 0xCB is charged by the prefixed table instead. HALT
/// itself is free; the halted idle steps that follow cost one cycle each.
#[rustfmt::skip]
const OPCODE_CYCLES: [u8; 256] = [
//  0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
    1, 3, 2, 2, 1, 1, 2, 1, 5, 2, 2, 2, 1, 1, 2, 1, // 0x00
    1, 3, 2, 2, 1, 1, 2, 1, 3, 2, 2, 2, 1, 1, 2, 1, // 0x10
    2, 3, 2, 2, 1, 1, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 0x20
    2, 3, 2, 2, 3, 3, 3, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 0x30
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x40
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x50
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x60
    2, 2, 2, 2, 2, 2, 0, 2, 1, 1, 1, 1, 1, 1, 2, 1, // 0x70
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x80
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x90
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0xA0
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0xB0
    2, 3, 3, 4, 3, 4, 2, 4, 2, 4, 3, 1, 3, 6, 2, 4, // 0xC0
    2, 3, 3, 1, 3, 4, 2, 4, 2, 4, 3, 1, 3, 1, 2, 4, // 0xD0
    3, 3, 2, 1, 1, 4, 2, 4, 4, 1, 4, 1, 1, 1, 2, 4, // 0xE0
    3, 3, 2, 1, 1, 4, 2, 4, 3, 2, 4, 1, 1, 1, 2, 4, // 0xF0
];

pub struct Cpu {
    pub regs: Registers,
    /// Elapsed machine cycles, modulo [`CLOCK_HZ`].
    pub cycles: u32,
    pub ime: bool,
    pub halted: bool,
    /// EI was executed; IME turns on after the next instruction.
    ime_scheduled: bool,
}

impl Cpu {
    /// CPU as left by the boot ROM.
    pub fn new() -> Self {
        let mut regs = Registers::zeroed();
        regs.set_af(BOOT_AF);
        regs.set_bc(BOOT_BC);
        regs.set_de(BOOT_DE);
        regs.set_hl(BOOT_HL);
        regs.sp = BOOT_SP;
        regs.pc = BOOT_PC;
        Self {
            regs,
            cycles: 0,
            ime: false,
            halted: false,
            ime_scheduled: false,
        }
    }

    /// CPU at power-on, before any boot program has run.
    pub fn new_power_on() -> Self {
        Self {
            regs: Registers::zeroed(),
            cycles: 0,
            ime: false,
            halted: false,
            ime_scheduled: false,
        }
    }

    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.pc,
            self.regs.sp,
            self.cycles
        )
    }

    /// Execute one instruction, service one interrupt, or idle one cycle
    /// while halted. Returns the machine cycles consumed.
    pub fn step(&mut self, mmu: &mut Mmu) -> u8 {
        let cycles = self.step_inner(mmu);
        self.cycles = (self.cycles + cycles as u32) % CLOCK_HZ;
        cycles
    }

    fn step_inner(&mut self, mmu: &mut Mmu) -> u8 {
        let pending = mmu.pending_interrupts();
        if self.ime && pending != 0 {
            return self.service_interrupt(mmu, pending);
        }

        if self.halted {
            if pending == 0 {
                return 1;
            }
            // IME clear: wake up and carry on without dispatching.
            self.halted = false;
        }

        let enable_after = self.ime_scheduled;
        #[cfg(feature = "cpu-trace")]
        trace!("{}", self.debug_state());
        let opcode = self.fetch8(mmu);
        let cycles = self.execute(opcode, mmu);
        if enable_after && self.ime_scheduled {
            self.ime = true;
            self.ime_scheduled = false;
        }
        cycles
    }

    fn service_interrupt(&mut self, mmu: &mut Mmu, pending: u8) -> u8 {
        let Some(interrupt) = Interrupt::highest(pending) else {
            return 0;
        };
        self.ime = false;
        self.ime_scheduled = false;
        self.halted = false;
        mmu.set_interrupt_flag(interrupt, false);
        let pc = self.regs.pc;
        self.push_stack(mmu, pc);
        self.regs.pc = interrupt.vector();
        INTERRUPT_CYCLES
    }

    fn fetch8(&mut self, mmu: &Mmu) -> u8 {
        let val = mmu.read_byte(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mmu: &Mmu) -> u16 {
        let lo = self.fetch8(mmu);
        let hi = self.fetch8(mmu);
        u16::from_le_bytes([lo, hi])
    }

    fn push_stack(&mut self, mmu: &mut Mmu, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, lo);
    }

    fn pop_stack(&mut self, mmu: &Mmu) -> u16 {
        let lo = mmu.read_byte(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = mmu.read_byte(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    fn read_reg(&self, mmu: &Mmu, index: u8) -> u8 {
        match index {
            6 => mmu.read_byte(self.regs.hl()),
            _ => self.regs.get8(index),
        }
    }

    fn write_reg(&mut self, mmu: &mut Mmu, index: u8, val: u8) {
        match index {
            6 => mmu.write_byte(self.regs.hl(), val),
            _ => self.regs.set8(index, val),
        }
    }

    /// BC, DE, HL, SP by their opcode encoding.
    fn read_rr(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn write_rr(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.regs.set_bc(val),
            1 => self.regs.set_de(val),
            2 => self.regs.set_hl(val),
            _ => self.regs.sp = val,
        }
    }

    /// NZ, Z, NC, C.
    fn condition(&self, index: u8) -> bool {
        match index & 0x03 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            _ => self.regs.flag(FLAG_C),
        }
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.regs.set_f(
            if z { FLAG_Z } else { 0 }
                | if n { FLAG_N } else { 0 }
                | if h { FLAG_H } else { 0 }
                | if c { FLAG_C } else { 0 },
        );
    }

    /// ADD, ADC, SUB, SBC, AND, XOR, OR, CP on the accumulator.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs.a();
        let carry = self.regs.flag(FLAG_C) as u8;
        match op & 0x07 {
            0 | 1 => {
                let c = if op == 1 { carry } else { 0 };
                let res = a as u16 + val as u16 + c as u16;
                let h = (a & 0x0F) + (val & 0x0F) + c > 0x0F;
                self.regs.set_a(res as u8);
                self.set_flags(res as u8 == 0, false, h, res > 0xFF);
            }
            2 | 3 | 7 => {
                let c = if op == 3 { carry } else { 0 };
                let res = a.wrapping_sub(val).wrapping_sub(c);
                let h = (a & 0x0F) < (val & 0x0F) + c;
                let borrow = (a as u16) < val as u16 + c as u16;
                if op != 7 {
                    self.regs.set_a(res);
                }
                self.set_flags(res == 0, true, h, borrow);
            }
            4 => {
                let res = a & val;
                self.regs.set_a(res);
                self.set_flags(res == 0, false, true, false);
            }
            5 => {
                let res = a ^ val;
                self.regs.set_a(res);
                self.set_flags(res == 0, false, false, false);
            }
            _ => {
                let res = a | val;
                self.regs.set_a(res);
                self.set_flags(res == 0, false, false, false);
            }
        }
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.regs.hl();
        let h = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
        let c = hl as u32 + val as u32 > 0xFFFF;
        self.regs.set_hl(hl.wrapping_add(val));
        let z = self.regs.flag(FLAG_Z);
        self.set_flags(z, false, h, c);
    }

    /// SP plus a signed immediate, with flags from the low byte.
    fn sp_offset(&mut self, mmu: &Mmu) -> u16 {
        let sp = self.regs.sp;
        let val = self.fetch8(mmu) as i8 as i16 as u16;
        let h = (sp & 0x0F) + (val & 0x0F) > 0x0F;
        let c = (sp & 0xFF) + (val & 0xFF) > 0xFF;
        self.set_flags(false, false, h, c);
        sp.wrapping_add(val)
    }

    fn daa(&mut self) {
        let mut a = self.regs.a();
        let n = self.regs.flag(FLAG_N);
        let mut correction = 0u8;
        let mut carry = false;
        if self.regs.flag(FLAG_H) || (!n && (a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if self.regs.flag(FLAG_C) || (!n && a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        a = if n {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        self.regs.set_a(a);
        self.set_flags(a == 0, n, false, carry);
    }

    fn jr(&mut self, offset: u8) {
        self.regs.pc = self.regs.pc.wrapping_add(offset as i8 as u16);
    }

    fn call(&mut self, mmu: &mut Mmu, target: u16) {
        let ret = self.regs.pc;
        self.push_stack(mmu, ret);
        self.regs.pc = target;
    }

    fn execute(&mut self, opcode: u8, mmu: &mut Mmu) -> u8 {
        let mut cycles = OPCODE_CYCLES[opcode as usize];
        match opcode {
            0x00 => {}
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(mmu);
                self.write_rr(opcode >> 4, val);
            }
            0x02 | 0x12 | 0x22 | 0x32 => {
                let addr = self.indirect_addr(opcode);
                mmu.write_byte(addr, self.regs.a());
            }
            0x0A | 0x1A | 0x2A | 0x3A => {
                let addr = self.indirect_addr(opcode);
                let val = mmu.read_byte(addr);
                self.regs.set_a(val);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let idx = opcode >> 4;
                self.write_rr(idx, self.read_rr(idx).wrapping_add(1));
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let idx = opcode >> 4;
                self.write_rr(idx, self.read_rr(idx).wrapping_sub(1));
            }
            0x09 | 0x19 | 0x29 | 0x39 => self.add_hl(self.read_rr(opcode >> 4)),
            op if op & 0xC7 == 0x04 => {
                let r = (op >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = val.wrapping_add(1);
                self.write_reg(mmu, r, res);
                let c = self.regs.flag(FLAG_C);
                self.set_flags(res == 0, false, val & 0x0F == 0x0F, c);
            }
            op if op & 0xC7 == 0x05 => {
                let r = (op >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = val.wrapping_sub(1);
                self.write_reg(mmu, r, res);
                let c = self.regs.flag(FLAG_C);
                self.set_flags(res == 0, true, val & 0x0F == 0, c);
            }
            op if op & 0xC7 == 0x06 => {
                let val = self.fetch8(mmu);
                self.write_reg(mmu, (op >> 3) & 0x07, val);
            }
            0x07 => {
                let a = self.regs.a();
                self.regs.set_a(a.rotate_left(1));
                self.set_flags(false, false, false, a & 0x80 != 0);
            }
            0x0F => {
                let a = self.regs.a();
                self.regs.set_a(a.rotate_right(1));
                self.set_flags(false, false, false, a & 0x01 != 0);
            }
            0x17 => {
                let a = self.regs.a();
                let carry = self.regs.flag(FLAG_C) as u8;
                self.regs.set_a((a << 1) | carry);
                self.set_flags(false, false, false, a & 0x80 != 0);
            }
            0x1F => {
                let a = self.regs.a();
                let carry = self.regs.flag(FLAG_C) as u8;
                self.regs.set_a((a >> 1) | (carry << 7));
                self.set_flags(false, false, false, a & 0x01 != 0);
            }
            0x08 => {
                let addr = self.fetch16(mmu);
                let [hi, lo] = self.regs.sp.to_be_bytes();
                mmu.write_byte(addr, lo);
                mmu.write_byte(addr.wrapping_add(1), hi);
            }
            0x10 => {
                // STOP is two bytes; treated as a no-op apart from DIV.
                self.fetch8(mmu);
                mmu.write_byte(DIV, 0);
            }
            0x18 => {
                let offset = self.fetch8(mmu);
                self.jr(offset);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(mmu);
                if self.condition(opcode >> 3) {
                    self.jr(offset);
                    cycles += JR_TAKEN;
                }
            }
            0x27 => self.daa(),
            0x2F => {
                self.regs.set_a(!self.regs.a());
                self.regs.set_flag(FLAG_N | FLAG_H, true);
            }
            0x37 => {
                self.regs.set_flag(FLAG_N | FLAG_H, false);
                self.regs.set_flag(FLAG_C, true);
            }
            0x3F => {
                let c = self.regs.flag(FLAG_C);
                self.regs.set_flag(FLAG_N | FLAG_H, false);
                self.regs.set_flag(FLAG_C, !c);
            }
            0x76 => self.halted = true,
            0x40..=0x7F => {
                let val = self.read_reg(mmu, opcode & 0x07);
                self.write_reg(mmu, (opcode >> 3) & 0x07, val);
            }
            0x80..=0xBF => {
                let val = self.read_reg(mmu, opcode & 0x07);
                self.alu((opcode >> 3) & 0x07, val);
            }
            op if op & 0xC7 == 0xC6 => {
                let val = self.fetch8(mmu);
                self.alu((op >> 3) & 0x07, val);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(opcode >> 3) {
                    self.regs.pc = self.pop_stack(mmu);
                    cycles += RET_TAKEN;
                }
            }
            0xC9 => self.regs.pc = self.pop_stack(mmu),
            0xD9 => {
                self.regs.pc = self.pop_stack(mmu);
                self.ime = true;
                self.ime_scheduled = false;
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop_stack(mmu);
                match (opcode >> 4) & 0x03 {
                    3 => self.regs.set_af(val),
                    idx => self.write_rr(idx, val),
                }
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = match (opcode >> 4) & 0x03 {
                    3 => self.regs.af(),
                    idx => self.read_rr(idx),
                };
                self.push_stack(mmu, val);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let target = self.fetch16(mmu);
                if self.condition(opcode >> 3) {
                    self.regs.pc = target;
                    cycles += JP_TAKEN;
                }
            }
            0xC3 => self.regs.pc = self.fetch16(mmu),
            0xE9 => self.regs.pc = self.regs.hl(),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let target = self.fetch16(mmu);
                if self.condition(opcode >> 3) {
                    self.call(mmu, target);
                    cycles += CALL_TAKEN;
                }
            }
            0xCD => {
                let target = self.fetch16(mmu);
                self.call(mmu, target);
            }
            op if op & 0xC7 == 0xC7 => self.call(mmu, (op & 0x38) as u16),
            0xCB => {
                let cb = self.fetch8(mmu);
                cycles = self.execute_cb(cb, mmu);
            }
            0xE0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                mmu.write_byte(addr, self.regs.a());
            }
            0xF0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                let val = mmu.read_byte(addr);
                self.regs.set_a(val);
            }
            0xE2 => mmu.write_byte(0xFF00 | self.regs.c() as u16, self.regs.a()),
            0xF2 => {
                let val = mmu.read_byte(0xFF00 | self.regs.c() as u16);
                self.regs.set_a(val);
            }
            0xEA => {
                let addr = self.fetch16(mmu);
                mmu.write_byte(addr, self.regs.a());
            }
            0xFA => {
                let addr = self.fetch16(mmu);
                let val = mmu.read_byte(addr);
                self.regs.set_a(val);
            }
            0xE8 => self.regs.sp = self.sp_offset(mmu),
            0xF8 => {
                let val = self.sp_offset(mmu);
                self.regs.set_hl(val);
            }
            0xF9 => self.regs.sp = self.regs.hl(),
            0xF3 => {
                self.ime = false;
                self.ime_scheduled = false;
            }
            0xFB => self.ime_scheduled = true,
            _ => {
                debug!(
                    "Invalid opcode {opcode:02X} at {:04X}",
                    self.regs.pc.wrapping_sub(1)
                );
            }
        }
        cycles
    }

    /// (BC), (DE), (HL+), (HL-) for the 0x02/0x0A column.
    fn indirect_addr(&mut self, opcode: u8) -> u16 {
        match opcode >> 4 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            _ => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn execute_cb(&mut self, opcode: u8, mmu: &mut Mmu) -> u8 {
        let r = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        let val = self.read_reg(mmu, r);
        match opcode {
            0x00..=0x3F => {
                let carry_in = self.regs.flag(FLAG_C) as u8;
                let (res, carry_out) = match bit {
                    0 => (val.rotate_left(1), val & 0x80 != 0),
                    1 => (val.rotate_right(1), val & 0x01 != 0),
                    2 => ((val << 1) | carry_in, val & 0x80 != 0),
                    3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
                    4 => (val << 1, val & 0x80 != 0),
                    5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
                    6 => (val.rotate_left(4), false),
                    _ => (val >> 1, val & 0x01 != 0),
                };
                self.write_reg(mmu, r, res);
                self.set_flags(res == 0, false, false, carry_out);
            }
            0x40..=0x7F => {
                let c = self.regs.flag(FLAG_C);
                self.set_flags(val & (1 << bit) == 0, false, true, c);
                return if r == 6 { 3 } else { 2 };
            }
            0x80..=0xBF => self.write_reg(mmu, r, val & !(1 << bit)),
            _ => self.write_reg(mmu, r, val | (1 << bit)),
        }
        if r == 6 { 4 } else { 2 }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
