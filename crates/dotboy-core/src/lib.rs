//! Cycle-stepped DMG Game Boy emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU, bus, PPU,
//! timer, cartridge). Frontends drive it through the [`gameboy`] facade and
//! read back the shade-indexed frame buffer.

/// Cartridge header parsing, mappers and the built-in boot program.
pub mod cartridge;

/// SM83 CPU core.
pub mod cpu;

/// High-level facade that wires the CPU, bus, timer and PPU into one machine.
pub mod gameboy;

/// Joypad register and button state.
pub mod input;

/// Internal RAM/I-O backing store and interrupt plumbing.
pub mod memory;

/// Memory map and address decoding.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Register file with overlapping 8/16-bit views.
pub mod registers;

/// Divider/timer unit.
pub mod timer;

pub use cartridge::CartridgeError;
pub use gameboy::{BootMode, GameBoy, LoadReport};
pub use input::Button;
