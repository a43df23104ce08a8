use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dotboy_core::{
    BootMode, GameBoy,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};
use image::{ImageFormat, Rgb, RgbImage};
use log::{debug, info};

const DEFAULT_FRAMES: u64 = 60;

/// Shade 0 (lightest) through 3 (darkest).
const DMG_PALETTE: [[u8; 3]; 4] = [
    [0xE0, 0xF8, 0xD0],
    [0x88, 0xC0, 0x70],
    [0x34, 0x68, 0x56],
    [0x08, 0x18, 0x20],
];

#[derive(Parser)]
#[command(version, about = "Headless DMG Game Boy runner")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Number of CPU cycles to run instead of whole frames
    #[arg(long, conflicts_with = "frames")]
    cycles: Option<u64>,

    /// Run the built-in boot program instead of starting at 0x0100
    #[arg(long)]
    boot: bool,

    /// Write the last completed frame to a PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Enable debug logging of CPU state and serial output
    #[arg(long)]
    debug: bool,

    /// Print captured serial output on exit
    #[arg(long)]
    serial: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let rom = std::fs::read(&args.rom)
        .with_context(|| format!("failed to read {}", args.rom.display()))?;

    let boot_mode = if args.boot {
        BootMode::BuiltIn
    } else {
        BootMode::Skip
    };
    let mut gb = GameBoy::with_boot(boot_mode);
    gb.load_rom(rom)
        .with_context(|| format!("failed to load {}", args.rom.display()))?;

    let mut serial = Vec::new();
    match args.cycles {
        Some(cycles) => {
            let ran = gb.run_cycles(cycles);
            serial.extend(gb.take_serial());
            debug!("Ran {ran} cycles");
        }
        None => {
            let frames = args.frames.unwrap_or(DEFAULT_FRAMES);
            for frame in 0..frames {
                if !gb.run_frame() {
                    debug!("Frame {frame} did not complete, LCD is off");
                }
                serial.extend(gb.take_serial());
                if frame % 60 == 0 {
                    debug!("{}", gb.cpu.debug_state());
                }
            }
        }
    }
    info!("Stopped after {} frames: {}", gb.frames(), gb.cpu.debug_state());

    if args.serial {
        println!("{}", format_serial(&serial));
    }

    if let Some(path) = &args.screenshot {
        save_screenshot(gb.framebuffer(), path)?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

/// Printable ASCII passes through, anything else is shown as `\xNN`.
fn format_serial(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' || b == b'\n' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}

fn frame_to_image(frame: &[u8; SCREEN_WIDTH * SCREEN_HEIGHT]) -> RgbImage {
    RgbImage::from_fn(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, |x, y| {
        let shade = frame[y as usize * SCREEN_WIDTH + x as usize] & 0x03;
        Rgb(DMG_PALETTE[shade as usize])
    })
}

fn save_screenshot(frame: &[u8; SCREEN_WIDTH * SCREEN_HEIGHT], path: &Path) -> Result<()> {
    frame_to_image(frame)
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}
