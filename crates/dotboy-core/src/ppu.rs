use std::collections::VecDeque;

#[cfg(feature = "ppu-trace")]
use log::trace;

use crate::memory::{
    BGP, InternalMemory, Interrupt, LCDC, LY, LYC, OBP0, OBP1, SCX, SCY, STAT, WX, WY,
};

// Screen resolution used by the PPU
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Timing in dots (4 per CPU cycle)
pub const DOTS_PER_LINE: u32 = 456;
pub const LINES_PER_FRAME: u8 = 154;
pub const DOTS_PER_FRAME: u32 = DOTS_PER_LINE * LINES_PER_FRAME as u32;
const OAM_SCAN_DOTS: u32 = 80;
const FETCH_STAGE_DOTS: u8 = 2;
const SPRITE_FETCH_DOTS: u8 = 4 * FETCH_STAGE_DOTS;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sprite {
    y: u8,
    x: u8,
    tile: u8,
    flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Background,
    Window,
}

/// Background/window tile fetcher. Stages 0-2 (tile id, low byte, high
/// byte) take two dots each; stage 3 pushes as soon as the FIFO has room.
#[derive(Debug, Clone, Copy)]
struct Fetcher {
    kind: FetchKind,
    stage: u8,
    dots: u8,
    tile_x: u8,
    tile_id: u8,
    fine_y: u8,
    lo: u8,
    hi: u8,
}

impl Fetcher {
    fn new(kind: FetchKind) -> Self {
        Self {
            kind,
            stage: 0,
            dots: 0,
            tile_x: 0,
            tile_id: 0,
            fine_y: 0,
            lo: 0,
            hi: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SpriteFetch {
    sprite: Sprite,
    dots: u8,
}

#[derive(Debug, Clone, Copy)]
struct FifoPixel {
    /// Color index before palette translation.
    raw: u8,
    shade: u8,
    sprite: bool,
}

pub struct Ppu {
    vram: Box<[u8; VRAM_SIZE]>,
    oam: [u8; OAM_SIZE],
    framebuffer: Box<[u8; SCREEN_WIDTH * SCREEN_HEIGHT]>,

    mode: Mode,
    line_dots: u32,
    ly: u8,
    lcd_on: bool,

    /// Sprites selected by the OAM scan, in OAM order
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    sprite_done: [bool; MAX_SPRITES_PER_LINE],

    fetcher: Fetcher,
    sprite_fetch: Option<SpriteFetch>,
    fifo: VecDeque<FifoPixel>,
    lx: u8,
    discard: u8,

    /// Internal window line counter
    window_line: u8,
    /// Set once the window has been drawn this frame; cleared at V-blank.
    window_engaged: bool,
    wy_reached: bool,

    stat_line: bool,
    frame_ready: bool,
    frames: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: Box::new([0; VRAM_SIZE]),
            oam: [0; OAM_SIZE],
            framebuffer: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            mode: Mode::HBlank,
            line_dots: 0,
            ly: 0,
            lcd_on: false,
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            sprite_done: [false; MAX_SPRITES_PER_LINE],
            fetcher: Fetcher::new(FetchKind::Background),
            sprite_fetch: None,
            fifo: VecDeque::with_capacity(16),
            lx: 0,
            discard: 0,
            window_line: 0,
            window_engaged: false,
            wy_reached: false,
            stat_line: false,
            frame_ready: false,
            frames: 0,
        }
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        debug_assert!((0x8000..=0x9FFF).contains(&addr));
        self.vram[(addr - 0x8000) as usize]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        debug_assert!((0x8000..=0x9FFF).contains(&addr));
        self.vram[(addr - 0x8000) as usize] = val;
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        debug_assert!((0xFE00..=0xFE9F).contains(&addr));
        self.oam[(addr - 0xFE00) as usize]
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        debug_assert!((0xFE00..=0xFE9F).contains(&addr));
        self.oam[(addr - 0xFE00) as usize] = val;
    }

    /// Shade (0-3) of every pixel in the last drawn frame, row-major.
    pub fn framebuffer(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn window_line_counter(&self) -> u8 {
        self.window_line
    }

    /// Advance by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u32, mem: &mut InternalMemory) {
        for _ in 0..cycles * 4 {
            if mem.read(LCDC) & 0x80 == 0 {
                if self.lcd_on {
                    self.lcd_off(mem);
                }
                continue;
            }
            if !self.lcd_on {
                self.lcd_on = true;
                self.line_dots = 0;
                self.set_ly(0, mem);
                self.begin_line(mem);
            }
            self.dot(mem);
        }
    }

    fn lcd_off(&mut self, mem: &mut InternalMemory) {
        self.lcd_on = false;
        self.line_dots = 0;
        self.fifo.clear();
        self.sprite_fetch = None;
        self.window_line = 0;
        self.window_engaged = false;
        self.wy_reached = false;
        self.stat_line = false;
        self.set_ly(0, mem);
        self.set_mode(Mode::HBlank, mem);
        let stat = mem.read(STAT);
        mem.write(STAT, stat & 0x78);
    }

    fn dot(&mut self, mem: &mut InternalMemory) {
        self.line_dots += 1;
        match self.mode {
            Mode::OamScan => {
                if self.line_dots == OAM_SCAN_DOTS {
                    self.oam_scan(mem.read(LCDC));
                    self.start_transfer(mem);
                }
            }
            Mode::Transfer => self.transfer_dot(mem),
            Mode::HBlank | Mode::VBlank => {}
        }

        if self.line_dots == DOTS_PER_LINE {
            self.line_dots = 0;
            self.next_line(mem);
        }
        self.update_stat(mem);
    }

    fn set_mode(&mut self, mode: Mode, mem: &mut InternalMemory) {
        #[cfg(feature = "ppu-trace")]
        trace!("PPU mode {:?} -> {:?} at LY={}", self.mode, mode, self.ly);
        self.mode = mode;
        self.update_stat(mem);
    }

    fn set_ly(&mut self, ly: u8, mem: &mut InternalMemory) {
        self.ly = ly;
        mem.write(LY, ly);
    }

    fn begin_line(&mut self, mem: &mut InternalMemory) {
        if self.ly == mem.read(WY) {
            self.wy_reached = true;
        }
        self.set_mode(Mode::OamScan, mem);
    }

    fn next_line(&mut self, mem: &mut InternalMemory) {
        if self.window_engaged {
            self.window_line = self.window_line.wrapping_add(1);
        }

        let ly = self.ly + 1;
        if ly as usize == SCREEN_HEIGHT {
            self.set_ly(ly, mem);
            self.window_line = 0;
            self.window_engaged = false;
            self.wy_reached = false;
            self.set_mode(Mode::VBlank, mem);
            mem.request_interrupt(Interrupt::VBlank);
        } else if ly == LINES_PER_FRAME {
            self.set_ly(0, mem);
            self.frame_ready = true;
            self.frames = self.frames.wrapping_add(1);
            self.begin_line(mem);
        } else if self.mode == Mode::VBlank {
            self.set_ly(ly, mem);
        } else {
            self.set_ly(ly, mem);
            self.begin_line(mem);
        }
    }

    /// Recompute the mode and coincidence bits and raise STAT on a rising
    /// edge of the combined interrupt line.
    fn update_stat(&mut self, mem: &mut InternalMemory) {
        let stat = mem.read(STAT);
        let coincidence = self.ly == mem.read(LYC);
        let status = (stat & 0x78) | (if coincidence { 0x04 } else { 0 }) | self.mode as u8;
        mem.write(STAT, status);

        let mode_signal = match self.mode {
            Mode::HBlank => stat & 0x08 != 0,
            Mode::VBlank => stat & 0x10 != 0,
            Mode::OamScan => stat & 0x20 != 0,
            Mode::Transfer => false,
        };
        let line = mode_signal || (coincidence && stat & 0x40 != 0);
        if line && !self.stat_line {
            mem.request_interrupt(Interrupt::Stat);
        }
        self.stat_line = line;
    }

    /// Collect up to 10 sprites visible on the current scanline.
    fn oam_scan(&mut self, lcdc: u8) {
        let height: i16 = if lcdc & 0x04 != 0 { 16 } else { 8 };
        let ly = self.ly as i16;
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let sprite = Sprite {
                y: self.oam[base],
                x: self.oam[base + 1],
                tile: self.oam[base + 2],
                flags: self.oam[base + 3],
            };
            let top = sprite.y as i16 - 16;
            if sprite.x > 0 && ly >= top && ly < top + height {
                self.line_sprites[self.sprite_count] = sprite;
                self.sprite_count += 1;
            }
        }
    }

    fn start_transfer(&mut self, mem: &mut InternalMemory) {
        self.fifo.clear();
        self.fetcher = Fetcher::new(FetchKind::Background);
        self.sprite_fetch = None;
        self.sprite_done = [false; MAX_SPRITES_PER_LINE];
        self.lx = 0;
        self.discard = mem.read(SCX) & 0x07;
        self.set_mode(Mode::Transfer, mem);
    }

    fn transfer_dot(&mut self, mem: &mut InternalMemory) {
        if let Some(fetch) = self.sprite_fetch.as_mut() {
            fetch.dots += 1;
            if fetch.dots == SPRITE_FETCH_DOTS {
                let sprite = fetch.sprite;
                self.sprite_fetch = None;
                self.merge_sprite(sprite, mem);
            }
            return;
        }

        let lcdc = mem.read(LCDC);
        self.step_fetcher(lcdc, mem);

        if self.fifo.len() <= 8 {
            return;
        }

        if self.discard == 0 {
            let wx = mem.read(WX);
            if lcdc & 0x20 != 0
                && self.wy_reached
                && self.fetcher.kind == FetchKind::Background
                && wx <= WINDOW_X_MAX
                && self.lx as u16 + 7 >= wx as u16
            {
                self.fifo.clear();
                self.fetcher = Fetcher::new(FetchKind::Window);
                self.window_engaged = true;
                // WX below 7 shifts the window partly off the left edge.
                self.discard = 7u8.saturating_sub(wx);
                return;
            }

            if lcdc & 0x02 != 0 {
                let lx = self.lx as u16;
                let next = (0..self.sprite_count).find(|&i| {
                    !self.sprite_done[i] && self.line_sprites[i].x as u16 <= lx + 8
                });
                if let Some(i) = next {
                    self.sprite_done[i] = true;
                    self.sprite_fetch = Some(SpriteFetch {
                        sprite: self.line_sprites[i],
                        dots: 0,
                    });
                    return;
                }
            }
        }

        let Some(pixel) = self.fifo.pop_front() else {
            return;
        };
        if self.discard > 0 {
            self.discard -= 1;
            return;
        }

        let idx = self.ly as usize * SCREEN_WIDTH + self.lx as usize;
        self.framebuffer[idx] = pixel.shade;
        self.lx += 1;
        if self.lx as usize == SCREEN_WIDTH {
            self.fifo.clear();
            self.set_mode(Mode::HBlank, mem);
        }
    }

    fn step_fetcher(&mut self, lcdc: u8, mem: &InternalMemory) {
        if self.fetcher.stage < 3 {
            self.fetcher.dots += 1;
            if self.fetcher.dots < FETCH_STAGE_DOTS {
                return;
            }
            self.fetcher.dots = 0;
            match self.fetcher.stage {
                0 => self.fetch_tile_id(lcdc, mem),
                1 => self.fetcher.lo = self.vram_byte(self.tile_row_addr(lcdc)),
                _ => self.fetcher.hi = self.vram_byte(self.tile_row_addr(lcdc) + 1),
            }
            self.fetcher.stage += 1;
        } else if self.fifo.len() <= 8 {
            let bgp = mem.read(BGP);
            let bg_on = lcdc & 0x01 != 0;
            for bit in (0..8).rev() {
                let pixel = if bg_on {
                    let raw =
                        (((self.fetcher.hi >> bit) & 1) << 1) | ((self.fetcher.lo >> bit) & 1);
                    FifoPixel {
                        raw,
                        shade: shade(bgp, raw),
                        sprite: false,
                    }
                } else {
                    // BG/window disabled: blank, bypassing BGP.
                    FifoPixel {
                        raw: 0,
                        shade: 0,
                        sprite: false,
                    }
                };
                self.fifo.push_back(pixel);
            }
            self.fetcher.tile_x = self.fetcher.tile_x.wrapping_add(1);
            self.fetcher.stage = 0;
        }
    }

    fn fetch_tile_id(&mut self, lcdc: u8, mem: &InternalMemory) {
        let (map_base, column, y) = match self.fetcher.kind {
            FetchKind::Background => {
                let column = (self.fetcher.tile_x as u16 + (mem.read(SCX) / 8) as u16) & 31;
                let y = self.ly.wrapping_add(mem.read(SCY));
                let base = if lcdc & 0x08 != 0 { 0x9C00 } else { 0x9800 };
                (base, column, y)
            }
            FetchKind::Window => {
                let column = self.fetcher.tile_x as u16 & 31;
                let base = if lcdc & 0x40 != 0 { 0x9C00 } else { 0x9800 };
                (base, column, self.window_line)
            }
        };
        self.fetcher.fine_y = y & 0x07;
        self.fetcher.tile_id = self.vram_byte(map_base + (y as u16 / 8) * 32 + column);
    }

    fn tile_row_addr(&self, lcdc: u8) -> u16 {
        let id = self.fetcher.tile_id;
        let base = if lcdc & 0x10 != 0 {
            0x8000 + id as u16 * 16
        } else {
            (0x9000i32 + (id as i8) as i32 * 16) as u16
        };
        base + self.fetcher.fine_y as u16 * 2
    }

    fn vram_byte(&self, addr: u16) -> u8 {
        self.vram[(addr & 0x1FFF) as usize]
    }

    fn merge_sprite(&mut self, sprite: Sprite, mem: &InternalMemory) {
        let lcdc = mem.read(LCDC);
        let tall = lcdc & 0x04 != 0;
        let height: i16 = if tall { 16 } else { 8 };
        let mut row = self.ly as i16 - (sprite.y as i16 - 16);
        if sprite.flags & 0x40 != 0 {
            row = height - 1 - row;
        }
        let tile = if tall {
            (sprite.tile & 0xFE) + (row >= 8) as u8
        } else {
            sprite.tile
        };
        let addr = 0x8000 + tile as u16 * 16 + (row as u16 & 0x07) * 2;
        let lo = self.vram_byte(addr);
        let hi = self.vram_byte(addr + 1);

        let palette = if sprite.flags & 0x10 != 0 {
            mem.read(OBP1)
        } else {
            mem.read(OBP0)
        };
        let behind_bg = sprite.flags & 0x80 != 0;
        let x_flip = sprite.flags & 0x20 != 0;

        for i in 0..8i16 {
            let pos = sprite.x as i16 - 8 + i - self.lx as i16;
            if pos < 0 {
                continue;
            }
            let bit = if x_flip { i } else { 7 - i };
            let raw = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
            if raw == 0 {
                continue;
            }
            let Some(slot) = self.fifo.get_mut(pos as usize) else {
                continue;
            };
            if slot.sprite {
                continue;
            }
            if behind_bg && slot.raw != 0 {
                // Still owned by this sprite so lower priority ones stay hidden.
                slot.sprite = true;
                continue;
            }
            *slot = FifoPixel {
                raw,
                shade: shade(palette, raw),
                sprite: true,
            };
        }
    }
}

fn shade(palette: u8, color: u8) -> u8 {
    (palette >> (color * 2)) & 0x03
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::IF;

    fn lcd_memory(lcdc: u8) -> InternalMemory {
        let mut mem = InternalMemory::new();
        mem.write(LCDC, lcdc);
        mem.write(BGP, 0xE4);
        mem.write(OBP0, 0xE4);
        mem.write(OBP1, 0x1B);
        mem
    }

    fn run_to_frame(ppu: &mut Ppu, mem: &mut InternalMemory) {
        ppu.clear_frame_flag();
        while !ppu.frame_ready() {
            ppu.tick(1, mem);
        }
    }

    fn solid_tile(ppu: &mut Ppu, tile: u16, lo: u8, hi: u8) {
        for row in 0..8 {
            ppu.write_vram(0x8000 + tile * 16 + row * 2, lo);
            ppu.write_vram(0x8000 + tile * 16 + row * 2 + 1, hi);
        }
    }

    fn place_sprite(ppu: &mut Ppu, slot: u16, y: u8, x: u8, tile: u8, flags: u8) {
        let base = 0xFE00 + slot * 4;
        ppu.write_oam(base, y);
        ppu.write_oam(base + 1, x);
        ppu.write_oam(base + 2, tile);
        ppu.write_oam(base + 3, flags);
    }

    #[test]
    fn frame_is_154_lines_of_456_dots() {
        let mut mem = lcd_memory(0x91);
        let mut ppu = Ppu::new();
        run_to_frame(&mut ppu, &mut mem);

        ppu.clear_frame_flag();
        mem.write(IF, 0);
        let mut dots = 0u32;
        let mut vblanks = 0;
        while !ppu.frame_ready() {
            ppu.dot(&mut mem);
            dots += 1;
            if mem.read(IF) & 0x01 != 0 {
                vblanks += 1;
                assert_eq!(ppu.ly(), 144);
                assert_eq!(ppu.mode(), Mode::VBlank);
                mem.write(IF, 0);
            }
        }
        assert_eq!(dots, DOTS_PER_FRAME);
        assert_eq!(vblanks, 1);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), Mode::OamScan);
    }

    #[test]
    fn every_row_gets_160_pixels_with_scroll_window_and_sprites() {
        let mut mem = lcd_memory(0xF3);
        mem.write(SCX, 5);
        mem.write(SCY, 3);
        mem.write(WY, 40);
        mem.write(WX, 60);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 1, 0xAA, 0x55);
        solid_tile(&mut ppu, 2, 0xFF, 0x00);
        for i in 0..0x400 {
            ppu.write_vram(0x9800 + i, (i % 3) as u8);
            ppu.write_vram(0x9C00 + i, 2);
        }
        // Ten sprites on the same lines, plus some clipped at both edges.
        for slot in 0..10u16 {
            place_sprite(&mut ppu, slot, 50, 3 + slot as u8 * 17, 2, (slot as u8 & 1) << 5);
        }
        place_sprite(&mut ppu, 10, 100, 1, 2, 0x80);
        place_sprite(&mut ppu, 11, 100, 167, 2, 0x10);

        run_to_frame(&mut ppu, &mut mem);
        ppu.framebuffer.fill(0xFF);
        run_to_frame(&mut ppu, &mut mem);

        for row in 0..SCREEN_HEIGHT {
            let line = &ppu.framebuffer[row * SCREEN_WIDTH..(row + 1) * SCREEN_WIDTH];
            assert!(line.iter().all(|&p| p <= 3), "row {row} has unwritten pixels");
        }
    }

    #[test]
    fn sprite_draws_over_transparent_background() {
        let mut mem = lcd_memory(0x93);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        place_sprite(&mut ppu, 0, 16, 8, 1, 0x00);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert!(ppu.framebuffer[..8].iter().all(|&p| p == 3));
        assert_eq!(ppu.framebuffer[8], 0);
        assert!(ppu.framebuffer[8 * SCREEN_WIDTH..9 * SCREEN_WIDTH].iter().all(|&p| p == 0));
    }

    #[test]
    fn sprite_behind_opaque_background_is_hidden() {
        let mut mem = lcd_memory(0x93);
        let mut ppu = Ppu::new();
        // BG tile 0 is color 1 everywhere, sprite tile 1 is color 3.
        solid_tile(&mut ppu, 0, 0xFF, 0x00);
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        place_sprite(&mut ppu, 0, 16, 8, 1, 0x80);
        place_sprite(&mut ppu, 1, 16, 20, 1, 0x10);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert!(ppu.framebuffer[..8].iter().all(|&p| p == 1));
        // OBP1 = 0x1B maps color 3 to shade 0.
        assert!(ppu.framebuffer[12..20].iter().all(|&p| p == 0));
    }

    #[test]
    fn sub_tile_scroll_discards_leading_pixels() {
        let mut mem = lcd_memory(0x91);
        mem.write(SCX, 3);
        let mut ppu = Ppu::new();
        // Tile 1 has only its leftmost column set to color 3.
        solid_tile(&mut ppu, 1, 0x80, 0x80);
        ppu.write_vram(0x9801, 1);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[4], 0);
        assert_eq!(ppu.framebuffer[5], 3);
        assert_eq!(ppu.framebuffer[6], 0);
    }

    #[test]
    fn window_uses_own_line_counter() {
        let mut mem = lcd_memory(0xF1);
        mem.write(WY, 100);
        mem.write(WX, 7);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        // Window map row 0 is tile 1, row 1 stays tile 0.
        for i in 0..32 {
            ppu.write_vram(0x9C00 + i, 1);
        }

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[99 * SCREEN_WIDTH], 0);
        assert_eq!(ppu.framebuffer[100 * SCREEN_WIDTH], 3);
        assert_eq!(ppu.framebuffer[107 * SCREEN_WIDTH + 159], 3);
        assert_eq!(ppu.framebuffer[108 * SCREEN_WIDTH], 0);
    }

    #[test]
    fn lyc_match_raises_stat_once_per_frame() {
        let mut mem = lcd_memory(0x91);
        mem.write(LYC, 5);
        mem.write(STAT, 0x40);
        let mut ppu = Ppu::new();
        run_to_frame(&mut ppu, &mut mem);

        mem.write(IF, 0);
        let mut count = 0;
        ppu.clear_frame_flag();
        while !ppu.frame_ready() {
            ppu.tick(1, &mut mem);
            if mem.read(IF) & 0x02 != 0 {
                count += 1;
                assert_eq!(ppu.ly(), 5);
                mem.write(IF, 0);
            }
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn lcd_off_holds_line_zero_in_hblank() {
        let mut mem = lcd_memory(0x91);
        let mut ppu = Ppu::new();
        ppu.tick(1000, &mut mem);
        assert_ne!(ppu.ly(), 0);

        mem.write(LCDC, 0x11);
        ppu.tick(5000, &mut mem);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(mem.read(LY), 0);
        assert_eq!(ppu.mode(), Mode::HBlank);
        assert_eq!(mem.read(STAT) & 0x03, 0);

        mem.write(LCDC, 0x91);
        ppu.tick(1, &mut mem);
        assert_eq!(ppu.mode(), Mode::OamScan);
        assert_eq!(ppu.ly(), 0);
    }

    #[test]
    fn window_counter_keeps_running_on_lines_without_window() {
        let mut mem = lcd_memory(0xF1);
        mem.write(WY, 0);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        // Window map row 0 is tile 1, every later row is tile 0.
        for i in 0..32 {
            ppu.write_vram(0x9C00 + i, 1);
        }

        for _ in 0..2 {
            ppu.clear_frame_flag();
            while !ppu.frame_ready() {
                // Push the window off screen on lines 4-7 only.
                let wx = if (4..8).contains(&ppu.ly()) { 200 } else { 7 };
                mem.write(WX, wx);
                ppu.tick(1, &mut mem);
            }
        }

        assert_eq!(ppu.framebuffer[3 * SCREEN_WIDTH], 3);
        assert_eq!(ppu.framebuffer[5 * SCREEN_WIDTH], 0);
        // Counter reached 8 on line 8, so map row 1 is drawn.
        assert_eq!(ppu.framebuffer[8 * SCREEN_WIDTH], 0);
        assert_eq!(ppu.window_line_counter(), 0);
    }

    #[test]
    fn signed_tile_addressing_uses_9000_base() {
        let mut mem = lcd_memory(0x81);
        let mut ppu = Ppu::new();
        for row in 0..8u16 {
            // Tile 0 at 0x9000 is color 3, tile 0x80 at 0x8800 is color 1.
            ppu.write_vram(0x9000 + row * 2, 0xFF);
            ppu.write_vram(0x9001 + row * 2, 0xFF);
            ppu.write_vram(0x8800 + row * 2, 0xFF);
        }
        // Unsigned tile 0 would be color 2.
        solid_tile(&mut ppu, 0, 0x00, 0xFF);
        ppu.write_vram(0x9801, 0x80);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[0], 3);
        assert_eq!(ppu.framebuffer[8], 1);
        assert_eq!(ppu.framebuffer[16], 3);
    }

    #[test]
    fn tall_sprite_ignores_low_tile_bit() {
        let mut mem = lcd_memory(0x97);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 2, 0xFF, 0x00);
        solid_tile(&mut ppu, 3, 0x00, 0xFF);
        place_sprite(&mut ppu, 0, 16, 8, 3, 0x00);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[0], 1);
        assert_eq!(ppu.framebuffer[7 * SCREEN_WIDTH], 1);
        assert_eq!(ppu.framebuffer[8 * SCREEN_WIDTH], 2);
        assert_eq!(ppu.framebuffer[15 * SCREEN_WIDTH + 7], 2);
        assert_eq!(ppu.framebuffer[16 * SCREEN_WIDTH], 0);
    }

    #[test]
    fn tall_sprite_vertical_flip_swaps_halves() {
        let mut mem = lcd_memory(0x97);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 2, 0xFF, 0x00);
        solid_tile(&mut ppu, 3, 0x00, 0xFF);
        place_sprite(&mut ppu, 0, 16, 8, 2, 0x40);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[0], 2);
        assert_eq!(ppu.framebuffer[8 * SCREEN_WIDTH], 1);
    }

    #[test]
    fn sprite_vertical_flip_reverses_rows() {
        let mut mem = lcd_memory(0x93);
        let mut ppu = Ppu::new();
        // Only the top row of tile 1 is opaque.
        ppu.write_vram(0x8010, 0xFF);
        ppu.write_vram(0x8011, 0xFF);
        place_sprite(&mut ppu, 0, 16, 8, 1, 0x00);
        place_sprite(&mut ppu, 1, 16, 24, 1, 0x40);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert_eq!(ppu.framebuffer[0], 3);
        assert_eq!(ppu.framebuffer[7 * SCREEN_WIDTH], 0);
        assert_eq!(ppu.framebuffer[16], 0);
        assert_eq!(ppu.framebuffer[7 * SCREEN_WIDTH + 16], 3);
    }

    #[test]
    fn eleventh_sprite_on_a_line_is_dropped() {
        let mut mem = lcd_memory(0x93);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        for slot in 0..11u16 {
            place_sprite(&mut ppu, slot, 16, 8 + slot as u8 * 12, 1, 0x00);
        }

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        for slot in 0..10 {
            assert_eq!(ppu.framebuffer[slot * 12], 3, "sprite {slot}");
        }
        assert_eq!(ppu.framebuffer[120], 0);
        assert_eq!(ppu.framebuffer[127], 0);
    }

    fn stat_interrupts_per_frame(stat: u8) -> u32 {
        let mut mem = lcd_memory(0x91);
        mem.write(STAT, stat);
        let mut ppu = Ppu::new();
        run_to_frame(&mut ppu, &mut mem);

        mem.write(IF, 0);
        let mut count = 0;
        ppu.clear_frame_flag();
        while !ppu.frame_ready() {
            ppu.tick(1, &mut mem);
            if mem.read(IF) & 0x02 != 0 {
                count += 1;
                mem.write(IF, 0);
            }
        }
        count
    }

    #[test]
    fn mode_stat_sources_fire_on_entry() {
        assert_eq!(stat_interrupts_per_frame(0x08), 144);
        assert_eq!(stat_interrupts_per_frame(0x10), 1);
        assert_eq!(stat_interrupts_per_frame(0x20), 144);
        assert_eq!(stat_interrupts_per_frame(0x00), 0);
    }

    #[test]
    fn disabled_background_is_blank_regardless_of_palette() {
        let mut mem = lcd_memory(0x92);
        // Color 0 maps to shade 3.
        mem.write(BGP, 0xE7);
        let mut ppu = Ppu::new();
        solid_tile(&mut ppu, 0, 0xFF, 0xFF);
        solid_tile(&mut ppu, 1, 0xFF, 0xFF);
        place_sprite(&mut ppu, 0, 32, 8, 1, 0x80);

        run_to_frame(&mut ppu, &mut mem);
        run_to_frame(&mut ppu, &mut mem);

        assert!(ppu.framebuffer[..SCREEN_WIDTH].iter().all(|&p| p == 0));
        // Nothing to hide behind, so a behind-BG sprite still shows.
        assert_eq!(ppu.framebuffer[16 * SCREEN_WIDTH], 3);
        assert_eq!(ppu.framebuffer[16 * SCREEN_WIDTH + 8], 0);
    }
}
