//! Mode 3: pixel transfer. Drives the fetcher, discards the sub-tile
//! scroll amount, splices in sprites and the window, and pushes resolved
//! pixels to the display until the line's 160th pixel.

use pocketboy_common::Color;

use crate::display::Display;

use super::fetcher::Fetcher;
use super::fifo::{PixelEntry, PixelFifo, PixelSource};
use super::palette::{dmg_shade, ColorPalette};
use super::{LcdRegs, SpriteEntry, VideoMem, MAX_LINE_SPRITES, SCREEN_WIDTH_U8};

#[derive(Clone)]
pub(crate) struct PixelTransferPhase {
    fifo: PixelFifo,
    fetcher: Fetcher,
    /// Next screen X to emit, 0..160.
    x: u8,
    /// Pixels still to discard for SCX % 8 fine scroll.
    to_drop: u8,
    sprites: [SpriteEntry; MAX_LINE_SPRITES],
    sprite_count: u8,
    /// Sprites already fetched (or skipped while disabled) this line.
    sprite_done: [bool; MAX_LINE_SPRITES],
    window_active: bool,
    /// The window contributed pixels this line; the window line counter
    /// advances when the phase completes.
    pub window_used: bool,
}

impl PixelTransferPhase {
    pub fn new(regs: &LcdRegs, sprites: [SpriteEntry; MAX_LINE_SPRITES], sprite_count: u8) -> Self {
        Self {
            fifo: PixelFifo::new(),
            fetcher: Fetcher::start_line(regs),
            x: 0,
            to_drop: regs.scx % 8,
            sprites,
            sprite_count,
            sprite_done: [false; MAX_LINE_SPRITES],
            window_active: false,
            window_used: false,
        }
    }

    /// Advance one dot. Returns false when the 160th pixel has been
    /// emitted and HBlank should begin.
    pub fn tick(
        &mut self,
        mem: &VideoMem<'_>,
        regs: &LcdRegs,
        window_line: u8,
        bg_palette: &ColorPalette,
        obj_palette: &ColorPalette,
        display: &mut dyn Display,
    ) -> bool {
        self.fetcher.tick(mem, regs, &mut self.fifo);
        if self.fetcher.sprite_in_progress() {
            return true;
        }
        if self.fifo.len() <= 8 {
            return true;
        }

        // Window start: switch the fetcher over and refill from the window
        // map before any further pixels leave the queue.
        if self.window_trigger(regs) {
            self.window_active = true;
            self.window_used = true;
            self.fifo.clear();
            self.fetcher.start_window(regs, window_line);
            return true;
        }

        // Sprite hit at this X pauses emission for the fetch.
        if let Some(slot) = self.next_sprite_slot() {
            if regs.lcdc & 0x02 != 0 {
                self.sprite_done[slot] = true;
                self.fetcher.start_sprite(self.sprites[slot]);
                return true;
            }
            // Sprites disabled: account for it and fall through.
            self.sprite_done[slot] = true;
        }

        let entry = self
            .fifo
            .pop()
            .expect("pixel transfer popped an empty FIFO");
        if self.to_drop > 0 {
            self.to_drop -= 1;
            return true;
        }

        display.put_pixel(resolve_color(regs, bg_palette, obj_palette, entry));
        self.x += 1;
        self.x < SCREEN_WIDTH_U8
    }

    fn window_trigger(&self, regs: &LcdRegs) -> bool {
        if self.window_active || regs.lcdc & 0x20 == 0 {
            return false;
        }
        if regs.ly < regs.wy || regs.wx >= 167 {
            return false;
        }
        self.x == regs.wx.saturating_sub(7)
    }

    fn next_sprite_slot(&self) -> Option<usize> {
        (0..self.sprite_count as usize)
            .find(|&i| !self.sprite_done[i] && self.sprites[i].x <= self.x + 8)
    }
}

fn resolve_color(
    regs: &LcdRegs,
    bg_palette: &ColorPalette,
    obj_palette: &ColorPalette,
    entry: PixelEntry,
) -> Color {
    match entry.source {
        PixelSource::Background { palette, .. } => {
            if regs.cgb {
                bg_palette.color(palette, entry.color)
            } else {
                Color::DMG_SHADES[dmg_shade(regs.bgp, entry.color) as usize]
            }
        }
        PixelSource::Sprite { obp1, palette, .. } => {
            if regs.cgb {
                obj_palette.color(palette, entry.color)
            } else {
                let reg = if obp1 { regs.obp1 } else { regs.obp0 };
                Color::DMG_SHADES[dmg_shade(reg, entry.color) as usize]
            }
        }
    }
}
