//! CGB VRAM DMA engine (HDMA1-5, 0xFF51-0xFF55).
//!
//! Two transfer modes: general DMA moves the whole block count in one
//! burst, HBlank DMA moves one 16-byte block per HBlank entry. While a
//! burst is in flight the CPU is excluded from the tick slot it shares
//! with this engine.

use crate::bus::AddressSpace;
use crate::ppu::Mode;

/// Ticks consumed per 16-byte block.
const TICKS_PER_BLOCK: u32 = 0x20;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TransferMode {
    General,
    HBlank,
}

/// A finished burst the scheduler must now copy into VRAM.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferRun {
    pub src: u16,
    pub dst: u16,
    pub blocks: u8,
}

pub struct Hdma {
    src: u16,
    dst: u16,
    /// Remaining 16-byte blocks of an armed transfer.
    blocks: u8,
    mode: TransferMode,
    /// An HBlank transfer is armed (or a general burst is running).
    active: bool,
    /// Ticks into the current burst; the copy lands when the budget is
    /// consumed.
    burst_ticks: u32,
    /// Blocks moved by the current burst (1 for HBlank, all for general).
    burst_blocks: u8,
    /// One block per HBlank: set when this HBlank's chunk is done,
    /// cleared on leaving HBlank.
    hblank_chunk_done: bool,
    lcd_enabled: bool,
}

impl Hdma {
    pub fn new() -> Self {
        Self {
            src: 0,
            dst: 0x8000,
            blocks: 0,
            mode: TransferMode::General,
            active: false,
            burst_ticks: 0,
            burst_blocks: 0,
            hblank_chunk_done: false,
            lcd_enabled: true,
        }
    }

    /// True while a burst is consuming the CPU's tick slot.
    pub fn is_transfer_in_progress(&self) -> bool {
        self.burst_blocks > 0
    }

    /// Advance one tick. Returns the finished burst when its budget is
    /// spent; the caller performs the copy and the pointers advance here.
    pub fn tick(&mut self) -> Option<TransferRun> {
        if self.burst_blocks == 0 {
            return None;
        }
        self.burst_ticks += 1;
        if self.burst_ticks < TICKS_PER_BLOCK * self.burst_blocks as u32 {
            return None;
        }

        let run = TransferRun {
            src: self.src,
            dst: self.dst,
            blocks: self.burst_blocks,
        };
        let moved = self.burst_blocks as u16 * 0x10;
        self.src = self.src.wrapping_add(moved);
        self.dst = 0x8000 | (self.dst.wrapping_add(moved) & 0x1FFF);
        self.blocks -= self.burst_blocks;
        self.burst_blocks = 0;
        self.burst_ticks = 0;
        if self.blocks == 0 {
            self.active = false;
        }
        log::debug!(
            "HDMA burst complete: {} block(s) to 0x{:04X}, {} remaining",
            run.blocks,
            run.dst,
            self.blocks
        );
        Some(run)
    }

    /// PPU mode edge notification from the scheduler.
    pub fn on_gpu_update(&mut self, mode: Mode) {
        if mode != Mode::HBlank {
            self.hblank_chunk_done = false;
            return;
        }
        self.try_start_hblank_block();
    }

    /// LCD enable/disable notification. With the LCD off there are no
    /// HBlank edges, so an armed transfer streams its blocks freely.
    pub fn on_lcd_switch(&mut self, enabled: bool) {
        self.lcd_enabled = enabled;
        if !enabled {
            self.hblank_chunk_done = false;
            self.try_start_hblank_block();
        }
    }

    fn try_start_hblank_block(&mut self) {
        if self.active
            && self.mode == TransferMode::HBlank
            && self.burst_blocks == 0
            && !self.hblank_chunk_done
        {
            self.burst_blocks = 1;
            self.burst_ticks = 0;
            self.hblank_chunk_done = true;
        }
    }

    pub(crate) fn state(&self) -> (u16, u16, u8, bool, bool, u32, u8, bool) {
        (
            self.src,
            self.dst,
            self.blocks,
            self.mode == TransferMode::HBlank,
            self.active,
            self.burst_ticks,
            self.burst_blocks,
            self.hblank_chunk_done,
        )
    }

    pub(crate) fn restore(&mut self, state: (u16, u16, u8, bool, bool, u32, u8, bool)) {
        let (src, dst, blocks, hblank, active, burst_ticks, burst_blocks, chunk_done) = state;
        self.src = src;
        self.dst = dst;
        self.blocks = blocks;
        self.mode = if hblank {
            TransferMode::HBlank
        } else {
            TransferMode::General
        };
        self.active = active;
        self.burst_ticks = burst_ticks;
        self.burst_blocks = burst_blocks;
        self.hblank_chunk_done = chunk_done;
    }
}

impl Default for Hdma {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for Hdma {
    fn accepts(&self, addr: u16) -> bool {
        (0xFF51..=0xFF55).contains(&addr)
    }

    fn read(&self, addr: u16) -> u8 {
        match addr {
            // HDMA1-4 are write-only.
            0xFF51..=0xFF54 => 0xFF,
            _ => {
                if self.active || self.is_transfer_in_progress() {
                    (self.blocks - 1) & 0x7F
                } else if self.blocks > 0 {
                    // Cancelled: remaining count with the inactive bit set.
                    0x80 | ((self.blocks - 1) & 0x7F)
                } else {
                    0xFF
                }
            }
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xFF51 => self.src = (self.src & 0x00FF) | ((value as u16) << 8),
            0xFF52 => self.src = (self.src & 0xFF00) | (value & 0xF0) as u16,
            0xFF53 => self.dst = 0x8000 | ((value & 0x1F) as u16) << 8 | (self.dst & 0x00F0),
            0xFF54 => self.dst = 0x8000 | (self.dst & 0x1F00) | (value & 0xF0) as u16,
            _ => {
                if self.active && value & 0x80 == 0 {
                    // Cancel the armed HBlank transfer, keeping the block
                    // count for readback.
                    self.active = false;
                    return;
                }
                self.blocks = (value & 0x7F) + 1;
                self.active = true;
                if value & 0x80 != 0 {
                    self.mode = TransferMode::HBlank;
                    self.hblank_chunk_done = false;
                    if !self.lcd_enabled {
                        self.try_start_hblank_block();
                    }
                } else {
                    self.mode = TransferMode::General;
                    self.burst_blocks = self.blocks;
                    self.burst_ticks = 0;
                }
            }
        }
    }
}
