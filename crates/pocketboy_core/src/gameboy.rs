//! High-level Game Boy machine: wires the CPU, the bus and the STAT timing
//! unit together and advances every subsystem in a fixed order, once per
//! master tick.
//!
//! Tick order: Timer, then HDMA or the CPU (exclusively), OAM DMA, Sound,
//! Serial, Joypad, PPU, and finally the STAT unit. The PPU advances one dot
//! every `ticks_per_dot` master ticks so dots stay at 4 MiHz across the
//! CGB speed switch; mode edges observed here propagate to the HDMA engine
//! and to the display's frame-ready signal.


use anyhow::Result;

use pocketboy_common::key::Button;

use crate::boot::BootRom;
use crate::bus::AddressSpace;
use crate::cpu::Cpu;
use crate::display::{Display, NullDisplay};
use crate::mmu::Mmu;
use crate::ppu::stat_watch::StatWatcher;
use crate::ppu::Mode;
use crate::TICKS_PER_FRAME;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum HardwareType {
    #[default]
    Dmg,
    Cgb,
}

impl HardwareType {
    pub fn is_cgb(self) -> bool {
        matches!(self, HardwareType::Cgb)
    }
}

/// Construction-time machine configuration.
#[derive(Default)]
pub struct GameBoyConfig {
    pub hardware: HardwareType,
    /// Boot ROM image; without one the machine starts from the post-boot
    /// register state.
    pub boot_rom: Option<Vec<u8>>,
}

impl GameBoyConfig {
    pub fn dmg() -> Self {
        Self::default()
    }

    pub fn cgb() -> Self {
        Self {
            hardware: HardwareType::Cgb,
            ..Self::default()
        }
    }
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub(crate) stat_watcher: StatWatcher,
    display: Box<dyn Display + Send>,
    hardware: HardwareType,
    pub(crate) tick_count: u64,
    /// Master ticks since the last PPU dot.
    pub(crate) dot_gap: u32,
    pub(crate) prev_mode: Mode,
    pub(crate) frames: u64,
    /// A finished frame awaiting delivery to the display.
    pub(crate) pending_refresh: bool,
    /// The program has switched the LCD off.
    pub(crate) lcd_disabled: bool,
}

impl GameBoy {
    pub fn new(config: GameBoyConfig) -> Result<Self> {
        Self::with_display(config, Box::new(NullDisplay))
    }

    pub fn with_display(config: GameBoyConfig, display: Box<dyn Display + Send>) -> Result<Self> {
        let cgb = config.hardware.is_cgb();
        let boot = match config.boot_rom {
            Some(image) => BootRom::new(image, cgb)?,
            None => BootRom::absent(),
        };
        let post_boot = !boot.is_mapped();
        let mmu = Mmu::new(cgb, boot);
        let cpu = if post_boot {
            Cpu::new_post_boot(cgb)
        } else {
            Cpu::new()
        };
        let prev_mode = mmu.ppu.mode();
        Ok(Self {
            cpu,
            mmu,
            stat_watcher: StatWatcher::new(),
            display,
            hardware: config.hardware,
            tick_count: 0,
            dot_gap: 0,
            prev_mode,
            frames: 0,
            pending_refresh: false,
            lcd_disabled: false,
        })
    }

    pub fn hardware(&self) -> HardwareType {
        self.hardware
    }

    pub fn load_cartridge(&mut self, cartridge: Box<dyn AddressSpace + Send>) {
        self.mmu.load_cartridge(cartridge);
    }

    /// Total master ticks since power-on.
    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    /// Completed frames since power-on.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn lcd_disabled(&self) -> bool {
        self.lcd_disabled
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.joypad.press(button);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.joypad.release(button);
    }

    /// Advance the whole machine by one master tick.
    pub fn tick(&mut self) {
        self.tick_count += 1;

        // 1. Timer.
        let Mmu {
            timer, interrupts, ..
        } = &mut self.mmu;
        timer.tick(interrupts);

        // 2. HDMA or CPU, exclusively: an in-flight VRAM DMA burst steals
        // the CPU's slot.
        if self.mmu.hdma.is_transfer_in_progress() {
            if let Some(run) = self.mmu.hdma.tick() {
                self.mmu.run_hdma(run);
            }
        } else {
            self.cpu.tick(&mut self.mmu);
        }

        // 3. OAM DMA.
        if let Some(source) = self.mmu.dma.tick() {
            self.mmu.run_oam_dma(source);
        }

        // 4. Sound.
        self.mmu.sound.tick();

        // 5. Serial.
        let Mmu {
            serial, interrupts, ..
        } = &mut self.mmu;
        serial.tick(interrupts);

        // 6. Joypad.
        let Mmu {
            joypad, interrupts, ..
        } = &mut self.mmu;
        joypad.tick(interrupts);

        // 7 & 8. PPU dot plus the STAT unit, at the dot rate.
        self.dot_gap += 1;
        if self.dot_gap >= self.mmu.speed.ticks_per_dot() {
            self.dot_gap = 0;
            let oam_blocked = self.mmu.dma.oam_blocked();
            let mode = self.mmu.ppu.dot(self.display.as_mut(), oam_blocked);

            if mode != self.prev_mode {
                self.mmu.hdma.on_gpu_update(mode);
                if mode == Mode::VBlank {
                    self.pending_refresh = true;
                }
            }

            let stat = self.mmu.ppu.stat_value();
            let (ly, lyc) = (self.mmu.ppu.ly(), self.mmu.ppu.lyc());
            self.stat_watcher
                .tick(self.tick_count, mode, stat, ly, lyc, &mut self.mmu.interrupts);
            self.prev_mode = mode;
        }

        // Propagate LCD on/off edges from LCDC writes this tick.
        if let Some(enabled) = self.mmu.ppu.take_lcd_switch() {
            self.lcd_disabled = !enabled;
            self.display.lcd_switched(enabled);
            self.mmu.hdma.on_lcd_switch(enabled);
            if !enabled {
                self.stat_watcher.reset();
                self.prev_mode = Mode::HBlank;
            }
        }

        if self.pending_refresh {
            self.pending_refresh = false;
            self.frames += 1;
            self.display.frame_ready();
        }
    }

    /// Run until the next completed frame (or a two-frame tick budget with
    /// the LCD off, so callers never spin forever).
    pub fn step_frame(&mut self) {
        let start = self.frames;
        let budget = self.tick_count + 2 * TICKS_PER_FRAME as u64;
        while self.frames == start && self.tick_count < budget {
            self.tick();
        }
    }
}
