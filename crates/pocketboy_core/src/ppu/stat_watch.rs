//! STAT interrupt timing unit.
//!
//! Keeps a two-sample rolling history of the PPU's externally visible state
//! and converts mode/coincidence edges into interrupt requests, applying
//! the per-mode activation delays measured on hardware. VBlank entry also
//! honors the quirk where an enabled OAM-search source fires a second STAT
//! interrupt at the start of the vertical blank.

use crate::interrupts::{InterruptManager, InterruptType};

use super::Mode;

/// Activation delay in ticks between entering a mode and the STAT line
/// asserting for it.
fn mode_delay(mode: Mode) -> u64 {
    match mode {
        Mode::HBlank => 12,
        Mode::OamSearch => 4,
        Mode::PixelTransfer => 8,
        Mode::VBlank => 0,
    }
}

/// STAT enable bit for interrupts sourced from `mode`. Pixel transfer has
/// no interrupt source.
fn mode_enable_bit(mode: Mode) -> Option<u8> {
    match mode {
        Mode::HBlank => Some(0x08),
        Mode::VBlank => Some(0x10),
        Mode::OamSearch => Some(0x20),
        Mode::PixelTransfer => None,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Sample {
    tick: u64,
    mode: Mode,
    stat: u8,
    ly: u8,
    lyc: u8,
}

#[derive(Clone)]
pub struct StatWatcher {
    /// Rolling window, newest first. Capped at two samples by design.
    history: [Option<Sample>; 2],
    /// Delayed STAT assertions still waiting for their due tick.
    pending: Vec<u64>,
}

impl StatWatcher {
    pub fn new() -> Self {
        Self {
            history: [None, None],
            pending: Vec::with_capacity(2),
        }
    }

    /// The sample `age` ticks back in the window (0 = current).
    ///
    /// Requesting beyond the retained window is a programming error, not a
    /// runtime condition.
    fn sample(&self, age: usize) -> Sample {
        self.history
            .get(age)
            .copied()
            .flatten()
            .unwrap_or_else(|| panic!("STAT history rewound past its two-sample window"))
    }

    /// Record one tick's worth of PPU state and raise any due interrupts.
    pub fn tick(
        &mut self,
        now: u64,
        mode: Mode,
        stat: u8,
        ly: u8,
        lyc: u8,
        interrupts: &mut InterruptManager,
    ) {
        self.history[1] = self.history[0];
        self.history[0] = Some(Sample {
            tick: now,
            mode,
            stat,
            ly,
            lyc,
        });

        // Fire any delayed assertion that has matured.
        let mut fired = false;
        self.pending.retain(|&due| {
            if due <= now {
                fired = true;
                false
            } else {
                true
            }
        });
        if fired {
            interrupts.request(InterruptType::Lcdc);
        }

        if self.history[1].is_none() {
            return;
        }
        let current = self.sample(0);
        let previous = self.sample(1);

        if previous.mode != current.mode {
            if current.mode == Mode::VBlank {
                // The vertical blank interrupt asserts exactly on the
                // HBlank -> VBlank boundary tick.
                interrupts.request(InterruptType::VBlank);
                // Quirk: an enabled OAM-search source also fires on VBlank
                // entry, after its own activation delay.
                if current.stat & 0x20 != 0 {
                    self.pending.push(now + mode_delay(Mode::OamSearch));
                }
            }
            if let Some(enable) = mode_enable_bit(current.mode) {
                if current.stat & enable != 0 {
                    let delay = mode_delay(current.mode);
                    if delay == 0 {
                        interrupts.request(InterruptType::Lcdc);
                    } else {
                        self.pending.push(now + delay);
                    }
                }
            }
        }

        // LY = LYC coincidence edge.
        let coincided = current.ly == current.lyc;
        let was_coincided = previous.ly == previous.lyc;
        if coincided && !was_coincided && current.stat & 0x40 != 0 {
            interrupts.request(InterruptType::Lcdc);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.history = [None, None];
        self.pending.clear();
    }

}

impl Default for StatWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AddressSpace;

    fn open_interrupts() -> InterruptManager {
        let mut interrupts = InterruptManager::new();
        interrupts.write(0xFF0F, 0x00);
        interrupts.enable(false);
        interrupts
    }

    #[test]
    fn vblank_fires_on_the_boundary_tick() {
        let mut watcher = StatWatcher::new();
        let mut interrupts = open_interrupts();
        watcher.tick(100, Mode::HBlank, 0, 143, 200, &mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x01, 0);
        watcher.tick(101, Mode::VBlank, 0, 144, 200, &mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x01, 0x01);
    }

    #[test]
    fn hblank_stat_interrupt_respects_the_12_tick_delay() {
        let mut watcher = StatWatcher::new();
        let mut interrupts = open_interrupts();
        let stat = 0x08;
        watcher.tick(0, Mode::PixelTransfer, stat, 0, 200, &mut interrupts);
        watcher.tick(1, Mode::HBlank, stat, 0, 200, &mut interrupts);
        for t in 2..=12 {
            watcher.tick(t, Mode::HBlank, stat, 0, 200, &mut interrupts);
            assert_eq!(interrupts.if_reg() & 0x02, 0, "early at tick {t}");
        }
        watcher.tick(13, Mode::HBlank, stat, 0, 200, &mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x02, 0x02);
    }

    #[test]
    fn vblank_entry_double_fires_via_oam_search_enable() {
        let mut watcher = StatWatcher::new();
        let mut interrupts = open_interrupts();
        let stat = 0x20;
        watcher.tick(0, Mode::HBlank, stat, 143, 200, &mut interrupts);
        watcher.tick(1, Mode::VBlank, stat, 144, 200, &mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x01, 0x01);
        assert_eq!(interrupts.if_reg() & 0x02, 0);
        for t in 2..=5 {
            watcher.tick(t, Mode::VBlank, stat, 144, 200, &mut interrupts);
        }
        assert_eq!(interrupts.if_reg() & 0x02, 0x02);
    }

    #[test]
    fn lyc_coincidence_edge_fires_when_enabled() {
        let mut watcher = StatWatcher::new();
        let mut interrupts = open_interrupts();
        let stat = 0x40;
        watcher.tick(0, Mode::OamSearch, stat, 9, 10, &mut interrupts);
        watcher.tick(1, Mode::OamSearch, stat, 10, 10, &mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x02, 0x02);
    }

    #[test]
    #[should_panic(expected = "STAT history rewound")]
    fn rewinding_past_the_window_is_an_invariant_violation() {
        let watcher = StatWatcher::new();
        let _ = watcher.sample(0);
    }
}
