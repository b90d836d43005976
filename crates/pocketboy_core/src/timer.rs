//! Divider/timer unit: the free-running 16-bit DIV counter and the
//! falling-edge-clocked TIMA counter with its delayed overflow reload.

use crate::bus::AddressSpace;
use crate::interrupts::{InterruptManager, InterruptType};

pub struct Timer {
    /// 16-bit internal divider; DIV (0xFF04) exposes the upper 8 bits.
    div: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    /// Edge detector state: the selected DIV bit ANDed with TAC enable, as
    /// observed after the previous tick.
    last_signal: bool,
    /// TIMA has wrapped and the reload/interrupt is in flight.
    overflow: bool,
    /// Ticks elapsed since the overflow, 0..=5. The interrupt is requested
    /// at +4 and the TMA reload lands at +5; a TIMA write strictly before
    /// +5 cancels both.
    ticks_since_overflow: u8,
    /// Double-speed shifts the edge-detector bit position up by one.
    double_speed: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            overflow: false,
            ticks_since_overflow: 0,
            double_speed: false,
        }
    }

    /// Advance by one master tick.
    pub fn tick(&mut self, interrupts: &mut InterruptManager) {
        self.div = self.div.wrapping_add(1);

        if self.overflow {
            self.ticks_since_overflow += 1;
            if self.ticks_since_overflow == 4 {
                interrupts.request(InterruptType::Timer);
            }
            if self.ticks_since_overflow == 5 {
                self.tima = self.tma;
                self.overflow = false;
                self.ticks_since_overflow = 0;
            }
        }

        self.update_signal();
    }

    pub fn set_double_speed(&mut self, double_speed: bool) {
        self.double_speed = double_speed;
    }

    /// Recompute the edge-detect signal and clock TIMA on a falling edge.
    fn update_signal(&mut self) {
        let signal = self.signal();
        if self.last_signal && !signal {
            self.increment_tima();
        }
        self.last_signal = signal;
    }

    fn signal(&self) -> bool {
        if self.tac & 0x04 == 0 {
            return false;
        }
        let mut bit = match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        if self.double_speed {
            bit += 1;
        }
        self.div & (1 << bit) != 0
    }

    fn increment_tima(&mut self) {
        let (next, wrapped) = self.tima.overflowing_add(1);
        self.tima = next;
        if wrapped {
            self.overflow = true;
            self.ticks_since_overflow = 0;
        }
    }

    /// Write DIV: resets the counter and re-evaluates the edge detector
    /// immediately, which can itself clock TIMA if the selected bit was set.
    fn write_div(&mut self) {
        self.div = 0;
        self.update_signal();
    }

    fn write_tima(&mut self, value: u8) {
        if self.overflow {
            if self.ticks_since_overflow < 5 {
                // Cancel the pending reload and interrupt.
                self.overflow = false;
                self.ticks_since_overflow = 0;
                self.tima = value;
            }
            // At +5 the reload has already landed; the write is lost.
        } else {
            self.tima = value;
        }
    }

    fn write_tac(&mut self, value: u8) {
        self.tac = value & 0x07;
        // Changing the clock select or enable can produce a falling edge on
        // the multiplexed signal, clocking TIMA once.
        self.update_signal();
    }

    pub(crate) fn state(&self) -> (u16, u8, u8, u8, bool, bool, u8) {
        (
            self.div,
            self.tima,
            self.tma,
            self.tac,
            self.last_signal,
            self.overflow,
            self.ticks_since_overflow,
        )
    }

    pub(crate) fn restore(&mut self, state: (u16, u8, u8, u8, bool, bool, u8)) {
        let (div, tima, tma, tac, last_signal, overflow, ticks_since_overflow) = state;
        self.div = div;
        self.tima = tima;
        self.tma = tma;
        self.tac = tac;
        self.last_signal = last_signal;
        self.overflow = overflow;
        self.ticks_since_overflow = ticks_since_overflow;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for Timer {
    fn accepts(&self, addr: u16) -> bool {
        (0xFF04..=0xFF07).contains(&addr)
    }

    fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            _ => self.tac | 0xF8,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xFF04 => self.write_div(),
            0xFF05 => self.write_tima(value),
            0xFF06 => self.tma = value,
            _ => self.write_tac(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticking_timer(tac: u8) -> (Timer, InterruptManager) {
        let mut timer = Timer::new();
        let mut interrupts = InterruptManager::new();
        interrupts.write(0xFF0F, 0x00);
        interrupts.enable(false);
        timer.write(0xFF07, tac);
        (timer, interrupts)
    }

    fn run(timer: &mut Timer, interrupts: &mut InterruptManager, ticks: u32) {
        for _ in 0..ticks {
            timer.tick(interrupts);
        }
    }

    #[test]
    fn div_counts_master_ticks() {
        let (mut timer, mut interrupts) = ticking_timer(0x00);
        run(&mut timer, &mut interrupts, 256);
        assert_eq!(timer.read(0xFF04), 0x01);
    }

    #[test]
    fn tima_increments_every_16_ticks_at_fastest_select() {
        // TAC=0b101: enabled, bit 3 of DIV -> one increment per 16 ticks.
        let (mut timer, mut interrupts) = ticking_timer(0x05);
        run(&mut timer, &mut interrupts, 16 * 10);
        assert_eq!(timer.read(0xFF05), 10);
    }

    #[test]
    fn overflow_requests_interrupt_at_plus_4_and_reloads_at_plus_5() {
        let (mut timer, mut interrupts) = ticking_timer(0x05);
        timer.write(0xFF06, 0x42);
        timer.write(0xFF05, 0xFF);
        // Tick until the wrap lands.
        while timer.read(0xFF05) == 0xFF {
            timer.tick(&mut interrupts);
        }
        assert_eq!(timer.read(0xFF05), 0x00);
        assert_eq!(interrupts.if_reg() & 0x04, 0);

        run(&mut timer, &mut interrupts, 3);
        assert_eq!(timer.read(0xFF05), 0x00);
        assert_eq!(interrupts.if_reg() & 0x04, 0);

        timer.tick(&mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x04, 0x04);

        timer.tick(&mut interrupts);
        assert_eq!(timer.read(0xFF05), 0x42);
    }

    #[test]
    fn tima_write_inside_reload_window_cancels() {
        let (mut timer, mut interrupts) = ticking_timer(0x05);
        timer.write(0xFF06, 0x42);
        timer.write(0xFF05, 0xFF);
        while timer.read(0xFF05) == 0xFF {
            timer.tick(&mut interrupts);
        }
        run(&mut timer, &mut interrupts, 2);

        timer.write(0xFF05, 0x77);
        run(&mut timer, &mut interrupts, 8);
        assert_eq!(timer.read(0xFF05), 0x77);
        assert_eq!(interrupts.if_reg() & 0x04, 0);
    }

    #[test]
    fn tima_write_after_reload_is_lost_to_tma() {
        let (mut timer, mut interrupts) = ticking_timer(0x05);
        timer.write(0xFF06, 0x42);
        timer.write(0xFF05, 0xFF);
        while timer.read(0xFF05) == 0xFF {
            timer.tick(&mut interrupts);
        }
        run(&mut timer, &mut interrupts, 5);
        // Reload landed; the interrupt fired one tick earlier.
        assert_eq!(timer.read(0xFF05), 0x42);
        assert_eq!(interrupts.if_reg() & 0x04, 0x04);
    }

    #[test]
    fn div_write_with_selected_bit_high_clocks_tima() {
        let (mut timer, mut interrupts) = ticking_timer(0x05);
        // Bit 3 of DIV is high after 8 ticks.
        run(&mut timer, &mut interrupts, 8);
        assert_eq!(timer.read(0xFF05), 0);
        timer.write(0xFF04, 0);
        assert_eq!(timer.read(0xFF05), 1);
    }

    #[test]
    fn double_speed_shifts_the_edge_bit() {
        let mut timer = Timer::new();
        let mut interrupts = InterruptManager::new();
        interrupts.enable(false);
        timer.set_double_speed(true);
        timer.write(0xFF07, 0x05);
        // In double-speed the select uses bit 4: one increment per 32 ticks.
        for _ in 0..32 {
            timer.tick(&mut interrupts);
        }
        assert_eq!(timer.read(0xFF05), 1);
    }
}
