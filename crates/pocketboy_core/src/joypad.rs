//! Joypad matrix (P1, 0xFF00). Button state arrives from the host through
//! the event mailbox; the register exposes whichever four-bit group the
//! running program has selected, active-low.

use pocketboy_common::key::Button;

use crate::bus::AddressSpace;
use crate::interrupts::{InterruptManager, InterruptType};

pub struct Joypad {
    /// P1 bits 4-5 as written by the program (0 selects a group).
    select: u8,
    /// Pressed D-pad buttons, bit set = pressed.
    dpad: u8,
    /// Pressed action buttons, bit set = pressed.
    actions: u8,
    /// A press arrived since the last tick; drives the joypad interrupt.
    pressed_edge: bool,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            dpad: 0,
            actions: 0,
            pressed_edge: false,
        }
    }

    pub fn press(&mut self, button: Button) {
        let mask = 1 << button.line_bit();
        let lines = if button.is_action() {
            &mut self.actions
        } else {
            &mut self.dpad
        };
        if *lines & mask == 0 {
            *lines |= mask;
            self.pressed_edge = true;
        }
    }

    pub fn release(&mut self, button: Button) {
        let mask = 1 << button.line_bit();
        if button.is_action() {
            self.actions &= !mask;
        } else {
            self.dpad &= !mask;
        }
    }

    /// Whether any button is held, selected group or not. STOP wake-up
    /// watches the raw lines rather than IF.
    pub fn any_pressed(&self) -> bool {
        self.dpad | self.actions != 0
    }

    /// Raise the joypad interrupt for any press observed since the last
    /// tick. Real hardware triggers on the high-to-low edge of a selected
    /// input line; like the interrupt itself, the edge is only meaningful
    /// once per press.
    pub fn tick(&mut self, interrupts: &mut InterruptManager) {
        if self.pressed_edge {
            self.pressed_edge = false;
            interrupts.request(InterruptType::Joypad);
        }
    }

    pub(crate) fn state(&self) -> (u8, u8, u8) {
        (self.select, self.dpad, self.actions)
    }

    pub(crate) fn restore(&mut self, state: (u8, u8, u8)) {
        (self.select, self.dpad, self.actions) = state;
        self.pressed_edge = false;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for Joypad {
    fn accepts(&self, addr: u16) -> bool {
        addr == 0xFF00
    }

    fn read(&self, _addr: u16) -> u8 {
        let mut lines = 0x0F;
        if self.select & 0x10 == 0 {
            lines &= !self.dpad;
        }
        if self.select & 0x20 == 0 {
            lines &= !self.actions;
        }
        0xC0 | self.select | lines
    }

    fn write(&mut self, _addr: u16, value: u8) {
        self.select = value & 0x30;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_group_reads_active_low() {
        let mut joypad = Joypad::new();
        joypad.press(Button::A);
        joypad.press(Button::Down);

        // Nothing selected: all lines high.
        assert_eq!(Joypad::new().read(0xFF00) & 0x0F, 0x0F);

        joypad.write(0xFF00, 0x10); // select action buttons
        assert_eq!(joypad.read(0xFF00) & 0x0F, 0x0E);

        joypad.write(0xFF00, 0x20); // select d-pad
        assert_eq!(joypad.read(0xFF00) & 0x0F, 0x07);

        joypad.release(Button::Down);
        assert_eq!(joypad.read(0xFF00) & 0x0F, 0x0F);
    }

    #[test]
    fn press_requests_interrupt_once() {
        let mut joypad = Joypad::new();
        let mut interrupts = InterruptManager::new();
        interrupts.write(0xFF0F, 0x00);
        interrupts.enable(false);

        joypad.press(Button::Start);
        joypad.tick(&mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x10, 0x10);

        interrupts.write(0xFF0F, 0x00);
        joypad.tick(&mut interrupts);
        assert_eq!(interrupts.if_reg() & 0x10, 0x00);
    }
}
