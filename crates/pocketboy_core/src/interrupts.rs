//! Interrupt controller: IF/IE registers, master-enable sequencing and the
//! pending-vector computation the CPU consults at instruction boundaries.

use crate::bus::AddressSpace;

/// The five interrupt sources, in priority order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterruptType {
    VBlank,
    Lcdc,
    Timer,
    Serial,
    Joypad,
}

impl InterruptType {
    /// Bit index of this source within IF/IE.
    #[inline]
    pub fn bit(self) -> u8 {
        match self {
            InterruptType::VBlank => 0,
            InterruptType::Lcdc => 1,
            InterruptType::Timer => 2,
            InterruptType::Serial => 3,
            InterruptType::Joypad => 4,
        }
    }

    /// Fixed handler address for this source.
    #[inline]
    pub fn vector(self) -> u16 {
        0x0040 + 8 * self.bit() as u16
    }

    /// Sources from highest to lowest priority.
    pub const PRIORITY: [InterruptType; 5] = [
        InterruptType::VBlank,
        InterruptType::Lcdc,
        InterruptType::Timer,
        InterruptType::Serial,
        InterruptType::Joypad,
    ];
}

/// IF (0xFF0F), IE (0xFFFF) and the master enable flag with its
/// one-instruction EI/DI delay.
pub struct InterruptManager {
    if_reg: u8,
    ie_reg: u8,
    ime: bool,
    /// Pending IME change from a delayed EI/DI: the target value and how
    /// many more instruction boundaries must pass before it applies.
    pending_ime: Option<(bool, u8)>,
}

impl InterruptManager {
    pub fn new() -> Self {
        Self {
            // Unused IF bits read back as 1.
            if_reg: 0xE1,
            ie_reg: 0,
            ime: false,
            pending_ime: None,
        }
    }

    /// Convenience entry point used by devices (PPU, timer, serial, joypad).
    ///
    /// Requests are coalesced: while the master enable is off this is a
    /// no-op, matching the hardware view that a masked device cannot pull
    /// the interrupt line. The IF register itself stays directly writable
    /// through the bus regardless.
    pub fn request(&mut self, interrupt: InterruptType) {
        if self.ime {
            self.if_reg |= 1 << interrupt.bit();
        }
    }

    /// Set an IF bit unconditionally. Used by restore paths and by devices
    /// that model a physical line (the timer overflow pipeline).
    pub fn raise(&mut self, interrupt: InterruptType) {
        self.if_reg |= 1 << interrupt.bit();
    }

    pub fn ime(&self) -> bool {
        self.ime
    }

    /// Enable the master flag, optionally after exactly one more
    /// instruction boundary (the EI semantics; RETI enables immediately).
    pub fn enable(&mut self, delayed: bool) {
        if delayed {
            self.pending_ime = Some((true, 1));
        } else {
            self.pending_ime = None;
            self.ime = true;
        }
    }

    pub fn disable(&mut self, delayed: bool) {
        if delayed {
            self.pending_ime = Some((false, 1));
        } else {
            self.pending_ime = None;
            self.ime = false;
        }
    }

    /// Walk a delayed EI/DI one instruction closer to applying. Called by
    /// the CPU once per completed instruction; the EI that set the change
    /// up sees one boundary itself, so the flag flips after the following
    /// instruction.
    pub fn on_instruction_finished(&mut self) {
        if let Some((target, boundaries)) = self.pending_ime {
            if boundaries == 0 {
                self.ime = target;
                self.pending_ime = None;
            } else {
                self.pending_ime = Some((target, boundaries - 1));
            }
        }
    }

    /// Highest-priority source that is both requested and enabled, if the
    /// master flag permits servicing at all.
    pub fn pending(&self) -> Option<InterruptType> {
        if !self.ime {
            return None;
        }
        self.pending_ignoring_ime()
    }

    /// Highest-priority requested-and-enabled source regardless of IME.
    /// HALT wake-up uses this.
    pub fn pending_ignoring_ime(&self) -> Option<InterruptType> {
        let active = self.if_reg & self.ie_reg & 0x1F;
        InterruptType::PRIORITY
            .into_iter()
            .find(|it| active & (1 << it.bit()) != 0)
    }

    /// Begin servicing: clear the source's IF bit and the master enable.
    pub fn acknowledge(&mut self, interrupt: InterruptType) {
        self.if_reg &= !(1 << interrupt.bit());
        self.ime = false;
    }

    pub(crate) fn if_reg(&self) -> u8 {
        self.if_reg
    }

    pub(crate) fn ie_reg(&self) -> u8 {
        self.ie_reg
    }

    pub(crate) fn restore(&mut self, if_reg: u8, ie_reg: u8, ime: bool, pending_ime: Option<(bool, u8)>) {
        self.if_reg = if_reg;
        self.ie_reg = ie_reg;
        self.ime = ime;
        self.pending_ime = pending_ime;
    }

    pub(crate) fn pending_ime(&self) -> Option<(bool, u8)> {
        self.pending_ime
    }
}

impl Default for InterruptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for InterruptManager {
    fn accepts(&self, addr: u16) -> bool {
        addr == 0xFF0F || addr == 0xFFFF
    }

    fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF0F => self.if_reg | 0xE0,
            _ => self.ie_reg,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xFF0F => self.if_reg = (value & 0x1F) | (self.if_reg & 0xE0),
            _ => self.ie_reg = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_follow_bit_order() {
        assert_eq!(InterruptType::VBlank.vector(), 0x0040);
        assert_eq!(InterruptType::Lcdc.vector(), 0x0048);
        assert_eq!(InterruptType::Timer.vector(), 0x0050);
        assert_eq!(InterruptType::Serial.vector(), 0x0058);
        assert_eq!(InterruptType::Joypad.vector(), 0x0060);
    }

    #[test]
    fn request_is_inert_while_master_disabled() {
        let mut im = InterruptManager::new();
        im.write(0xFF0F, 0x00);
        im.request(InterruptType::Timer);
        assert_eq!(im.if_reg() & 0x1F, 0x00);

        im.enable(false);
        im.request(InterruptType::Timer);
        assert_eq!(im.if_reg() & 0x1F, 0x04);
    }

    #[test]
    fn priority_prefers_vblank() {
        let mut im = InterruptManager::new();
        im.enable(false);
        im.write(0xFFFF, 0x1F);
        im.write(0xFF0F, 0x1F);
        assert_eq!(im.pending(), Some(InterruptType::VBlank));
        im.acknowledge(InterruptType::VBlank);
        // Acknowledge cleared IME, so nothing is serviceable until EI.
        assert_eq!(im.pending(), None);
        im.enable(false);
        assert_eq!(im.pending(), Some(InterruptType::Lcdc));
    }

    #[test]
    fn delayed_enable_applies_after_the_following_instruction() {
        let mut im = InterruptManager::new();
        im.enable(true);
        assert!(!im.ime());
        // The EI instruction itself finishing does not apply it...
        im.on_instruction_finished();
        assert!(!im.ime());
        // ...the next instruction finishing does.
        im.on_instruction_finished();
        assert!(im.ime());
    }

    #[test]
    fn immediate_disable_cancels_a_pending_enable() {
        let mut im = InterruptManager::new();
        im.enable(true);
        im.disable(false);
        im.on_instruction_finished();
        im.on_instruction_finished();
        assert!(!im.ime());
    }

    #[test]
    fn if_unused_bits_read_high() {
        let mut im = InterruptManager::new();
        im.write(0xFF0F, 0x01);
        assert_eq!(im.read(0xFF0F), 0xE1);
    }
}
