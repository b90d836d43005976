//! Bus dispatcher: owns every memory-mapped device and routes each access
//! to the first one that accepts it, in a fixed registration order.
//!
//! The order is built once at construction and encodes priority — the boot
//! ROM shadows the cartridge, and the OAM lockout check runs before any
//! device sees the address. The fallback is open bus: reads 0xFF, writes
//! logged and dropped.

use crate::boot::BootRom;
use crate::bus::{AddressSpace, Ram, VoidAddressSpace};
use crate::cartridge::EmptySlot;
use crate::dma::Dma;
use crate::hdma::{Hdma, TransferRun};
use crate::interrupts::InterruptManager;
use crate::joypad::Joypad;
use crate::memory::WorkRam;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::sound::Sound;
use crate::speed::SpeedMode;
use crate::timer::Timer;

/// The known device kinds, dispatched statically. Registration order in
/// [`Mmu::new`] is the bus priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DeviceId {
    Boot,
    Cartridge,
    WorkRam,
    Ppu,
    Joypad,
    Serial,
    Timer,
    Interrupts,
    Sound,
    Dma,
    Hdma,
    Speed,
    Hram,
    /// Open-bus fallback; accepts everything, must be last.
    Void,
}

pub struct Mmu {
    pub boot: BootRom,
    pub cartridge: Box<dyn AddressSpace + Send>,
    pub wram: WorkRam,
    pub ppu: Ppu,
    pub joypad: Joypad,
    pub serial: Serial,
    pub timer: Timer,
    pub interrupts: InterruptManager,
    pub sound: Sound,
    pub dma: Dma,
    pub hdma: Hdma,
    pub speed: SpeedMode,
    pub hram: Ram,
    void: VoidAddressSpace,
    order: Vec<DeviceId>,
}

impl Mmu {
    pub fn new(cgb: bool, boot: BootRom) -> Self {
        // Priority order: the boot ROM shadows the cartridge; everything
        // else claims disjoint ranges. CGB-only devices are simply not
        // registered on DMG.
        let mut order = vec![
            DeviceId::Boot,
            DeviceId::Cartridge,
            DeviceId::WorkRam,
            DeviceId::Ppu,
            DeviceId::Joypad,
            DeviceId::Serial,
            DeviceId::Timer,
            DeviceId::Interrupts,
            DeviceId::Sound,
            DeviceId::Dma,
        ];
        if cgb {
            order.push(DeviceId::Hdma);
            order.push(DeviceId::Speed);
        }
        order.push(DeviceId::Hram);
        order.push(DeviceId::Void);

        let post_boot = !boot.is_mapped();
        Self {
            boot,
            cartridge: Box::new(EmptySlot),
            wram: WorkRam::new(cgb),
            ppu: Ppu::new(cgb, post_boot),
            joypad: Joypad::new(),
            serial: Serial::new(),
            timer: Timer::new(),
            interrupts: InterruptManager::new(),
            sound: Sound::new(),
            dma: Dma::new(),
            hdma: Hdma::new(),
            speed: SpeedMode::new(),
            hram: Ram::new(0xFF80, 0x7F),
            void: VoidAddressSpace,
            order,
        }
    }

    fn device(&self, id: DeviceId) -> &dyn AddressSpace {
        match id {
            DeviceId::Boot => &self.boot,
            DeviceId::Cartridge => self.cartridge.as_ref(),
            DeviceId::WorkRam => &self.wram,
            DeviceId::Ppu => &self.ppu,
            DeviceId::Joypad => &self.joypad,
            DeviceId::Serial => &self.serial,
            DeviceId::Timer => &self.timer,
            DeviceId::Interrupts => &self.interrupts,
            DeviceId::Sound => &self.sound,
            DeviceId::Dma => &self.dma,
            DeviceId::Hdma => &self.hdma,
            DeviceId::Speed => &self.speed,
            DeviceId::Hram => &self.hram,
            DeviceId::Void => &self.void,
        }
    }

    fn device_mut(&mut self, id: DeviceId) -> &mut dyn AddressSpace {
        match id {
            DeviceId::Boot => &mut self.boot,
            DeviceId::Cartridge => self.cartridge.as_mut(),
            DeviceId::WorkRam => &mut self.wram,
            DeviceId::Ppu => &mut self.ppu,
            DeviceId::Joypad => &mut self.joypad,
            DeviceId::Serial => &mut self.serial,
            DeviceId::Timer => &mut self.timer,
            DeviceId::Interrupts => &mut self.interrupts,
            DeviceId::Sound => &mut self.sound,
            DeviceId::Dma => &mut self.dma,
            DeviceId::Hdma => &mut self.hdma,
            DeviceId::Speed => &mut self.speed,
            DeviceId::Hram => &mut self.hram,
            DeviceId::Void => &mut self.void,
        }
    }

    /// Bus read. OAM is locked out while an OAM DMA holds the bus.
    pub fn read(&self, addr: u16) -> u8 {
        if (0xFE00..=0xFE9F).contains(&addr) && self.dma.oam_blocked() {
            return 0xFF;
        }
        self.read_unlocked(addr)
    }

    /// Bus read without the OAM DMA lockout, used by the DMA engines
    /// themselves.
    fn read_unlocked(&self, addr: u16) -> u8 {
        for &id in &self.order {
            let device = self.device(id);
            if device.accepts(addr) {
                return device.read(addr);
            }
        }
        // The void device accepts everything; scanning past it means the
        // order table is broken.
        unreachable!("no device claimed address 0x{addr:04X}")
    }

    /// Bus write, first-match routing like [`Mmu::read`].
    pub fn write(&mut self, addr: u16, value: u8) {
        if (0xFE00..=0xFE9F).contains(&addr) && self.dma.oam_blocked() {
            return;
        }
        for i in 0..self.order.len() {
            let id = self.order[i];
            if self.device(id).accepts(addr) {
                self.device_mut(id).write(addr, value);
                return;
            }
        }
        unreachable!("no device claimed address 0x{addr:04X}")
    }

    /// Replace the cartridge slot contents.
    pub fn load_cartridge(&mut self, cartridge: Box<dyn AddressSpace + Send>) {
        self.cartridge = cartridge;
    }

    /// CPU executed STOP with a speed switch armed. Keeps the timer's
    /// edge-detector bit position in sync with the new speed.
    pub(crate) fn speed_switch(&mut self) -> bool {
        if self.speed.on_stop() {
            self.timer.set_double_speed(self.speed.is_double());
            true
        } else {
            false
        }
    }

    /// Execute the 160-byte OAM DMA copy, atomically.
    pub(crate) fn run_oam_dma(&mut self, source: u16) {
        for i in 0..0xA0u16 {
            let byte = self.read_unlocked(source.wrapping_add(i));
            self.ppu.write_oam_raw(i as usize, byte);
        }
    }

    /// Execute a finished HDMA burst into VRAM.
    pub(crate) fn run_hdma(&mut self, run: TransferRun) {
        let bytes = run.blocks as u16 * 0x10;
        for i in 0..bytes {
            let byte = self.read_unlocked(run.src.wrapping_add(i));
            let dst = 0x8000 | (run.dst.wrapping_add(i) & 0x1FFF);
            self.ppu.write_vram_raw(dst, byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Rom;

    fn dmg_mmu() -> Mmu {
        let mut mmu = Mmu::new(false, BootRom::absent());
        // LCD off so OAM/VRAM are freely accessible to the tests.
        mmu.write(0xFF40, 0x11);
        mmu
    }

    #[test]
    fn boot_rom_shadows_the_cartridge_until_unmapped() {
        let mut rom = vec![0x11u8; 0x8000];
        rom[0x42] = 0x22;
        let mut mmu = Mmu::new(false, BootRom::new(vec![0x33; 0x100], false).unwrap());
        mmu.load_cartridge(Box::new(Rom::new(rom)));

        assert_eq!(mmu.read(0x0042), 0x33);
        assert_eq!(mmu.read(0x0100), 0x11);
        mmu.write(0xFF50, 0x01);
        assert_eq!(mmu.read(0x0042), 0x22);
    }

    #[test]
    fn unmapped_addresses_read_open_bus() {
        let mmu = dmg_mmu();
        // FEA0-FEFF is unusable on DMG and claimed by nothing.
        assert_eq!(mmu.read(0xFEA0), 0xFF);
        // CGB-only registers are not registered on DMG.
        assert_eq!(mmu.read(0xFF4D), 0xFF);
        assert_eq!(mmu.read(0xFF55), 0xFF);
        assert_eq!(mmu.read(0xFF70), 0xFF);
    }

    #[test]
    fn cgb_registers_appear_on_cgb() {
        let mmu = Mmu::new(true, BootRom::absent());
        assert_eq!(mmu.read(0xFF4D), 0x7E);
        assert_eq!(mmu.read(0xFF55), 0xFF);
        assert_eq!(mmu.read(0xFF70) & 0x07, 0x01);
    }

    #[test]
    fn oam_is_locked_during_dma() {
        let mut mmu = dmg_mmu();
        mmu.write(0xFE00, 0x5A);
        assert_eq!(mmu.read(0xFE00), 0x5A);

        mmu.write(0xFF46, 0xC0);
        for _ in 0..8 {
            mmu.dma.tick();
        }
        assert_eq!(mmu.read(0xFE00), 0xFF);
        mmu.write(0xFE00, 0x77);
        // The write was dropped; finish the transfer and check.
        while mmu.dma.is_active() {
            if let Some(src) = mmu.dma.tick() {
                mmu.run_oam_dma(src);
            }
        }
        assert_ne!(mmu.read(0xFE00), 0x77);
    }

    #[test]
    fn hram_reads_back() {
        let mut mmu = dmg_mmu();
        mmu.write(0xFF85, 0x12);
        assert_eq!(mmu.read(0xFF85), 0x12);
    }

    #[test]
    fn oam_dma_copies_a_whole_page_slice() {
        let mut mmu = dmg_mmu();
        for i in 0..0xA0u16 {
            mmu.write(0xC000 + i, i as u8);
        }
        mmu.write(0xFF46, 0xC0);
        let mut copied = false;
        for _ in 0..1000 {
            if let Some(src) = mmu.dma.tick() {
                mmu.run_oam_dma(src);
                copied = true;
                break;
            }
        }
        assert!(copied);
        assert_eq!(mmu.read(0xFE00), 0x00);
        assert_eq!(mmu.read(0xFE9F), 0x9F);
    }
}
