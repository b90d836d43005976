//! Whole-machine save states.
//!
//! Every stateful component contributes a typed value copy; the aggregate
//! [`MachineSnapshot`] is the ordered collection of those copies plus the
//! scheduler's pending-refresh and LCD-disabled flags. Restore validates
//! every shape-sensitive field before touching the machine, so a mismatch
//! leaves the live state untouched.

use anyhow::{bail, Result};

use crate::cpu::Registers;
use crate::gameboy::{GameBoy, HardwareType};
use crate::ppu::stat_watch::StatWatcher;
use crate::ppu::Ppu;

pub const SNAPSHOT_VERSION: u32 = 1;

const WRAM_BANK_SIZE: usize = 0x1000;
const HRAM_SIZE: usize = 0x7F;

/// A complete, inert copy of the machine state.
///
/// Cartridge contents are deliberately absent: battery persistence belongs
/// to the cartridge collaborator, and ROM is immutable by definition.
pub struct MachineSnapshot {
    pub version: u32,
    hardware: HardwareType,
    cpu: (Registers, bool, bool, bool, u64, u32),
    timer: (u16, u8, u8, u8, bool, bool, u8),
    interrupts: (u8, u8, bool, Option<(bool, u8)>),
    dma: (u8, bool, bool, u32),
    hdma: (u16, u16, u8, bool, bool, u32, u8, bool),
    serial: (u8, u8, u32),
    joypad: (u8, u8, u8),
    speed: (bool, bool),
    sound: ([u8; 0x30], bool),
    wram: Vec<u8>,
    svbk: u8,
    hram: Vec<u8>,
    boot_mapped: bool,
    ppu: Ppu,
    stat_watcher: StatWatcher,
    ticks: u64,
    dot_gap: u32,
    frames: u64,
    pending_refresh: bool,
    lcd_disabled: bool,
}

impl GameBoy {
    /// Capture the machine state. Only legal at a quiescent point: the CPU
    /// must be at an instruction boundary.
    pub fn snapshot(&self) -> Result<MachineSnapshot> {
        if !self.cpu.at_instruction_boundary() {
            bail!("cannot snapshot mid-instruction; run the machine to an instruction boundary");
        }
        Ok(MachineSnapshot {
            version: SNAPSHOT_VERSION,
            hardware: self.hardware(),
            cpu: self.cpu.state_snapshot(),
            timer: self.mmu.timer.state(),
            interrupts: (
                self.mmu.interrupts.if_reg(),
                self.mmu.interrupts.ie_reg(),
                self.mmu.interrupts.ime(),
                self.mmu.interrupts.pending_ime(),
            ),
            dma: self.mmu.dma.state(),
            hdma: self.mmu.hdma.state(),
            serial: self.mmu.serial.state(),
            joypad: self.mmu.joypad.state(),
            speed: self.mmu.speed.state(),
            sound: (*self.mmu.sound.regs(), self.mmu.sound.enabled()),
            wram: self.mmu.wram.banks_flat(),
            svbk: self.mmu.wram.svbk(),
            hram: self.mmu.hram.data().to_vec(),
            boot_mapped: self.mmu.boot.is_mapped(),
            ppu: self.mmu.ppu.clone(),
            stat_watcher: self.stat_watcher.clone(),
            ticks: self.tick_count,
            dot_gap: self.dot_gap,
            frames: self.frames,
            pending_refresh: self.pending_refresh,
            lcd_disabled: self.lcd_disabled,
        })
    }

    /// Restore a previously captured snapshot.
    ///
    /// All shape checks run up front; on any mismatch the machine is left
    /// exactly as it was.
    pub fn restore(&mut self, snapshot: &MachineSnapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            bail!(
                "invalid snapshot: version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        if snapshot.hardware != self.hardware() {
            bail!(
                "invalid snapshot: hardware {:?} does not match this {:?} machine",
                snapshot.hardware,
                self.hardware()
            );
        }
        let expected_wram = self.mmu.wram.bank_count() * WRAM_BANK_SIZE;
        if snapshot.wram.len() != expected_wram {
            bail!(
                "invalid snapshot: WRAM is {} bytes, expected {}",
                snapshot.wram.len(),
                expected_wram
            );
        }
        if snapshot.hram.len() != HRAM_SIZE {
            bail!(
                "invalid snapshot: HRAM is {} bytes, expected {}",
                snapshot.hram.len(),
                HRAM_SIZE
            );
        }
        if snapshot.ppu.is_cgb() != self.hardware().is_cgb() {
            bail!("invalid snapshot: PPU hardware mode does not match the machine");
        }

        self.cpu.restore(snapshot.cpu);
        self.mmu.timer.restore(snapshot.timer);
        let (if_reg, ie_reg, ime, pending_ime) = snapshot.interrupts;
        self.mmu.interrupts.restore(if_reg, ie_reg, ime, pending_ime);
        self.mmu.dma.restore(snapshot.dma);
        self.mmu.hdma.restore(snapshot.hdma);
        self.mmu.serial.restore(snapshot.serial);
        self.mmu.joypad.restore(snapshot.joypad);
        self.mmu.speed.restore(snapshot.speed);
        self.mmu.timer.set_double_speed(self.mmu.speed.is_double());
        let (sound_regs, sound_enabled) = snapshot.sound;
        self.mmu.sound.restore(sound_regs, sound_enabled);
        self.mmu.wram.restore_flat(&snapshot.wram, snapshot.svbk);
        self.mmu.hram.load(&snapshot.hram);
        self.mmu.boot.set_mapped(snapshot.boot_mapped);
        self.mmu.ppu = snapshot.ppu.clone();
        self.stat_watcher = snapshot.stat_watcher.clone();
        self.tick_count = snapshot.ticks;
        self.dot_gap = snapshot.dot_gap;
        self.frames = snapshot.frames;
        self.pending_refresh = snapshot.pending_refresh;
        self.lcd_disabled = snapshot.lcd_disabled;
        self.prev_mode = self.mmu.ppu.mode();
        Ok(())
    }
}
