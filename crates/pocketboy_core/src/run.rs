//! Host-facing run loop.
//!
//! The machine core stays strictly single-threaded; this module is the
//! only place that touches synchronization primitives. The host gets a
//! handle with a stop flag, a pause/resume handshake (the pausing thread
//! blocks until the core acknowledges at a frame boundary; stop always
//! wins and unblocks any waiter), and a button-event mailbox drained at
//! the top of each loop iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};

use pocketboy_common::key::Button;

use crate::gameboy::GameBoy;

/// Input events delivered through the mailbox.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Press(Button),
    Release(Button),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PauseState {
    Running,
    PauseRequested,
    Paused,
}

struct Control {
    stop: AtomicBool,
    pause: Mutex<PauseState>,
    cond: Condvar,
}

/// Cloneable host-side handle onto a running [`Emulator`].
#[derive(Clone)]
pub struct EmulatorHandle {
    control: Arc<Control>,
    events: Sender<InputEvent>,
}

impl EmulatorHandle {
    /// Request a cooperative stop. Observed at the top of the core loop;
    /// also unblocks any thread waiting in [`EmulatorHandle::pause`] and a
    /// paused core.
    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::SeqCst);
        let mut state = self.control.pause.lock().unwrap();
        *state = PauseState::Running;
        self.control.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.control.stop.load(Ordering::SeqCst)
    }

    /// Block until the core acknowledges the pause at its next quiescent
    /// point. Returns immediately if the emulator has been stopped.
    pub fn pause(&self) {
        let mut state = self.control.pause.lock().unwrap();
        if *state == PauseState::Running {
            *state = PauseState::PauseRequested;
            self.control.cond.notify_all();
        }
        while *state == PauseState::PauseRequested && !self.is_stopped() {
            state = self.control.cond.wait(state).unwrap();
        }
    }

    pub fn resume(&self) {
        let mut state = self.control.pause.lock().unwrap();
        *state = PauseState::Running;
        self.control.cond.notify_all();
    }

    pub fn press(&self, button: Button) {
        let _ = self.events.send(InputEvent::Press(button));
    }

    pub fn release(&self, button: Button) {
        let _ = self.events.send(InputEvent::Release(button));
    }
}

/// Owns the machine and runs it on the calling thread.
pub struct Emulator {
    gameboy: GameBoy,
    control: Arc<Control>,
    events: Receiver<InputEvent>,
}

impl Emulator {
    pub fn new(gameboy: GameBoy) -> (Self, EmulatorHandle) {
        let control = Arc::new(Control {
            stop: AtomicBool::new(false),
            pause: Mutex::new(PauseState::Running),
            cond: Condvar::new(),
        });
        let (sender, receiver) = channel();
        let handle = EmulatorHandle {
            control: Arc::clone(&control),
            events: sender,
        };
        (
            Self {
                gameboy,
                control,
                events: receiver,
            },
            handle,
        )
    }

    pub fn gameboy(&mut self) -> &mut GameBoy {
        &mut self.gameboy
    }

    /// Drive the machine until a stop is requested. One loop iteration is
    /// one frame; stop, pause and input are all observed between frames,
    /// never mid-instruction.
    pub fn run(&mut self) {
        loop {
            if self.control.stop.load(Ordering::SeqCst) {
                break;
            }
            self.handshake_pause();
            if self.control.stop.load(Ordering::SeqCst) {
                break;
            }
            self.drain_input();
            self.gameboy.step_frame();
        }
    }

    /// Acknowledge a pending pause request and block until resumed or
    /// stopped.
    fn handshake_pause(&self) {
        let mut state = self.control.pause.lock().unwrap();
        if *state != PauseState::PauseRequested {
            return;
        }
        *state = PauseState::Paused;
        self.control.cond.notify_all();
        while *state == PauseState::Paused && !self.control.stop.load(Ordering::SeqCst) {
            state = self.control.cond.wait(state).unwrap();
        }
    }

    fn drain_input(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                InputEvent::Press(button) => self.gameboy.press(button),
                InputEvent::Release(button) => self.gameboy.release(button),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Rom;
    use crate::gameboy::GameBoyConfig;
    use std::thread;
    use std::time::Duration;

    fn looping_machine() -> GameBoy {
        let mut rom = vec![0u8; 0x8000];
        // JP 0x0100 forever.
        rom[0x100] = 0xC3;
        rom[0x101] = 0x00;
        rom[0x102] = 0x01;
        let mut gb = GameBoy::new(GameBoyConfig::dmg()).unwrap();
        gb.load_cartridge(Box::new(Rom::new(rom)));
        gb
    }

    #[test]
    fn stop_terminates_the_run_loop() {
        let (mut emulator, handle) = Emulator::new(looping_machine());
        let worker = thread::spawn(move || {
            emulator.run();
            emulator.gameboy().frames()
        });
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        let frames = worker.join().unwrap();
        assert!(frames > 0);
    }

    #[test]
    fn pause_blocks_until_acknowledged_and_resume_continues() {
        let (mut emulator, handle) = Emulator::new(looping_machine());
        let pauser = handle.clone();
        let worker = thread::spawn(move || emulator.run());

        pauser.pause();
        // Paused: the core is quiescent until resumed.
        pauser.resume();
        pauser.stop();
        worker.join().unwrap();
    }

    #[test]
    fn stop_while_paused_does_not_deadlock() {
        let (mut emulator, handle) = Emulator::new(looping_machine());
        let worker = thread::spawn(move || emulator.run());

        handle.pause();
        handle.stop();
        worker.join().unwrap();
    }

    #[test]
    fn input_events_reach_the_joypad() {
        let (mut emulator, handle) = Emulator::new(looping_machine());
        handle.press(Button::Start);
        emulator.drain_input();
        // Start is in the action group; select it and check the line.
        emulator.gameboy().mmu.write(0xFF00, 0x10);
        assert_eq!(emulator.gameboy().mmu.read(0xFF00) & 0x08, 0);
    }
}
