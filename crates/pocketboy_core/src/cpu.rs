//! LR35902 CPU core.
//!
//! A small state machine stepped once per machine cycle: fetch (with the
//! 0xCB extension), micro-op execution against the declarative table in
//! [`opcodes`], and the five-cycle interrupt dispatch sequence entered at
//! instruction boundaries.

mod alu;
pub mod opcodes;
mod registers;

#[cfg(test)]
mod tests;

use once_cell::sync::Lazy;

use crate::interrupts::InterruptType;
use crate::mmu::Mmu;

use opcodes::{Addr, AluOp, Cond, Instr, MicroOp, Reg16, Reg8, OPCODES};
pub use registers::{Flag, Registers};

/// Master ticks per machine cycle. Constant across speed modes: in double
/// speed the master tick rate itself doubles.
const TICKS_PER_M_CYCLE: u32 = 4;

#[derive(Copy, Clone)]
enum State {
    /// At an instruction boundary; the next cycle fetches an opcode or
    /// enters interrupt dispatch.
    Fetch,
    /// Fetched 0xCB; the next cycle fetches the extension opcode.
    FetchCb,
    /// Mid-instruction, pointing at the next micro-op to execute.
    Execute {
        instr: &'static Instr,
        next_op: usize,
    },
    /// Servicing an interrupt; stage 1-4 of the five-cycle sequence (the
    /// detection cycle itself was stage 0).
    InterruptDispatch { stage: u8, target: InterruptType },
}

pub struct Cpu {
    pub regs: Registers,
    state: State,
    /// Immediate operand bytes fetched so far for the current instruction.
    imm: u16,
    imm_count: u8,
    /// Working value micro-ops read from and write to.
    ctx: u16,
    pub halted: bool,
    pub stopped: bool,
    /// HALT executed with IME off while an interrupt was already pending:
    /// the next opcode fetch does not advance PC.
    halt_bug: bool,
    tick_divider: u32,
    m_cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            state: State::Fetch,
            imm: 0,
            imm_count: 0,
            ctx: 0,
            halted: false,
            stopped: false,
            halt_bug: false,
            tick_divider: 0,
            m_cycles: 0,
        }
    }

    /// CPU initialized to the post-boot register state for the selected
    /// hardware, used when no boot ROM is mapped.
    pub fn new_post_boot(cgb: bool) -> Self {
        let mut cpu = Self::new();
        cpu.regs = if cgb {
            Registers {
                a: 0x11,
                f: 0x80,
                b: 0x00,
                c: 0x00,
                d: 0xFF,
                e: 0x56,
                h: 0x00,
                l: 0x0D,
                sp: 0xFFFE,
                pc: 0x0100,
            }
        } else {
            Registers {
                a: 0x01,
                f: 0xB0,
                b: 0x00,
                c: 0x13,
                d: 0x00,
                e: 0xD8,
                h: 0x01,
                l: 0x4D,
                sp: 0xFFFE,
                pc: 0x0100,
            }
        };
        cpu
    }

    /// Total machine cycles executed so far.
    pub fn machine_cycles(&self) -> u64 {
        self.m_cycles
    }

    /// Whether the CPU sits at an instruction boundary (safe quiescent
    /// point for snapshots).
    pub fn at_instruction_boundary(&self) -> bool {
        matches!(self.state, State::Fetch)
    }

    /// Advance one master tick; the machine steps every fourth tick.
    pub fn tick(&mut self, mmu: &mut Mmu) {
        self.tick_divider += 1;
        if self.tick_divider == TICKS_PER_M_CYCLE {
            self.tick_divider = 0;
            self.step_mcycle(mmu);
        }
    }

    /// Execute one machine cycle of work.
    pub fn step_mcycle(&mut self, mmu: &mut Mmu) {
        self.m_cycles += 1;
        match self.state {
            State::Fetch => self.fetch_cycle(mmu),
            State::FetchCb => {
                let opcode = mmu.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.begin_instr(mmu, Lazy::force(&OPCODES).cb(opcode));
            }
            State::Execute { instr, next_op } => {
                let op = instr.ops[next_op];
                self.state = State::Execute {
                    instr,
                    next_op: next_op + 1,
                };
                if self.exec_op(mmu, op) {
                    self.run_free_ops(mmu);
                } else {
                    self.finish_instruction(mmu);
                }
            }
            State::InterruptDispatch { stage, target } => {
                self.dispatch_cycle(mmu, stage, target)
            }
        }
    }

    fn fetch_cycle(&mut self, mmu: &mut Mmu) {
        if self.stopped {
            // STOP ends on a joypad line going active.
            if mmu.interrupts.if_reg() & 0x10 != 0 || mmu.joypad.any_pressed() {
                self.stopped = false;
            }
            return;
        }
        if self.halted {
            if mmu.interrupts.pending_ignoring_ime().is_some() {
                self.halted = false;
            }
            return;
        }
        if let Some(target) = mmu.interrupts.pending() {
            // This cycle is the first of the five-cycle dispatch.
            self.state = State::InterruptDispatch { stage: 1, target };
            return;
        }

        let opcode = mmu.read(self.regs.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }

        if opcode == 0xCB {
            self.state = State::FetchCb;
            return;
        }
        match Lazy::force(&OPCODES).base(opcode) {
            Some(instr) => self.begin_instr(mmu, instr),
            None => {
                log::warn!(
                    "unknown opcode 0x{:02X} at 0x{:04X}",
                    opcode,
                    self.regs.pc.wrapping_sub(1)
                );
                self.finish_instruction(mmu);
            }
        }
    }

    fn dispatch_cycle(&mut self, mmu: &mut Mmu, stage: u8, target: InterruptType) {
        match stage {
            1 => {}
            2 => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                mmu.write(self.regs.sp, (self.regs.pc >> 8) as u8);
            }
            3 => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                mmu.write(self.regs.sp, self.regs.pc as u8);
            }
            _ => {
                mmu.interrupts.acknowledge(target);
                self.regs.pc = target.vector();
                self.state = State::Fetch;
                return;
            }
        }
        self.state = State::InterruptDispatch {
            stage: stage + 1,
            target,
        };
    }

    fn begin_instr(&mut self, mmu: &mut Mmu, instr: &'static Instr) {
        self.imm = 0;
        self.imm_count = 0;
        self.ctx = 0;
        self.state = State::Execute { instr, next_op: 0 };
        // Register-only ops complete within the fetch cycle.
        self.run_free_ops(mmu);
    }

    /// Execute zero-cost ops until the next cycle-consuming op (or the end
    /// of the instruction).
    fn run_free_ops(&mut self, mmu: &mut Mmu) {
        while let State::Execute { instr, next_op } = self.state {
            if next_op >= instr.ops.len() {
                self.finish_instruction(mmu);
                break;
            }
            let op = instr.ops[next_op];
            if op.consumes_cycle() {
                break;
            }
            self.state = State::Execute {
                instr,
                next_op: next_op + 1,
            };
            if !self.exec_op(mmu, op) {
                self.finish_instruction(mmu);
                break;
            }
        }
    }

    fn finish_instruction(&mut self, mmu: &mut Mmu) {
        mmu.interrupts.on_instruction_finished();
        self.state = State::Fetch;
    }

    fn cond(&self, cond: Cond) -> bool {
        match cond {
            Cond::Nz => !self.regs.flag(Flag::Z),
            Cond::Z => self.regs.flag(Flag::Z),
            Cond::Nc => !self.regs.flag(Flag::C),
            Cond::C => self.regs.flag(Flag::C),
        }
    }

    fn resolve_addr(&mut self, mode: Addr) -> u16 {
        match mode {
            Addr::Bc => self.regs.bc(),
            Addr::De => self.regs.de(),
            Addr::Hl => self.regs.hl(),
            Addr::HlInc => {
                let addr = self.regs.hl();
                self.regs.set_hl(addr.wrapping_add(1));
                addr
            }
            Addr::HlDec => {
                let addr = self.regs.hl();
                self.regs.set_hl(addr.wrapping_sub(1));
                addr
            }
            Addr::Imm16 => self.imm,
            Addr::HighImm8 => 0xFF00 | (self.imm & 0x00FF),
            Addr::HighC => 0xFF00 | self.regs.c as u16,
        }
    }

    fn read_reg16(&self, rp: Reg16) -> u16 {
        match rp {
            Reg16::Af => self.regs.af(),
            Reg16::Bc => self.regs.bc(),
            Reg16::De => self.regs.de(),
            Reg16::Hl => self.regs.hl(),
            Reg16::Sp => self.regs.sp,
        }
    }

    fn write_reg16(&mut self, rp: Reg16, value: u16) {
        match rp {
            Reg16::Af => self.regs.set_af(value),
            Reg16::Bc => self.regs.set_bc(value),
            Reg16::De => self.regs.set_de(value),
            Reg16::Hl => self.regs.set_hl(value),
            Reg16::Sp => self.regs.sp = value,
        }
    }

    fn reg8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.regs.a,
            Reg8::B => self.regs.b,
            Reg8::C => self.regs.c,
            Reg8::D => self.regs.d,
            Reg8::E => self.regs.e,
            Reg8::H => self.regs.h,
            Reg8::L => self.regs.l,
        }
    }

    fn set_reg8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.regs.a = value,
            Reg8::B => self.regs.b = value,
            Reg8::C => self.regs.c = value,
            Reg8::D => self.regs.d = value,
            Reg8::E => self.regs.e = value,
            Reg8::H => self.regs.h = value,
            Reg8::L => self.regs.l = value,
        }
    }

    /// Execute one micro-op. Returns false when a failed condition aborts
    /// the rest of the instruction.
    fn exec_op(&mut self, mmu: &mut Mmu, op: MicroOp) -> bool {
        match op {
            MicroOp::ReadImm => {
                let byte = mmu.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                if self.imm_count == 0 {
                    self.imm = byte as u16;
                } else {
                    self.imm |= (byte as u16) << 8;
                }
                self.imm_count += 1;
            }
            MicroOp::CtxFromImm => self.ctx = self.imm,
            MicroOp::ReadReg(reg) => self.ctx = self.reg8(reg) as u16,
            MicroOp::ReadReg16(rp) => self.ctx = self.read_reg16(rp),
            MicroOp::ReadMem(mode) => {
                let addr = self.resolve_addr(mode);
                self.ctx = mmu.read(addr) as u16;
            }
            MicroOp::WriteReg(reg) => self.set_reg8(reg, self.ctx as u8),
            MicroOp::WriteReg16(rp) => self.write_reg16(rp, self.ctx),
            MicroOp::WriteMem(mode) => {
                let addr = self.resolve_addr(mode);
                mmu.write(addr, self.ctx as u8);
            }
            MicroOp::WriteMemLo(mode) => {
                let addr = self.resolve_addr(mode);
                mmu.write(addr, self.ctx as u8);
            }
            MicroOp::WriteMemHi(mode) => {
                let addr = self.resolve_addr(mode).wrapping_add(1);
                mmu.write(addr, (self.ctx >> 8) as u8);
            }
            MicroOp::Alu(alu_op) => self.exec_alu(alu_op),
            MicroOp::AluAddHl => alu::add16_hl(&mut self.regs, self.ctx),
            MicroOp::AluSpSigned => {
                let sp = self.regs.sp;
                self.ctx = alu::add16_signed(&mut self.regs, sp, self.imm as u8);
            }
            MicroOp::Inc16 => self.ctx = self.ctx.wrapping_add(1),
            MicroOp::Dec16 => self.ctx = self.ctx.wrapping_sub(1),
            MicroOp::CheckCond(cond) => return self.cond(cond),
            MicroOp::Delay => {}
            MicroOp::LoadPc => self.ctx = self.regs.pc,
            MicroOp::JumpImm => self.regs.pc = self.imm,
            MicroOp::JumpCtx => self.regs.pc = self.ctx,
            MicroOp::JumpRel => {
                let offset = self.imm as u8 as i8;
                self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
            }
            MicroOp::JumpTo(target) => self.regs.pc = target,
            MicroOp::PushHi => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                mmu.write(self.regs.sp, (self.ctx >> 8) as u8);
            }
            MicroOp::PushLo => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                mmu.write(self.regs.sp, self.ctx as u8);
            }
            MicroOp::PopLo => {
                self.ctx = (self.ctx & 0xFF00) | mmu.read(self.regs.sp) as u16;
                self.regs.sp = self.regs.sp.wrapping_add(1);
            }
            MicroOp::PopHi => {
                self.ctx = (self.ctx & 0x00FF) | (mmu.read(self.regs.sp) as u16) << 8;
                self.regs.sp = self.regs.sp.wrapping_add(1);
            }
            MicroOp::EnableInterrupts { delayed } => mmu.interrupts.enable(delayed),
            MicroOp::DisableInterrupts => mmu.interrupts.disable(false),
            MicroOp::Halt => {
                if !mmu.interrupts.ime() && mmu.interrupts.pending_ignoring_ime().is_some() {
                    self.halt_bug = true;
                } else {
                    self.halted = true;
                }
            }
            MicroOp::Stop => {
                // STOP skips a padding byte.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                if !mmu.speed_switch() {
                    self.stopped = true;
                }
            }
        }
        true
    }

    fn exec_alu(&mut self, op: AluOp) {
        let value = self.ctx as u8;
        let regs = &mut self.regs;
        match op {
            AluOp::Add => alu::add(regs, value, false),
            AluOp::Adc => alu::add(regs, value, true),
            AluOp::Sub => alu::sub(regs, value, false),
            AluOp::Sbc => alu::sub(regs, value, true),
            AluOp::And => alu::and(regs, value),
            AluOp::Xor => alu::xor(regs, value),
            AluOp::Or => alu::or(regs, value),
            AluOp::Cp => alu::cp(regs, value),
            AluOp::Inc => self.ctx = alu::inc8(regs, value) as u16,
            AluOp::Dec => self.ctx = alu::dec8(regs, value) as u16,
            AluOp::Rlc => self.ctx = alu::rlc(regs, value, true) as u16,
            AluOp::Rrc => self.ctx = alu::rrc(regs, value, true) as u16,
            AluOp::Rl => self.ctx = alu::rl(regs, value, true) as u16,
            AluOp::Rr => self.ctx = alu::rr(regs, value, true) as u16,
            AluOp::Sla => self.ctx = alu::sla(regs, value) as u16,
            AluOp::Sra => self.ctx = alu::sra(regs, value) as u16,
            AluOp::Swap => self.ctx = alu::swap(regs, value) as u16,
            AluOp::Srl => self.ctx = alu::srl(regs, value) as u16,
            AluOp::Bit(n) => alu::bit(regs, value, n),
            AluOp::Res(n) => self.ctx = (value & !(1 << n)) as u16,
            AluOp::Set(n) => self.ctx = (value | 1 << n) as u16,
            AluOp::Rlca => self.ctx = alu::rlc(regs, value, false) as u16,
            AluOp::Rrca => self.ctx = alu::rrc(regs, value, false) as u16,
            AluOp::Rla => self.ctx = alu::rl(regs, value, false) as u16,
            AluOp::Rra => self.ctx = alu::rr(regs, value, false) as u16,
            AluOp::Daa => alu::daa(regs),
            AluOp::Cpl => alu::cpl(regs),
            AluOp::Scf => alu::scf(regs),
            AluOp::Ccf => alu::ccf(regs),
        }
    }

    /// Formatted CPU state string for diagnostics.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.pc,
            self.regs.sp,
            self.m_cycles
        )
    }

    pub(crate) fn state_snapshot(&self) -> (Registers, bool, bool, bool, u64, u32) {
        (
            self.regs,
            self.halted,
            self.stopped,
            self.halt_bug,
            self.m_cycles,
            self.tick_divider,
        )
    }

    pub(crate) fn restore(&mut self, state: (Registers, bool, bool, bool, u64, u32)) {
        let (regs, halted, stopped, halt_bug, m_cycles, tick_divider) = state;
        self.regs = regs;
        self.halted = halted;
        self.stopped = stopped;
        self.halt_bug = halt_bug;
        self.m_cycles = m_cycles;
        self.tick_divider = tick_divider;
        self.state = State::Fetch;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
