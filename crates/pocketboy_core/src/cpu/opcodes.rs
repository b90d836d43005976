//! The declarative instruction table.
//!
//! Every opcode (base page and 0xCB page) maps to an ordered list of typed
//! micro-operations. Operand loads, ALU applications and stores compose the
//! same way across the whole set, so the table is built from small pattern
//! loops over the standard operand encodings rather than 512 hand-written
//! entries. Ops that touch the bus (or burn an internal delay) cost one
//! machine cycle each; pure register ops ride along for free. An
//! instruction's total cost is therefore the opcode fetch plus its
//! cycle-consuming ops, which reproduces the documented timings including
//! the conditional variants.

use once_cell::sync::Lazy;

/// 8-bit register operands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// 16-bit register pair operands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg16 {
    Af,
    Bc,
    De,
    Hl,
    Sp,
}

/// Memory addressing modes used by load/store micro-ops.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Addr {
    Bc,
    De,
    Hl,
    /// (HL), post-incrementing HL.
    HlInc,
    /// (HL), post-decrementing HL.
    HlDec,
    /// The 16-bit immediate fetched by preceding `ReadImm` ops.
    Imm16,
    /// 0xFF00 + 8-bit immediate.
    HighImm8,
    /// 0xFF00 + C.
    HighC,
}

/// Branch conditions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
}

/// ALU operations applied by the `Alu` micro-op.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    // Accumulator arithmetic/logic (operand in the working value).
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    // Working-value unary ops (INC r / DEC r and the CB rotate family).
    Inc,
    Dec,
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
    Bit(u8),
    Res(u8),
    Set(u8),
    // Accumulator rotates with Z forced clear.
    Rlca,
    Rrca,
    Rla,
    Rra,
    // A/flag-only specials.
    Daa,
    Cpl,
    Scf,
    Ccf,
}

/// One micro-operation. Ops returning `true` from [`MicroOp::consumes_cycle`]
/// take a machine cycle; the rest execute within the current one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MicroOp {
    /// Fetch one immediate byte into the immediate buffer.
    ReadImm,
    /// Copy the immediate buffer into the working value.
    CtxFromImm,
    ReadReg(Reg8),
    ReadReg16(Reg16),
    ReadMem(Addr),
    WriteReg(Reg8),
    WriteReg16(Reg16),
    WriteMem(Addr),
    /// Store the low byte of the working value (16-bit memory stores).
    WriteMemLo(Addr),
    /// Store the high byte of the working value at address + 1.
    WriteMemHi(Addr),
    Alu(AluOp),
    /// HL += working value (flags per ADD HL,rr).
    AluAddHl,
    /// working value = SP + signed immediate (flags per ADD SP,r8).
    AluSpSigned,
    /// 16-bit increment/decrement of the working value, no flags.
    Inc16,
    Dec16,
    /// Abort the remaining ops unless the condition holds.
    CheckCond(Cond),
    /// Internal machine cycle with no bus traffic.
    Delay,
    /// working value = PC (return-address capture).
    LoadPc,
    /// PC = immediate buffer.
    JumpImm,
    /// PC = working value.
    JumpCtx,
    /// PC += immediate as signed 8-bit offset.
    JumpRel,
    /// PC = fixed target (RST vectors).
    JumpTo(u16),
    /// Stack push/pop of the working value, one byte per cycle.
    PushHi,
    PushLo,
    PopLo,
    PopHi,
    EnableInterrupts {
        delayed: bool,
    },
    DisableInterrupts,
    Halt,
    Stop,
}

impl MicroOp {
    /// Whether this op consumes a machine cycle (a bus access or an
    /// internal delay).
    pub fn consumes_cycle(self) -> bool {
        matches!(
            self,
            MicroOp::ReadImm
                | MicroOp::ReadMem(_)
                | MicroOp::WriteMem(_)
                | MicroOp::WriteMemLo(_)
                | MicroOp::WriteMemHi(_)
                | MicroOp::Delay
                | MicroOp::PushHi
                | MicroOp::PushLo
                | MicroOp::PopLo
                | MicroOp::PopHi
        )
    }
}

/// A decoded instruction: display label plus its micro-op list.
pub struct Instr {
    pub label: String,
    pub ops: Vec<MicroOp>,
}

impl Instr {
    fn new(label: String, ops: Vec<MicroOp>) -> Self {
        Self { label, ops }
    }

    /// Total machine cycles when every op executes (the taken path),
    /// including the opcode fetch itself.
    pub fn cycles_taken(&self) -> u32 {
        1 + self.ops.iter().filter(|op| op.consumes_cycle()).count() as u32
    }
}

pub struct OpcodeTable {
    base: Vec<Option<Instr>>,
    cb: Vec<Instr>,
}

impl OpcodeTable {
    pub fn base(&self, opcode: u8) -> Option<&Instr> {
        self.base[opcode as usize].as_ref()
    }

    pub fn cb(&self, opcode: u8) -> &Instr {
        &self.cb[opcode as usize]
    }
}

pub static OPCODES: Lazy<OpcodeTable> = Lazy::new(build_table);

/// Operand order of the standard r-encoding in bits 2:0 / 5:3. Index 6 is
/// the (HL) slot.
const R_OPERANDS: [Option<Reg8>; 8] = [
    Some(Reg8::B),
    Some(Reg8::C),
    Some(Reg8::D),
    Some(Reg8::E),
    Some(Reg8::H),
    Some(Reg8::L),
    None,
    Some(Reg8::A),
];

const R_NAMES: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

const RP_OPERANDS: [Reg16; 4] = [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Sp];
const RP_NAMES: [&str; 4] = ["BC", "DE", "HL", "SP"];

const RP2_OPERANDS: [Reg16; 4] = [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Af];
const RP2_NAMES: [&str; 4] = ["BC", "DE", "HL", "AF"];

const CC_OPERANDS: [Cond; 4] = [Cond::Nz, Cond::Z, Cond::Nc, Cond::C];
const CC_NAMES: [&str; 4] = ["NZ", "Z", "NC", "C"];

const ALU_OPERATIONS: [AluOp; 8] = [
    AluOp::Add,
    AluOp::Adc,
    AluOp::Sub,
    AluOp::Sbc,
    AluOp::And,
    AluOp::Xor,
    AluOp::Or,
    AluOp::Cp,
];
const ALU_NAMES: [&str; 8] = [
    "ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP ",
];

const ROT_OPERATIONS: [AluOp; 8] = [
    AluOp::Rlc,
    AluOp::Rrc,
    AluOp::Rl,
    AluOp::Rr,
    AluOp::Sla,
    AluOp::Sra,
    AluOp::Swap,
    AluOp::Srl,
];
const ROT_NAMES: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"];

/// Micro-ops that load the r-encoded operand into the working value.
fn load_r(idx: usize) -> Vec<MicroOp> {
    match R_OPERANDS[idx] {
        Some(reg) => vec![MicroOp::ReadReg(reg)],
        None => vec![MicroOp::ReadMem(Addr::Hl)],
    }
}

/// Micro-ops that store the working value into the r-encoded operand.
fn store_r(idx: usize) -> Vec<MicroOp> {
    match R_OPERANDS[idx] {
        Some(reg) => vec![MicroOp::WriteReg(reg)],
        None => vec![MicroOp::WriteMem(Addr::Hl)],
    }
}

fn build_table() -> OpcodeTable {
    let mut base: Vec<Option<Instr>> = (0..256).map(|_| None).collect();
    let mut set = |opcode: u8, label: String, ops: Vec<MicroOp>| {
        debug_assert!(base[opcode as usize].is_none(), "opcode 0x{opcode:02X} redefined");
        base[opcode as usize] = Some(Instr::new(label, ops));
    };

    use MicroOp::*;

    set(0x00, "NOP".into(), vec![]);
    set(0x10, "STOP".into(), vec![Stop]);
    set(0x76, "HALT".into(), vec![Halt]);

    // 16-bit immediate loads, INC/DEC rr, ADD HL,rr.
    for (i, (&rp, name)) in RP_OPERANDS.iter().zip(RP_NAMES).enumerate() {
        let i = i as u8;
        set(
            0x01 | i << 4,
            format!("LD {name},d16"),
            vec![ReadImm, ReadImm, CtxFromImm, WriteReg16(rp)],
        );
        set(
            0x03 | i << 4,
            format!("INC {name}"),
            vec![ReadReg16(rp), Inc16, WriteReg16(rp), Delay],
        );
        set(
            0x0B | i << 4,
            format!("DEC {name}"),
            vec![ReadReg16(rp), Dec16, WriteReg16(rp), Delay],
        );
        set(
            0x09 | i << 4,
            format!("ADD HL,{name}"),
            vec![ReadReg16(rp), AluAddHl, Delay],
        );
    }

    // Indirect accumulator loads through BC/DE/HL+/HL-.
    let indirect = [
        (Addr::Bc, "(BC)"),
        (Addr::De, "(DE)"),
        (Addr::HlInc, "(HL+)"),
        (Addr::HlDec, "(HL-)"),
    ];
    for (i, (addr, name)) in indirect.into_iter().enumerate() {
        let i = i as u8;
        set(
            0x02 | i << 4,
            format!("LD {name},A"),
            vec![ReadReg(Reg8::A), WriteMem(addr)],
        );
        set(
            0x0A | i << 4,
            format!("LD A,{name}"),
            vec![ReadMem(addr), WriteReg(Reg8::A)],
        );
    }

    // INC r / DEC r / LD r,d8 across the r-encoding.
    for idx in 0..8 {
        let slot = (idx as u8) << 3;
        let name = R_NAMES[idx];

        let mut ops = load_r(idx);
        ops.push(Alu(AluOp::Inc));
        ops.extend(store_r(idx));
        set(0x04 | slot, format!("INC {name}"), ops);

        let mut ops = load_r(idx);
        ops.push(Alu(AluOp::Dec));
        ops.extend(store_r(idx));
        set(0x05 | slot, format!("DEC {name}"), ops);

        let mut ops = vec![ReadImm, CtxFromImm];
        ops.extend(store_r(idx));
        set(0x06 | slot, format!("LD {name},d8"), ops);
    }

    // Accumulator rotates (Z always cleared).
    for (opcode, label, op) in [
        (0x07, "RLCA", AluOp::Rlca),
        (0x0F, "RRCA", AluOp::Rrca),
        (0x17, "RLA", AluOp::Rla),
        (0x1F, "RRA", AluOp::Rra),
    ] {
        set(
            opcode,
            label.into(),
            vec![ReadReg(Reg8::A), Alu(op), WriteReg(Reg8::A)],
        );
    }

    set(
        0x08,
        "LD (a16),SP".into(),
        vec![
            ReadImm,
            ReadImm,
            ReadReg16(Reg16::Sp),
            WriteMemLo(Addr::Imm16),
            WriteMemHi(Addr::Imm16),
        ],
    );

    // Relative jumps.
    set(0x18, "JR r8".into(), vec![ReadImm, JumpRel, Delay]);
    for (i, (&cond, name)) in CC_OPERANDS.iter().zip(CC_NAMES).enumerate() {
        set(
            0x20 | (i as u8) << 3,
            format!("JR {name},r8"),
            vec![ReadImm, CheckCond(cond), JumpRel, Delay],
        );
    }

    // Accumulator/flag specials.
    set(0x27, "DAA".into(), vec![Alu(AluOp::Daa)]);
    set(0x2F, "CPL".into(), vec![Alu(AluOp::Cpl)]);
    set(0x37, "SCF".into(), vec![Alu(AluOp::Scf)]);
    set(0x3F, "CCF".into(), vec![Alu(AluOp::Ccf)]);

    // The 0x40-0x7F LD block (0x76 is HALT, set above).
    for dst in 0..8 {
        for src in 0..8 {
            let opcode = 0x40 | (dst as u8) << 3 | src as u8;
            if opcode == 0x76 {
                continue;
            }
            let mut ops = load_r(src);
            ops.extend(store_r(dst));
            set(opcode, format!("LD {},{}", R_NAMES[dst], R_NAMES[src]), ops);
        }
    }

    // The 0x80-0xBF ALU block.
    for (i, (&op, name)) in ALU_OPERATIONS.iter().zip(ALU_NAMES).enumerate() {
        for src in 0..8 {
            let opcode = 0x80 | (i as u8) << 3 | src as u8;
            let mut ops = load_r(src);
            ops.push(Alu(op));
            set(opcode, format!("{name}{}", R_NAMES[src]), ops);
        }
        // Immediate variant.
        set(
            0xC6 | (i as u8) << 3,
            format!("{name}d8"),
            vec![ReadImm, CtxFromImm, Alu(op)],
        );
    }

    // Conditional returns, jumps and calls.
    for (i, (&cond, name)) in CC_OPERANDS.iter().zip(CC_NAMES).enumerate() {
        let slot = (i as u8) << 3;
        set(
            0xC0 | slot,
            format!("RET {name}"),
            vec![Delay, CheckCond(cond), PopLo, PopHi, JumpCtx, Delay],
        );
        set(
            0xC2 | slot,
            format!("JP {name},a16"),
            vec![ReadImm, ReadImm, CheckCond(cond), JumpImm, Delay],
        );
        set(
            0xC4 | slot,
            format!("CALL {name},a16"),
            vec![
                ReadImm,
                ReadImm,
                CheckCond(cond),
                Delay,
                LoadPc,
                PushHi,
                PushLo,
                JumpImm,
            ],
        );
    }

    // PUSH/POP.
    for (i, (&rp, name)) in RP2_OPERANDS.iter().zip(RP2_NAMES).enumerate() {
        let i = i as u8;
        set(
            0xC1 | i << 4,
            format!("POP {name}"),
            vec![PopLo, PopHi, WriteReg16(rp)],
        );
        set(
            0xC5 | i << 4,
            format!("PUSH {name}"),
            vec![ReadReg16(rp), Delay, PushHi, PushLo],
        );
    }

    set(
        0xC3,
        "JP a16".into(),
        vec![ReadImm, ReadImm, JumpImm, Delay],
    );
    set(
        0xCD,
        "CALL a16".into(),
        vec![ReadImm, ReadImm, Delay, LoadPc, PushHi, PushLo, JumpImm],
    );
    set(0xC9, "RET".into(), vec![PopLo, PopHi, JumpCtx, Delay]);
    set(
        0xD9,
        "RETI".into(),
        vec![
            PopLo,
            PopHi,
            JumpCtx,
            Delay,
            EnableInterrupts { delayed: false },
        ],
    );

    // RST vectors.
    for i in 0..8u8 {
        let target = i as u16 * 8;
        set(
            0xC7 | i << 3,
            format!("RST {target:02X}H"),
            vec![Delay, LoadPc, PushHi, PushLo, JumpTo(target)],
        );
    }

    // High-page and absolute accumulator loads.
    set(
        0xE0,
        "LDH (a8),A".into(),
        vec![ReadImm, ReadReg(Reg8::A), WriteMem(Addr::HighImm8)],
    );
    set(
        0xF0,
        "LDH A,(a8)".into(),
        vec![ReadImm, ReadMem(Addr::HighImm8), WriteReg(Reg8::A)],
    );
    set(
        0xE2,
        "LD (C),A".into(),
        vec![ReadReg(Reg8::A), WriteMem(Addr::HighC)],
    );
    set(
        0xF2,
        "LD A,(C)".into(),
        vec![ReadMem(Addr::HighC), WriteReg(Reg8::A)],
    );
    set(
        0xEA,
        "LD (a16),A".into(),
        vec![ReadImm, ReadImm, ReadReg(Reg8::A), WriteMem(Addr::Imm16)],
    );
    set(
        0xFA,
        "LD A,(a16)".into(),
        vec![ReadImm, ReadImm, ReadMem(Addr::Imm16), WriteReg(Reg8::A)],
    );

    // SP arithmetic.
    set(
        0xE8,
        "ADD SP,r8".into(),
        vec![ReadImm, AluSpSigned, Delay, Delay, WriteReg16(Reg16::Sp)],
    );
    set(
        0xF8,
        "LD HL,SP+r8".into(),
        vec![ReadImm, AluSpSigned, WriteReg16(Reg16::Hl), Delay],
    );
    set(
        0xF9,
        "LD SP,HL".into(),
        vec![ReadReg16(Reg16::Hl), WriteReg16(Reg16::Sp), Delay],
    );

    set(0xE9, "JP HL".into(), vec![ReadReg16(Reg16::Hl), JumpCtx]);

    set(0xF3, "DI".into(), vec![DisableInterrupts]);
    set(0xFB, "EI".into(), vec![EnableInterrupts { delayed: true }]);

    // 0xCB is the prefix byte, handled by the fetch state machine; the 11
    // unused encodings (0xD3 etc.) stay None and are reported as unknown.

    // The CB page is fully regular: eight operations across the r-encoding,
    // then BIT/RES/SET with the bit number in bits 5:3.
    let mut cb = Vec::with_capacity(256);
    for opcode in 0u16..256 {
        let opcode = opcode as u8;
        let operand = (opcode & 0x07) as usize;
        let bit = opcode >> 3 & 0x07;
        let name = R_NAMES[operand];

        let instr = match opcode {
            0x00..=0x3F => {
                let which = (opcode >> 3) as usize;
                let mut ops = load_r(operand);
                ops.push(Alu(ROT_OPERATIONS[which]));
                ops.extend(store_r(operand));
                Instr::new(format!("{} {name}", ROT_NAMES[which]), ops)
            }
            0x40..=0x7F => {
                let mut ops = load_r(operand);
                ops.push(Alu(AluOp::Bit(bit)));
                Instr::new(format!("BIT {bit},{name}"), ops)
            }
            0x80..=0xBF => {
                let mut ops = load_r(operand);
                ops.push(Alu(AluOp::Res(bit)));
                ops.extend(store_r(operand));
                Instr::new(format!("RES {bit},{name}"), ops)
            }
            _ => {
                let mut ops = load_r(operand);
                ops.push(Alu(AluOp::Set(bit)));
                ops.extend(store_r(operand));
                Instr::new(format!("SET {bit},{name}"), ops)
            }
        };
        cb.push(instr);
    }

    OpcodeTable { base, cb }
}
