//! # Thumb instruction decoding
//!
//! Decodes the 16-bit compact encoding and the 32-bit encoding used by
//! Cortex-M cores into a closed set of [`Operation`]s. Only the encodings
//! emitted by the toolchain for the analysed programs are recognized, every
//! other bit pattern is rejected with a [`DecodeError`].

use std::fmt;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

mod thumb;
mod wide;

pub use thumb::decode_thumb;
pub use wide::decode_arm32;

//
// Public Interface
//

pub type Register = u8;

/// Bitmask over `r0` .. `pc`, bit `n` selects register `n`.
pub type RegisterList = u16;

pub const SP: Register = 13;
pub const LR: Register = 14;
pub const PC: Register = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstructionSet {
    /// 16-bit compact encoding (`t` records)
    Thumb,
    /// 32-bit encoding (`a` records), first halfword in the upper bits
    Arm32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported {group} instruction {code:#06x} (opcode bits {opcode:#b}) at {address:#x}")]
    UnsupportedEncoding {
        address: u32,
        code: u32,
        group: &'static str,
        opcode: u32,
    },

    #[error("32-bit instruction {code:#06x} tagged as 16-bit at {address:#x}")]
    WideInstructionInThumbStream { address: u32, code: u32 },
}

/// Decode a raw word of the given instruction set.
pub fn decode(address: u32, code: u32, isa: InstructionSet) -> Result<Instruction, DecodeError> {
    match isa {
        InstructionSet::Thumb => decode_thumb(address, code as u16),
        InstructionSet::Arm32 => decode_arm32(address, code),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    Eq,
    Ne,
    Ls,
    Ge,
    Lt,
    Le,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Shift {
    #[strum(serialize = "lsls")]
    Lsl,
    #[strum(serialize = "lsrs")]
    Lsr,
    #[strum(serialize = "asrs")]
    Asr,
}

/// Two-register data processing operations of the compact encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum AluOp {
    #[strum(serialize = "ands")]
    And,
    #[strum(serialize = "eors")]
    Eor,
    #[strum(serialize = "orrs")]
    Orr,
    #[strum(serialize = "bics")]
    Bic,
    #[strum(serialize = "mvns")]
    Mvn,
    #[strum(serialize = "muls")]
    Mul,
    #[strum(serialize = "tst")]
    Tst,
    #[strum(serialize = "negs")]
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Extend {
    Sxth,
    Sxtb,
    Uxth,
    Uxtb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    Word,
    Halfword,
    Byte,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Register(Register),
    Immediate(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `movs rd, #imm8`
    MoveImmediate { rd: Register, imm: u8 },
    /// `movs rd, rm` (low registers, sets flags) or `mov rd, rm`
    MoveRegister {
        rd: Register,
        rm: Register,
        set_flags: bool,
    },
    Shift {
        op: Shift,
        rd: Register,
        rm: Register,
        amount: u8,
    },
    /// `adds|subs rd, rn, rm|#imm3`
    AddSubtract {
        rd: Register,
        rn: Register,
        operand: Operand,
        subtract: bool,
    },
    /// `adds|subs rdn, #imm8`
    AddSubtractImmediate {
        rdn: Register,
        imm: u8,
        subtract: bool,
    },
    /// `add rdn, rm` on any register, leaves the flags untouched
    AddHigh { rdn: Register, rm: Register },
    Compare { rn: Register, operand: Operand },
    Alu {
        op: AluOp,
        rdn: Register,
        rm: Register,
    },
    Extend {
        op: Extend,
        rd: Register,
        rm: Register,
    },
    ConditionalBranch { condition: Condition, target: u32 },
    Branch { target: u32 },
    /// `bl label`
    Call { target: u32 },
    /// `bx rm`, a function return for `bx lr`
    BranchExchange { rm: Register },
    /// `blx rm`
    CallExchange { rm: Register },
    /// `ldr rt, [pc, #imm8 * 4]`, `value` is filled in from the literal pool
    LoadLiteral {
        rt: Register,
        imm8: u8,
        value: Option<u32>,
    },
    LoadStore {
        load: bool,
        width: Width,
        rt: Register,
        rn: Register,
        offset: Operand,
    },
    /// `ldmia|stmia rn!, {..}`
    LoadStoreMultiple {
        load: bool,
        rn: Register,
        registers: RegisterList,
    },
    Push { registers: RegisterList },
    /// `pop {..}`, a function return when `pc` is in the list
    Pop { registers: RegisterList },
    /// `add|sub sp, #imm7 * 4`
    AdjustStack { imm: u32, subtract: bool },
    /// `adr rd, pc, #imm` or `add rd, sp, #imm`
    AddressOf {
        rd: Register,
        base: Register,
        imm: u32,
    },
    /// `mul rd, rn, rm` (32-bit encoding)
    Multiply {
        rd: Register,
        rn: Register,
        rm: Register,
    },
    SignedDivide {
        rd: Register,
        rn: Register,
        rm: Register,
    },
    /// `add.w rd, rn, #imm` (encoding T3)
    AddWide {
        rd: Register,
        rn: Register,
        imm: u32,
        set_flags: bool,
    },
    Nop,
}

/// A decoded instruction together with the identifiers assigned to it by
/// the later passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u32,
    pub operation: Operation,
    pub reachable: bool,
    pub place_id: u32,
    pub transition_id: u32,
    pub transition_id_taken: Option<u32>,
    pub target_id_taken: Option<u32>,
}

impl Instruction {
    pub fn new(address: u32, operation: Operation) -> Self {
        Self {
            address,
            operation,
            reachable: false,
            place_id: 0,
            transition_id: 0,
            transition_id_taken: None,
            target_id_taken: None,
        }
    }

    /// Statically known destination of a branch or call.
    pub fn branch_address(&self) -> Option<u32> {
        match self.operation {
            Operation::ConditionalBranch { target, .. }
            | Operation::Branch { target }
            | Operation::Call { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.operation, Operation::Call { .. })
    }

    pub fn is_return(&self) -> bool {
        match self.operation {
            Operation::BranchExchange { rm } => rm == LR,
            Operation::Pop { registers } => registers & (1 << PC) != 0,
            _ => false,
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.operation, Operation::ConditionalBranch { .. })
    }

    pub fn is_unconditional_branch(&self) -> bool {
        matches!(self.operation, Operation::Branch { .. })
    }

    pub fn condition(&self) -> Option<Condition> {
        match self.operation {
            Operation::ConditionalBranch { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Address of the literal pool entry read by a PC-relative load.
    pub fn literal_address(&self) -> Option<u32> {
        match self.operation {
            Operation::LoadLiteral { imm8, .. } => {
                Some(self.address.wrapping_add(2).wrapping_add(u32::from(imm8) * 4))
            }
            _ => None,
        }
    }

    /// Number of data memory accesses performed when the instruction fires.
    pub fn memory_access_count(&self) -> u32 {
        match self.operation {
            Operation::LoadLiteral { .. } | Operation::LoadStore { .. } => 1,
            Operation::LoadStoreMultiple { registers, .. }
            | Operation::Push { registers }
            | Operation::Pop { registers } => registers.count_ones(),
            _ => 0,
        }
    }

    /// Guard of the taken edge, `None` for anything but conditional branches.
    pub fn guard(&self, core: &str) -> Option<String> {
        self.condition().map(|condition| condition.guard(core))
    }
}

impl Condition {
    /// Status register test in the model checker's guard syntax.
    pub fn guard(self, core: &str) -> String {
        let flag = |mask: &str, set: bool| {
            let relation = if set { "#eqeq" } else { "#noteq" };
            format!("((st[{}].regs.sr & {}) {} {})", core, mask, relation, mask)
        };

        match self {
            Condition::Eq => flag("Zmask", true),
            Condition::Ne => flag("Zmask", false),
            Condition::Lt => flag("Nmask", true),
            Condition::Le => format!("{} || {}", flag("Zmask", true), flag("Nmask", true)),
            Condition::Ls => format!("{} || {}", flag("Zmask", true), flag("Cmask", false)),
            Condition::Ge => format!("{} || {}", flag("Zmask", true), flag("Nmask", false)),
        }
    }
}

pub fn register_name(reg: Register) -> String {
    match reg {
        SP => String::from("sp"),
        LR => String::from("lr"),
        PC => String::from("pc"),
        r => format!("r{}", r),
    }
}

/// Registers of a list in ascending order.
pub fn registers_of(list: RegisterList) -> impl Iterator<Item = Register> {
    (0..16u8).filter(move |r| list & (1 << r) != 0)
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", register_name(*r)),
            Operand::Immediate(imm) => write!(f, "#{}", imm),
        }
    }
}

struct DisplayList(RegisterList);

impl fmt::Display for DisplayList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<String> = registers_of(self.0).map(register_name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[rustfmt::skip]
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let r = |reg: &Register| register_name(*reg);
        match self {
            Operation::MoveImmediate { rd, imm } =>
                write!(f, "movs {}, #{}", r(rd), imm),
            Operation::MoveRegister { rd, rm, set_flags } =>
                write!(f, "{} {}, {}", if *set_flags { "movs" } else { "mov" }, r(rd), r(rm)),
            Operation::Shift { op, rd, rm, amount } =>
                write!(f, "{} {}, {}, #{}", op, r(rd), r(rm), amount),
            Operation::AddSubtract { rd, rn, operand, subtract } =>
                write!(f, "{} {}, {}, {}", if *subtract { "subs" } else { "adds" }, r(rd), r(rn), operand),
            Operation::AddSubtractImmediate { rdn, imm, subtract } =>
                write!(f, "{} {}, #{}", if *subtract { "subs" } else { "adds" }, r(rdn), imm),
            Operation::AddHigh { rdn, rm } =>
                write!(f, "add {}, {}", r(rdn), r(rm)),
            Operation::Compare { rn, operand } =>
                write!(f, "cmp {}, {}", r(rn), operand),
            Operation::Alu { op, rdn, rm } =>
                write!(f, "{} {}, {}", op, r(rdn), r(rm)),
            Operation::Extend { op, rd, rm } =>
                write!(f, "{} {}, {}", op, r(rd), r(rm)),
            Operation::ConditionalBranch { condition, target } =>
                write!(f, "b{}.n {:x}", condition, target),
            Operation::Branch { target } =>
                write!(f, "b.n {:x}", target),
            Operation::Call { target } =>
                write!(f, "bl {:x}", target),
            Operation::BranchExchange { rm } =>
                write!(f, "bx {}", r(rm)),
            Operation::CallExchange { rm } =>
                write!(f, "blx {}", r(rm)),
            Operation::LoadLiteral { rt, imm8, .. } =>
                write!(f, "ldr {}, [pc, #{}]", r(rt), u32::from(*imm8) << 2),
            Operation::LoadStore { load, width, rt, rn, offset } => {
                let suffix = match width {
                    Width::Word => "",
                    Width::Halfword => "h",
                    Width::Byte => "b",
                };
                let mnemonic = if *load { "ldr" } else { "str" };
                write!(f, "{}{} {}, [{}, {}]", mnemonic, suffix, r(rt), r(rn), offset)
            }
            Operation::LoadStoreMultiple { load, rn, registers } =>
                write!(f, "{} {}!, {}", if *load { "ldmia" } else { "stmia" }, r(rn), DisplayList(*registers)),
            Operation::Push { registers } =>
                write!(f, "push {}", DisplayList(*registers)),
            Operation::Pop { registers } =>
                write!(f, "pop {}", DisplayList(*registers)),
            Operation::AdjustStack { imm, subtract } =>
                write!(f, "{} sp, #{}", if *subtract { "sub" } else { "add" }, imm),
            Operation::AddressOf { rd, base: PC, imm } =>
                write!(f, "adr {}, pc, #{}", r(rd), imm),
            Operation::AddressOf { rd, base, imm } =>
                write!(f, "add {}, {}, #{}", r(rd), r(base), imm),
            Operation::Multiply { rd, rn, rm } =>
                write!(f, "mul {}, {}, {}", r(rd), r(rn), r(rm)),
            Operation::SignedDivide { rd, rn, rm } =>
                write!(f, "sdiv {}, {}, {}", r(rd), r(rn), r(rm)),
            Operation::AddWide { rd, rn, imm, set_flags } =>
                write!(f, "{} {}, {}, #{}", if *set_flags { "adds.w" } else { "add.w" }, r(rd), r(rn), imm),
            Operation::Nop =>
                write!(f, "nop"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}: {}", self.address, self.operation)
    }
}

//
// Private Implementation
//

/// Extract `width` bits starting at bit `lsb`.
fn field(value: u32, lsb: u32, width: u32) -> u32 {
    (value >> lsb) & ((1 << width) - 1)
}

fn bit(value: u32, position: u32) -> bool {
    (value >> position) & 1 == 1
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Branch destination relative to the fetch-stage program counter.
fn branch_target(address: u32, offset: i32) -> u32 {
    address.wrapping_add(4).wrapping_add(offset as u32)
}

fn unsupported(address: u32, code: u32, group: &'static str, opcode: u32) -> DecodeError {
    DecodeError::UnsupportedEncoding {
        address,
        code,
        group,
        opcode,
    }
}
