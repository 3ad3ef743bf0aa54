//! Opcodes and the flat `Instruction`/`Program` shapes the emitter produces
//! and the VM executes (spec.md §4.8/§6).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Push,
    Pop,
    Call,
    Ret,
    Term,
    Locall,
    Locals,
    Alloc,
    Loadw,
    Storew,
    Dub,
    Jump,
    JumpIf,
    Nop,
    DataAddr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Eq,
    Lte,
    Gte,
    Neq,
    RegFfi,
    CallFfi,
    PushFfiQword,
}

/// The type tag carried by a `PUSH_FFI_QWORD` cell or a `REG_FFI`
/// registration's return slot (spec.md §4.10). Encoded as a plain `i64` in
/// instruction args; `as_tag`/`from_tag` round-trip that encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiType {
    Int,
    Bool,
    Void,
    /// Terminates integer-argument scanning early (spec.md §4.10): "the
    /// dispatcher ... terminat[es] early when it encounters a None-typed
    /// cell."
    None,
}

impl FfiType {
    #[must_use]
    pub const fn as_tag(self) -> i64 {
        match self {
            Self::Int => 0,
            Self::Bool => 1,
            Self::Void => 2,
            Self::None => 3,
        }
    }

    #[must_use]
    pub const fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(Self::Int),
            1 => Some(Self::Bool),
            2 => Some(Self::Void),
            3 => Some(Self::None),
            _ => None,
        }
    }
}

/// One bytecode instruction: an opcode plus up to three 64-bit word
/// operands (spec.md §6: "Instruction is (op, arg1, arg2, arg3) where each
/// arg is a 64-bit word").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub arg1: i64,
    pub arg2: i64,
    pub arg3: i64,
}

impl Instruction {
    #[must_use]
    pub const fn bare(op: Opcode) -> Self {
        Self { op, arg1: 0, arg2: 0, arg3: 0 }
    }

    #[must_use]
    pub const fn with_arg1(op: Opcode, arg1: i64) -> Self {
        Self { op, arg1, arg2: 0, arg3: 0 }
    }

    #[must_use]
    pub const fn with_args(op: Opcode, arg1: i64, arg2: i64) -> Self {
        Self { op, arg1, arg2, arg3: 0 }
    }

    /// Opcode-named rendering used by tracers and `--show-emission`, as
    /// opposed to the compact `Display` form (SPEC_FULL.md's "named vs.
    /// positional instruction formatting" supplement).
    #[must_use]
    pub fn describe(&self) -> String {
        match self.op {
            Opcode::Push => format!("PUSH {}", self.arg1),
            Opcode::Call => format!("CALL argc={}", self.arg1),
            Opcode::CallFfi => format!("CALL_FFI argc={}", self.arg1),
            Opcode::Locall | Opcode::Locals => format!("{} idx={}", self.op, self.arg1),
            Opcode::Alloc => format!("ALLOC words={}", self.arg1),
            Opcode::Loadw | Opcode::Storew => format!("{} off={}", self.op, self.arg1),
            Opcode::Dub => format!("DUB depth={}", self.arg1),
            Opcode::Jump | Opcode::JumpIf => format!("{} ip={}", self.op, self.arg1),
            Opcode::DataAddr => format!("DATA_ADDR off={}", self.arg1),
            Opcode::RegFfi => format!("REG_FFI lib_off={} name_off={} ret={:?}", self.arg1, self.arg2, FfiType::from_tag(self.arg3)),
            Opcode::PushFfiQword => format!("PUSH_FFI_QWORD type={:?}", FfiType::from_tag(self.arg1)),
            Opcode::Ret => format!("RET has_value={}", self.arg1 != 0),
            _ => self.op.to_string(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.op, self.arg1, self.arg2, self.arg3)
    }
}

/// The emitter's complete output (spec.md §4.8): a read-only data blob and
/// the flat instruction vector.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub data: Vec<u8>,
    pub code: Vec<Instruction>,
}

impl Program {
    /// `--show-emission`: one line per instruction, using the named form.
    #[must_use]
    pub fn describe(&self) -> String {
        self.code.iter().enumerate().map(|(i, instr)| format!("{i:>5}  {}", instr.describe())).collect::<Vec<_>>().join("\n")
    }
}
