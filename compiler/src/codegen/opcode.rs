//! Bytecode instruction encoding.
//!
//! Register and jump-offset types follow the shape used by register-VM
//! reference material in the example pack (`Register = u8`, a 16-bit jump
//! placeholder patched after the body is emitted); the opcode list itself
//! is the spec's "representative opcode families" commitment — one opcode
//! per family member named in §4.7, not a literal transcription of any one
//! source.

pub type Register = u8;
pub type ConstIndex = u16;
pub type GlobalSlot = u16;

/// Placeholder written at a jump site before the real target is known.
pub const JUMP_PLACEHOLDER: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    LoadConst = 0,
    LoadGlobal,
    StoreGlobal,
    Move,

    AddI32,
    SubI32,
    MulI32,
    DivI32,
    ModI32,
    AddI64,
    SubI64,
    MulI64,
    DivI64,
    ModI64,
    AddU32,
    SubU32,
    MulU32,
    DivU32,
    ModU32,
    AddU64,
    SubU64,
    MulU64,
    DivU64,
    ModU64,
    AddF64,
    SubF64,
    MulF64,
    DivF64,
    ConcatStr,

    EqR,
    NotEqR,
    LessR,
    GreaterR,
    LessEqR,
    GreaterEqR,
    NotR,
    NegI32,
    NegI64,
    NegF64,
    BitNotI32,
    AndR,
    OrR,
    ShlI32,
    ShrI32,
    BitAndI32,
    BitOrI32,
    BitXorI32,

    Jump,
    JumpIfNot,
    Loop,

    CallR,
    ReturnR,
    ReturnVoid,

    PrintR,
    PrintNoNlR,
    PrintMultiR,

    GetIterR,
    IterNextR,

    GetUpvalueR,
    SetUpvalueR,

    I32ToI64,
    I64ToI32,
    U32ToU64,
    U64ToU32,
    I32ToF64,
    F64ToI32,
    BoolToI32,
    ToStringR,

    NewArrayR,
    ArrayGetR,
    ArraySetR,
    ArrayLenR,

    Halt,
}

/// One emitted instruction prior to being flattened into `Chunk::code`.
/// Operands are register indices, constant indices, or jump offsets
/// depending on the opcode; the emitter knows the shape for each.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<u8>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<u8>) -> Self {
        Instruction { opcode, operands }
    }

    pub fn encoded_len(&self) -> usize {
        1 + self.operands.len()
    }
}
