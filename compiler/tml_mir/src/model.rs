//! The MIR data model.
//!
//! A module carries typed functions made of basic blocks of
//! instructions over SSA-like value ids, plus the struct/enum layouts
//! and constants codegen needs. MIR is self-contained: names are plain
//! strings so a serialized module can be reconstructed without the
//! source or the interner.

use std::fmt;

/// SSA-like value id. Ids `0..params.len()` are the function's
/// parameters; the rest are instruction results.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct ValueId(pub u32);

/// Basic block id; `BlockId(0)` is the entry block.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct BlockId(pub u32);

/// MIR types. References are lowered to pointers before MIR, so the
/// surface distinction does not survive here.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum MirType {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    Str,
    Unit,
    Never,
    /// Struct/enum reference by (mangled) name.
    Named(String),
    /// Raw pointer.
    Ptr(Box<MirType>),
    Array(Box<MirType>, u64),
    Tuple(Vec<MirType>),
    Func {
        params: Vec<MirType>,
        ret: Box<MirType>,
    },
}

impl MirType {
    pub fn ptr_to(inner: MirType) -> MirType {
        MirType::Ptr(Box::new(inner))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, MirType::Unit)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, MirType::F32 | MirType::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            MirType::I8
                | MirType::I16
                | MirType::I32
                | MirType::I64
                | MirType::I128
                | MirType::U8
                | MirType::U16
                | MirType::U32
                | MirType::U64
                | MirType::U128
        )
    }
}

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirType::I8 => write!(f, "I8"),
            MirType::I16 => write!(f, "I16"),
            MirType::I32 => write!(f, "I32"),
            MirType::I64 => write!(f, "I64"),
            MirType::I128 => write!(f, "I128"),
            MirType::U8 => write!(f, "U8"),
            MirType::U16 => write!(f, "U16"),
            MirType::U32 => write!(f, "U32"),
            MirType::U64 => write!(f, "U64"),
            MirType::U128 => write!(f, "U128"),
            MirType::F32 => write!(f, "F32"),
            MirType::F64 => write!(f, "F64"),
            MirType::Bool => write!(f, "Bool"),
            MirType::Char => write!(f, "Char"),
            MirType::Str => write!(f, "Str"),
            MirType::Unit => write!(f, "Unit"),
            MirType::Never => write!(f, "Never"),
            MirType::Named(name) => write!(f, "{name}"),
            MirType::Ptr(inner) => write!(f, "*{inner}"),
            MirType::Array(elem, size) => write!(f, "[{elem}; {size}]"),
            MirType::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            MirType::Func { params, ret } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

/// Compile-time constant.
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Int(i64),
    /// IEEE bits, so the model stays `Eq`-free but deterministic.
    Float(u64),
    Bool(bool),
    Str(String),
    Unit,
}

impl Eq for Constant {}

/// Instruction operand.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

/// Binary opcodes. Integer and float arithmetic are distinct, the way
/// backends want them.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    FEq,
    FNe,
    FLt,
    FLe,
    FGt,
    FGe,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::FEq
                | BinOp::FNe
                | BinOp::FLt
                | BinOp::FLe
                | BinOp::FGt
                | BinOp::FGe
        )
    }
}

/// Cast kinds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CastKind {
    ZeroExtend,
    SignExtend,
    Truncate,
    FloatToInt,
    IntToFloat,
    FloatExtend,
    FloatTruncate,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

/// Instructions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Inst {
    /// `dst = op lhs, rhs`
    Binary {
        dst: ValueId,
        op: BinOp,
        ty: MirType,
        lhs: Operand,
        rhs: Operand,
    },
    /// Stack slot for a local; `dst` is a pointer to `ty`.
    Alloca { dst: ValueId, ty: MirType },
    Load {
        dst: ValueId,
        ty: MirType,
        ptr: Operand,
    },
    Store {
        ty: MirType,
        ptr: Operand,
        value: Operand,
    },
    /// GEP-style projection: address of field `index` of `base`.
    Gep {
        dst: ValueId,
        ty: MirType,
        base: Operand,
        index: u32,
    },
    /// Direct call; `dst` is absent for Unit-returning calls.
    Call {
        dst: Option<ValueId>,
        func: String,
        ty: MirType,
        args: Vec<Operand>,
    },
    /// Indirect call through a function-typed operand.
    CallIndirect {
        dst: Option<ValueId>,
        callee: Operand,
        ty: MirType,
        args: Vec<Operand>,
    },
    Cast {
        dst: ValueId,
        kind: CastKind,
        from: MirType,
        to: MirType,
        value: Operand,
    },
    Phi {
        dst: ValueId,
        ty: MirType,
        incomings: Vec<(Operand, BlockId)>,
    },
    /// Aggregate construction.
    MakeStruct {
        dst: ValueId,
        ty: MirType,
        fields: Vec<Operand>,
    },
    MakeTuple {
        dst: ValueId,
        ty: MirType,
        elements: Vec<Operand>,
    },
    /// Construct an enum value with the given tag and payload.
    MakeEnum {
        dst: ValueId,
        ty: MirType,
        tag: u32,
        payload: Vec<Operand>,
    },
    /// Read the tag of an enum value.
    EnumTag { dst: ValueId, value: Operand },
    /// Extract payload slot `index` of an enum value as `ty`.
    EnumPayload {
        dst: ValueId,
        ty: MirType,
        value: Operand,
        index: u32,
    },
    /// Address of a global symbol (function or vtable).
    GlobalAddr {
        dst: ValueId,
        name: String,
        ty: MirType,
    },
}

impl Inst {
    /// The value this instruction defines, if any.
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Inst::Binary { dst, .. }
            | Inst::Alloca { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Gep { dst, .. }
            | Inst::Cast { dst, .. }
            | Inst::Phi { dst, .. }
            | Inst::MakeStruct { dst, .. }
            | Inst::MakeTuple { dst, .. }
            | Inst::MakeEnum { dst, .. }
            | Inst::EnumTag { dst, .. }
            | Inst::EnumPayload { dst, .. }
            | Inst::GlobalAddr { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } | Inst::CallIndirect { dst, .. } => *dst,
            Inst::Store { .. } => None,
        }
    }
}

/// Block terminators.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: Operand,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Ret(Option<Operand>),
    Unreachable,
}

/// A basic block: instructions plus one terminator.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Inst>,
    pub terminator: Terminator,
}

/// A typed MIR function.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MirFunction {
    pub name: String,
    /// Parameters bind value ids `0..params.len()`.
    pub params: Vec<(String, MirType)>,
    pub ret: MirType,
    pub blocks: Vec<BasicBlock>,
    /// Signature-only (extern) functions have no blocks.
    pub is_external: bool,
}

impl MirFunction {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

/// A struct layout.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MirStruct {
    pub name: String,
    pub fields: Vec<(String, MirType)>,
}

/// An enum layout: tag plus per-variant payload types.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MirEnum {
    pub name: String,
    pub variants: Vec<(String, Vec<MirType>)>,
}

impl MirEnum {
    /// Payload slot count of the in-memory layout
    /// `{ i32 tag, [i64 x N] }`: N i64 words cover the largest variant
    /// payload, minimum one word when any payload exists.
    pub fn payload_words(&self) -> u64 {
        let max_bytes = self
            .variants
            .iter()
            .map(|(_, payload)| payload.iter().map(type_size_bytes).sum::<u64>())
            .max()
            .unwrap_or(0);
        max_bytes.div_ceil(8)
    }
}

/// Conservative size in bytes used for enum payload layout.
pub fn type_size_bytes(ty: &MirType) -> u64 {
    match ty {
        MirType::I8 | MirType::U8 | MirType::Bool => 1,
        MirType::I16 | MirType::U16 => 2,
        MirType::I32 | MirType::U32 | MirType::F32 | MirType::Char => 4,
        MirType::I64
        | MirType::U64
        | MirType::F64
        | MirType::Str
        | MirType::Ptr(_)
        | MirType::Named(_)
        | MirType::Func { .. } => 8,
        MirType::I128 | MirType::U128 => 16,
        MirType::Unit | MirType::Never => 0,
        MirType::Array(elem, size) => type_size_bytes(elem) * size,
        MirType::Tuple(elems) => elems.iter().map(type_size_bytes).sum(),
    }
}

/// A MIR module.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MirModule {
    pub name: String,
    pub structs: Vec<MirStruct>,
    pub enums: Vec<MirEnum>,
    pub functions: Vec<MirFunction>,
    pub constants: Vec<(String, Constant)>,
}

impl MirModule {
    pub fn new(name: impl Into<String>) -> Self {
        MirModule {
            name: name.into(),
            ..MirModule::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_payload_words() {
        // Zero payload variants: no words.
        let flag = MirEnum {
            name: "Flag".into(),
            variants: vec![("On".into(), vec![]), ("Off".into(), vec![])],
        };
        assert_eq!(flag.payload_words(), 0);

        // Largest payload decides, rounded up to 8-byte words.
        let value = MirEnum {
            name: "Value".into(),
            variants: vec![
                ("Byte".into(), vec![MirType::U8]),
                ("Pair".into(), vec![MirType::I64, MirType::I32]),
            ],
        };
        assert_eq!(value.payload_words(), 2);
    }

    #[test]
    fn param_ids_precede_instruction_results() {
        let func = MirFunction {
            name: "f".into(),
            params: vec![("a".into(), MirType::I32), ("b".into(), MirType::I32)],
            ret: MirType::I32,
            blocks: vec![BasicBlock {
                id: BlockId(0),
                instructions: vec![Inst::Binary {
                    dst: ValueId(2),
                    op: BinOp::Add,
                    ty: MirType::I32,
                    lhs: Operand::Value(ValueId(0)),
                    rhs: Operand::Value(ValueId(1)),
                }],
                terminator: Terminator::Ret(Some(Operand::Value(ValueId(2)))),
            }],
            is_external: false,
        };
        assert_eq!(func.blocks[0].instructions[0].dst(), Some(ValueId(2)));
    }
}
