//! Typed mid-level IR for the TML compiler.
//!
//! MIR sits between the typed AST and machine-specific IR: a module of
//! typed functions made of basic blocks over SSA-like value ids, plus
//! the struct/enum layouts and constants codegen needs.
//!
//! - [`lower_module`] builds MIR from a checked module (the monomorphic
//!   subset; closures and pattern matching take the AST codegen path)
//! - [`serialize::serialize_binary`] / [`serialize::deserialize_binary`]
//!   implement the versioned tagged binary format used by the
//!   incremental-compilation cache (`.mirb`)
//! - [`printer::print_module`] and [`serialize::deserialize_text`] are
//!   the text round trip (`.mir`)

mod lower;
mod model;
pub mod printer;
pub mod serialize;

#[cfg(test)]
mod lower_tests;

pub use lower::{lower_function, lower_module, mir_type_of, LowerError};
pub use model::{
    type_size_bytes, BasicBlock, BinOp, BlockId, CastKind, Constant, Inst, MirEnum, MirFunction,
    MirModule, MirStruct, MirType, Operand, Terminator, ValueId,
};
pub use serialize::{
    deserialize_binary, deserialize_text, read_mir_file, serialize_binary, serialize_text,
    write_mir_file, DeserializeError, MirFileError, TextParseError, MAGIC, VERSION_MAJOR,
    VERSION_MINOR,
};
