//! AST, spans and interning for the TML compiler.
//!
//! This crate is the leaf of the pipeline: it defines the parsed-AST
//! vocabulary the core consumes, source spans, the string interner, the
//! flat arena the tree lives in, and the cancellation token polled at
//! phase checkpoints.
//!
//! # Design
//!
//! - No `Box<Expr>`: children are `ExprId(u32)` indices into [`AstArena`]
//! - Contiguous arrays for cache locality
//! - Strings are interned once into [`Name`] handles

pub mod ast;

mod arena;
mod cancel;
mod ids;
mod interner;
mod name;
mod span;

pub use arena::AstArena;
pub use cancel::{CancelToken, Cancelled};
pub use ids::{
    ArmRange, ExprId, ExprRange, FieldInitRange, InterpPartRange, NameRange, ParamRange,
    ParsedTypeId, ParsedTypeRange, PatternId, PatternRange, StmtId, StmtRange,
};
pub use interner::{SharedInterner, StringInterner};
pub use name::Name;
pub use span::{LineCol, Span, Spanned};

/// Compile-time upper-bound assertion, used to keep hot node types compact.
#[macro_export]
macro_rules! static_assert_size_le {
    ($ty:ty, $size:expr) => {
        const _: () = assert!(::std::mem::size_of::<$ty>() <= $size);
    };
}

// Expr nodes are copied throughout checking; keep them small.
#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::ast::Expr;
    crate::static_assert_size_le!(Expr, 48);
}
