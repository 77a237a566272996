//! AST node vocabulary.
//!
//! The parser (an external collaborator) produces this tree; every core
//! phase consumes it. Expression/statement/pattern/type nodes are `Copy`
//! structs with index children living in the [`AstArena`](crate::AstArena);
//! module-level items are owned structs.

mod expr;
mod items;
mod ops;
mod pattern;
mod stmt;
mod types;

pub use expr::{Arm, ClosureParam, Expr, ExprKind, FieldInit, InterpPart};
pub use items::{
    AssocTypeDecl, BehaviorDecl, ConstDecl, ConstParam, Decorator, EnumDecl, FieldDecl, Function,
    ImplDecl, Import, Module, Param, StructDecl, VariantDecl, WhereClause,
};
pub use ops::{BinaryOp, UnaryOp};
pub use pattern::{Pattern, PatternKind};
pub use stmt::{Stmt, StmtKind};
pub use types::{ArrayLen, ParsedType, ParsedTypeKind};
