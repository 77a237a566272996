//! Statement nodes.

use crate::{ExprId, Name, ParsedTypeId, Span, Spanned};

/// Statement node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        self.span
    }
}

/// Statement variants.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StmtKind {
    /// `let x = init` / `let mut x: T = init`
    Let {
        name: Name,
        is_mut: bool,
        /// `ParsedTypeId::NONE` when the type is inferred.
        ty: ParsedTypeId,
        init: ExprId,
    },
    /// Expression statement.
    Expr(ExprId),
}
