//! Pattern nodes for `when` arms, `if let` and `for` bindings.

use crate::{ExprId, Name, PatternRange, Span, Spanned};

/// Pattern node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Pattern { kind, span }
    }
}

impl Spanned for Pattern {
    fn span(&self) -> Span {
        self.span
    }
}

/// Pattern variants.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// `x` / `mut x` - binds the matched value
    Binding { name: Name, is_mut: bool },
    /// Literal pattern: `42`, `"a"`, `true`
    Literal(ExprId),
    /// Tuple destructure: `(a, b)`
    Tuple(PatternRange),
    /// Enum variant: `Maybe::Just(x)`; `enum_name` may be `Name::EMPTY`
    /// when the variant is unqualified and resolved by the checker.
    Variant {
        enum_name: Name,
        variant: Name,
        fields: PatternRange,
    },
}

impl PatternKind {
    /// True if the pattern binds no names (cannot move the scrutinee).
    pub fn is_refutable_leaf(&self) -> bool {
        matches!(self, PatternKind::Wildcard | PatternKind::Literal(_))
    }
}
