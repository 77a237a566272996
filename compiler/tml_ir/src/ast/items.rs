//! Module-level declarations.
//!
//! Unlike expressions, items are few per module, so they are owned
//! structs with `Vec` fields rather than arena ranges.

use crate::{ExprId, Name, ParsedTypeId, Span};

/// A decorator attached to a declaration: `@extern("c")`, `@link("math")`,
/// `@stable(since: "1.0")`, `@deprecated("use foo")`.
///
/// Arguments are interned strings; the checker interprets the ones it
/// knows and ignores the rest.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Decorator {
    pub name: Name,
    pub args: Vec<Name>,
    pub span: Span,
}

/// A function parameter.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Param {
    pub name: Name,
    pub is_mut: bool,
    pub ty: ParsedTypeId,
    pub span: Span,
}

/// A `where T: Behavior + Other` clause.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct WhereClause {
    pub type_param: Name,
    pub behaviors: Vec<Name>,
    pub span: Span,
}

/// A const generic parameter: `const N: U64`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConstParam {
    pub name: Name,
    pub value_type: ParsedTypeId,
    pub span: Span,
}

/// Function declaration (also used for behavior/impl methods).
///
/// Behavior methods without a default body have `body == ExprId::NONE`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Function {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstParam>,
    pub params: Vec<Param>,
    /// `ParsedTypeId::NONE` means Unit.
    pub ret: ParsedTypeId,
    pub where_clauses: Vec<WhereClause>,
    pub decorators: Vec<Decorator>,
    pub is_async: bool,
    pub body: ExprId,
    pub span: Span,
}

impl Function {
    /// True for required behavior methods (signature only).
    pub fn is_signature_only(&self) -> bool {
        !self.body.is_valid()
    }
}

/// A struct field declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FieldDecl {
    pub name: Name,
    pub ty: ParsedTypeId,
    pub span: Span,
}

/// Struct declaration.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct StructDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstParam>,
    pub fields: Vec<FieldDecl>,
    pub decorators: Vec<Decorator>,
    pub span: Span,
}

/// An enum variant declaration with optional payload types.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct VariantDecl {
    pub name: Name,
    pub payload: Vec<ParsedTypeId>,
    pub span: Span,
}

/// Enum declaration.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct EnumDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstParam>,
    pub variants: Vec<VariantDecl>,
    pub decorators: Vec<Decorator>,
    pub span: Span,
}

/// An associated type declaration inside a behavior.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct AssocTypeDecl {
    pub name: Name,
    /// GAT parameters: `type Mapped[U]`.
    pub type_params: Vec<Name>,
    /// Behavior bounds: `type Item: Clone`.
    pub bounds: Vec<Name>,
    /// Optional default.
    pub default: ParsedTypeId,
    pub span: Span,
}

/// Behavior (trait) declaration.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct BehaviorDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstParam>,
    pub assoc_types: Vec<AssocTypeDecl>,
    /// Required and default methods; defaults carry a body.
    pub methods: Vec<Function>,
    pub super_behaviors: Vec<Name>,
    pub decorators: Vec<Decorator>,
    pub span: Span,
}

/// `impl Type` or `impl Behavior for Type` block.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ImplDecl {
    /// The implementing type name.
    pub type_name: Name,
    /// Type arguments on the implementing type (`impl List[T]`).
    pub type_params: Vec<Name>,
    /// The behavior being implemented, if any.
    pub behavior: Option<Name>,
    /// Associated type bindings: `type Item = I32`.
    pub assoc_bindings: Vec<(Name, ParsedTypeId)>,
    pub methods: Vec<Function>,
    pub span: Span,
}

/// Import statement: `use module::symbol as alias` / `use module::*`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Import {
    /// Module path as written, `::`-joined and interned.
    pub module_path: Name,
    /// `None` for glob imports.
    pub symbol: Option<Name>,
    pub alias: Option<Name>,
    pub glob: bool,
    pub span: Span,
}

/// Module-level constant.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConstDecl {
    pub name: Name,
    pub ty: ParsedTypeId,
    pub value: ExprId,
    pub span: Span,
}

/// A parsed module: the unit the pipeline compiles.
#[derive(Clone, Default, Debug)]
pub struct Module {
    pub name: Name,
    pub imports: Vec<Import>,
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub behaviors: Vec<BehaviorDecl>,
    pub impls: Vec<ImplDecl>,
    pub functions: Vec<Function>,
    pub constants: Vec<ConstDecl>,
}

impl Module {
    pub fn new(name: Name) -> Self {
        Module {
            name,
            ..Module::default()
        }
    }

    /// Find a top-level function by name (first overload).
    pub fn function(&self, name: Name) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
