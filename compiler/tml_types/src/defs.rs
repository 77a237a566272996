//! Definition records registered in the type environment.
//!
//! These are the semantic counterparts of the declaration AST nodes:
//! struct/enum/behavior definitions, function signatures with stability
//! and FFI metadata, and imported symbols.

use tml_ir::{Name, Span};

use crate::TypeId;

/// Information about a bound symbol (variable or parameter).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Symbol {
    pub name: Name,
    pub ty: TypeId,
    pub is_mutable: bool,
    pub span: Span,
}

/// A where clause constraint: type parameter -> required behaviors.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct WhereConstraint {
    pub type_param: Name,
    pub required_behaviors: Vec<Name>,
}

/// A const generic parameter definition.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConstGenericParam {
    /// Parameter name (e.g. `N`).
    pub name: Name,
    /// Type of the const (e.g. `U64`).
    pub value_type: TypeId,
}

/// API stability level.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum StabilityLevel {
    Stable,
    #[default]
    Unstable,
    Deprecated,
}

/// Function signature with stability tracking and FFI support.
///
/// Functions can be marked external with `@extern` and `@link`
/// decorators:
///
/// ```tml
/// @extern("c")
/// @link("math")
/// func sin(x: F64) -> F64
/// ```
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FuncSig {
    pub name: Name,
    /// Parameter types in order.
    pub params: Vec<TypeId>,
    /// Return type (Unit if not specified).
    pub ret: TypeId,
    /// Generic type parameter names.
    pub type_params: Vec<Name>,
    /// Const generic parameters.
    pub const_params: Vec<ConstGenericParam>,
    /// Generic constraints.
    pub where_constraints: Vec<WhereConstraint>,
    pub is_async: bool,
    /// True for C runtime functions.
    pub is_lowlevel: bool,
    pub span: Span,

    // Stability tracking
    pub stability: StabilityLevel,
    /// Migration guide for deprecated functions.
    pub deprecated_message: Option<Name>,
    /// Version when the stability status was assigned.
    pub since_version: Option<Name>,

    // FFI support (@extern and @link decorators)
    /// ABI: "c", "c++", "stdcall", ...
    pub extern_abi: Option<Name>,
    /// External symbol name if different.
    pub extern_name: Option<Name>,
    /// Libraries to link.
    pub link_libs: Vec<Name>,
    /// FFI namespace from `@link`.
    pub ffi_module: Option<Name>,
}

impl FuncSig {
    /// A plain signature with everything else defaulted.
    pub fn new(name: Name, params: Vec<TypeId>, ret: TypeId) -> Self {
        FuncSig {
            name,
            params,
            ret,
            type_params: Vec::new(),
            const_params: Vec::new(),
            where_constraints: Vec::new(),
            is_async: false,
            is_lowlevel: false,
            span: Span::DUMMY,
            stability: StabilityLevel::Unstable,
            deprecated_message: None,
            since_version: None,
            extern_abi: None,
            extern_name: None,
            link_libs: Vec::new(),
            ffi_module: None,
        }
    }

    /// True if this is an external (FFI) function.
    pub fn is_extern(&self) -> bool {
        self.extern_abi.is_some()
    }

    pub fn has_ffi_module(&self) -> bool {
        self.ffi_module.is_some()
    }

    pub fn is_stable(&self) -> bool {
        self.stability == StabilityLevel::Stable
    }

    pub fn is_deprecated(&self) -> bool {
        self.stability == StabilityLevel::Deprecated
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// Struct type definition.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StructDef {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstGenericParam>,
    /// Field name-type pairs, in declaration order.
    pub fields: Vec<(Name, TypeId)>,
    pub span: Span,
}

impl StructDef {
    pub fn field(&self, name: Name) -> Option<TypeId> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    pub fn field_index(&self, name: Name) -> Option<usize> {
        self.fields.iter().position(|(n, _)| *n == name)
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// Enum (algebraic data type) definition.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EnumDef {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstGenericParam>,
    /// Variant name and payload types, in declaration order.
    pub variants: Vec<(Name, Vec<TypeId>)>,
    pub span: Span,
}

impl EnumDef {
    pub fn variant(&self, name: Name) -> Option<&(Name, Vec<TypeId>)> {
        self.variants.iter().find(|(n, _)| *n == name)
    }

    pub fn variant_index(&self, name: Name) -> Option<usize> {
        self.variants.iter().position(|(n, _)| *n == name)
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// Associated type declaration in a behavior.
///
/// Supports GATs: `type Mapped[U]`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AssociatedTypeDef {
    pub name: Name,
    /// GAT type parameters.
    pub type_params: Vec<Name>,
    /// Behavior bounds (e.g. `Item: Clone`).
    pub bounds: Vec<Name>,
    pub default_type: Option<TypeId>,
}

/// Behavior (trait) definition.
///
/// Behaviors define shared interfaces: associated types, required
/// methods, default method implementations, and super-behaviors.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BehaviorDef {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub const_params: Vec<ConstGenericParam>,
    pub associated_types: Vec<AssociatedTypeDef>,
    /// Required and default method signatures, in declaration order.
    /// The order is the vtable slot order.
    pub methods: Vec<FuncSig>,
    pub super_behaviors: Vec<Name>,
    /// Methods that have default implementations.
    pub methods_with_defaults: Vec<Name>,
    pub span: Span,
}

impl BehaviorDef {
    pub fn method(&self, name: Name) -> Option<&FuncSig> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Vtable slot of a method, by declaration order.
    pub fn method_slot(&self, name: Name) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Object safety: every method must be free of its own
    /// generic type parameters, otherwise the vtable cannot hold it.
    pub fn object_safety_violation(&self) -> Option<&FuncSig> {
        self.methods.iter().find(|m| !m.type_params.is_empty())
    }
}

/// An imported symbol: `use module::symbol as alias`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ImportedSymbol {
    pub module_path: Name,
    pub symbol_name: Name,
    pub alias: Option<Name>,
}

impl ImportedSymbol {
    /// The name this symbol is visible under locally.
    pub fn local_name(&self) -> Name {
        self.alias.unwrap_or(self.symbol_name)
    }
}
