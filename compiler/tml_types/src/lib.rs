//! Type system for the TML compiler.
//!
//! # Type Interning
//!
//! All types live in a single [`TypePool`]; references are [`TypeId`]
//! (u32 indices) and equality is index equality, because the pool
//! deduplicates structurally on insert. Primitives are pre-interned at
//! fixed indices.
//!
//! # Inference
//!
//! Type variables are link-based: [`TypePool::unify`] binds a variable
//! directly to its target and [`TypePool::resolve`] follows links to a
//! fixed point with path compression. The occurs check keeps the graph
//! acyclic.
//!
//! # Environment
//!
//! [`TypeEnv`] is the central repository for struct/enum/behavior
//! definitions, function overload sets, impls, aliases, builtins,
//! lexical scopes and the module system.

mod builtins;
mod data;
mod defs;
mod env;
mod flags;
mod module;
mod pool;
mod prim;
mod scope;
mod subst;
mod unify;

pub use data::{ArraySize, Capture, TypeData, TypeId, TypeVar};
pub use defs::{
    AssociatedTypeDef, BehaviorDef, ConstGenericParam, EnumDef, FuncSig, ImportedSymbol,
    StabilityLevel, StructDef, Symbol, WhereConstraint,
};
pub use env::{DefineError, ModuleLoader, OverloadResolution, TypeEnv, WellKnown};
pub use flags::TypeFlags;
pub use module::{ModuleDef, ModuleError, ModuleRegistry};
pub use pool::{TypePool, VarState};
pub use prim::PrimKind;
pub use scope::Scopes;
pub use subst::Subst;
pub use unify::{UnifyError, UnifyErrorKind};
