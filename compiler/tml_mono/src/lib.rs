//! Monomorphization engine for the TML compiler.
//!
//! Turns generic code into specialized instances keyed by concrete type
//! arguments. Driven lazily from codegen: when a specialized instance
//! is referenced, a request is enqueued; the engine drains its queues
//! until fixpoint, so emitted instances always have their dependencies
//! in the type-definition prefix of the output.
//!
//! Mangled names are the cache keys: every distinct instantiation is
//! generated exactly once, and the mangling is unambiguous for all
//! surface types.

mod engine;
mod mangle;

pub use engine::{
    EnumInstance, FuncInstance, ImplMethodRequest, MonoLimits, Monomorphizer, StructInstance,
};
pub use mangle::{mangle_func_name, mangle_struct_name, mangle_type};
