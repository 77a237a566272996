//! Codegen backend contract and the reference LLVM-text backend.
//!
//! [`Backend`] is the uniform interface concrete backends implement;
//! [`LlvmTextBackend`] is the reference implementation that walks
//! MIR (or the typed AST, for generics, closures and behavior objects)
//! and emits LLVM-syntax text IR. The Cranelift backend lives in the
//! `tml_cranelift` crate and feeds serialized MIR through its native
//! bridge.

mod contract;
mod llvm_text;
mod parallel;

#[cfg(test)]
mod tests;

pub use contract::{
    create_backend, default_backend_kind, Backend, BackendCapabilities, BackendError, BackendKind,
    CodegenOptions, CodegenResult,
};
pub use llvm_text::LlvmTextBackend;
pub use parallel::{compile_cgus_parallel, partition_functions, temp_output_path};
