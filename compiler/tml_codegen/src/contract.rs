//! The backend abstraction.
//!
//! A uniform interface so the query pipeline and build orchestration
//! can work with any backend without hard-coding the codegen path:
//!
//! ```text
//!     Backend (trait)
//!     ├── compile_mir()       -> CodegenResult (MIR path)
//!     ├── compile_mir_cgu()   -> CodegenResult (CGU path)
//!     ├── compile_ast()       -> CodegenResult (AST path)
//!     └── generate_ir()       -> String        (--emit-ir)
//!            │
//!   ┌────────┴─────────┐
//!   │                  │
//! LlvmTextBackend   CraneliftBackend (tml_cranelift, via FFI)
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use tml_ir::ast::Module;
use tml_ir::{AstArena, Cancelled};
use tml_mir::MirModule;
use tml_typeck::TypedModule;
use tml_types::TypeEnv;

/// Describes what a backend supports.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BackendCapabilities {
    pub supports_mir: bool,
    pub supports_ast: bool,
    pub supports_generics: bool,
    pub supports_debug_info: bool,
    pub supports_coverage: bool,
    pub supports_cgu: bool,
    pub max_optimization_level: u8,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        BackendCapabilities {
            supports_mir: false,
            supports_ast: false,
            supports_generics: false,
            supports_debug_info: false,
            supports_coverage: false,
            supports_cgu: false,
            max_optimization_level: 3,
        }
    }
}

/// Options for codegen.
#[derive(Clone, Debug)]
pub struct CodegenOptions {
    /// 0..=3.
    pub optimization_level: u8,
    pub debug_info: bool,
    pub coverage_enabled: bool,
    pub emit_comments: bool,
    pub dll_export: bool,
    /// Emit a `@main(argc, argv)` C entry wrapper for executables.
    pub generate_exe_main: bool,
    pub target_triple: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            optimization_level: 0,
            debug_info: false,
            coverage_enabled: false,
            emit_comments: true,
            dll_export: false,
            generate_exe_main: false,
            target_triple: String::new(),
        }
    }
}

/// Result of a codegen operation.
///
/// On success a backend returns either an object file path (which the
/// build driver must consume and remove) or an in-memory IR text blob.
/// `link_libs` lists libraries from `@link` decorators for the linker.
#[derive(Clone, Debug, Default)]
pub struct CodegenResult {
    pub success: bool,
    pub ir_text: String,
    pub object_file: Option<PathBuf>,
    pub link_libs: BTreeSet<String>,
    pub error_message: String,
}

impl CodegenResult {
    pub fn success_ir(ir_text: String) -> Self {
        CodegenResult {
            success: true,
            ir_text,
            ..CodegenResult::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CodegenResult {
            success: false,
            error_message: message.into(),
            ..CodegenResult::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.success
    }
}

/// Backend failure. A backend missing a capability rejects with
/// `Unsupported`, never panics.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("backend `{backend}` does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
    #[error("IR emission failed: {0}")]
    Emission(String),
    #[error("FFI invocation failed: {0}")]
    Ffi(String),
    #[error("object file write failed: {0}")]
    ObjectWrite(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Abstract interface for code generation backends.
pub trait Backend: Send + Sync {
    /// Backend name (e.g. "llvm-text", "cranelift").
    fn name(&self) -> &'static str;

    /// What this backend supports.
    fn capabilities(&self) -> BackendCapabilities;

    /// Compile a MIR module (simple code path).
    fn compile_mir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError>;

    /// Compile a subset of MIR functions (CGU partitioned path).
    fn compile_mir_cgu(
        &self,
        module: &MirModule,
        func_indices: &[usize],
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError>;

    /// Compile from the typed AST (full features: generics, imports,
    /// closures, behavior objects).
    fn compile_ast(
        &self,
        module: &Module,
        arena: &AstArena,
        typed: &TypedModule,
        env: &mut TypeEnv,
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError>;

    /// Generate IR text only (for `--emit-ir`, no object compilation).
    fn generate_ir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<String, BackendError>;
}

/// Available backend kinds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BackendKind {
    LlvmText,
    Cranelift,
}

/// Create a backend instance by kind.
///
/// The Cranelift backend lives in the `tml_cranelift` crate (it needs
/// the native bridge library); requesting it here is rejected rather
/// than silently substituted.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn Backend>, BackendError> {
    match kind {
        BackendKind::LlvmText => Ok(Box::new(crate::llvm_text::LlvmTextBackend::new())),
        BackendKind::Cranelift => Err(BackendError::Unsupported {
            backend: "cranelift",
            operation: "in-process construction (link the tml_cranelift crate)",
        }),
    }
}

/// The default backend for this platform.
pub fn default_backend_kind() -> BackendKind {
    BackendKind::LlvmText
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_the_reference_backend() {
        let backend = create_backend(BackendKind::LlvmText).expect("available");
        assert_eq!(backend.name(), "llvm-text");
        assert!(backend.capabilities().supports_mir);
    }

    #[test]
    fn cranelift_requires_its_own_crate() {
        assert!(matches!(
            create_backend(BackendKind::Cranelift),
            Err(BackendError::Unsupported { .. })
        ));
    }

    #[test]
    fn result_constructors() {
        let ok = CodegenResult::success_ir("define void @f()".into());
        assert!(ok.success);
        assert!(!ok.has_errors());
        let err = CodegenResult::error("boom");
        assert!(err.has_errors());
        assert_eq!(err.error_message, "boom");
    }
}
