//! Cranelift backend: a safe wrapper over the native bridge library.
//!
//! The bridge consumes serialized MIR bytes (the same versioned binary
//! format the incremental cache uses) and returns object file bytes or
//! IR text through a C ABI. [`BridgeResult`] owns each native result
//! and performs the mandatory free call in its `Drop`.
//!
//! This crate is excluded from the workspace because it needs
//! `libtml_cranelift_bridge` at link time; `cargo build -p
//! tml_cranelift` with the library on the search path builds it.

mod bridge;

use std::ffi::CStr;
use std::path::PathBuf;

use tml_codegen::{
    Backend, BackendCapabilities, BackendError, CodegenOptions, CodegenResult,
};
use tml_mir::{serialize_binary, MirModule};

/// An owned bridge result; the native allocations are released on drop.
struct BridgeResult {
    raw: bridge::RawResult,
}

impl BridgeResult {
    fn success(&self) -> bool {
        self.raw.success != 0
    }

    fn object_bytes(&self) -> Option<&[u8]> {
        if self.raw.data.is_null() || self.raw.data_len == 0 {
            return None;
        }
        // SAFETY: the bridge guarantees `data` points at `data_len`
        // bytes that stay valid until the result is freed, and this
        // borrow cannot outlive `self`.
        Some(unsafe { std::slice::from_raw_parts(self.raw.data, self.raw.data_len) })
    }

    fn ir_text(&self) -> Option<String> {
        if self.raw.ir_text.is_null() {
            return None;
        }
        // SAFETY: non-null `ir_text` is a NUL-terminated C string owned
        // by the bridge for the result's lifetime.
        let text = unsafe { CStr::from_ptr(self.raw.ir_text) };
        Some(text.to_string_lossy().into_owned())
    }

    fn error_message(&self) -> String {
        if self.raw.error_msg.is_null() {
            return "unknown cranelift bridge failure".to_string();
        }
        // SAFETY: non-null `error_msg` is a NUL-terminated C string
        // owned by the bridge for the result's lifetime.
        let text = unsafe { CStr::from_ptr(self.raw.error_msg) };
        text.to_string_lossy().into_owned()
    }
}

impl Drop for BridgeResult {
    fn drop(&mut self) {
        // SAFETY: every RawResult returned by the bridge must be freed
        // exactly once; BridgeResult is the sole owner.
        unsafe { bridge::cranelift_free_result(&mut self.raw) };
    }
}

/// Marshalled options; owns the C string backing `target_triple`.
struct BridgeOptions {
    triple: Option<std::ffi::CString>,
    raw: bridge::RawOptions,
}

impl BridgeOptions {
    fn new(opts: &CodegenOptions) -> Self {
        let triple = if opts.target_triple.is_empty() {
            None
        } else {
            std::ffi::CString::new(opts.target_triple.clone()).ok()
        };
        let raw = bridge::RawOptions {
            optimization_level: i32::from(opts.optimization_level.min(3)),
            target_triple: triple
                .as_ref()
                .map_or(std::ptr::null(), |t| t.as_ptr()),
            debug_info: i32::from(opts.debug_info),
            dll_export: i32::from(opts.dll_export),
        };
        BridgeOptions { triple, raw }
    }
}

/// The version string reported by the linked bridge library.
pub fn bridge_version() -> String {
    // SAFETY: the bridge returns a statically allocated NUL-terminated
    // string; it must not be freed.
    let version = unsafe { CStr::from_ptr(bridge::cranelift_version()) };
    version.to_string_lossy().into_owned()
}

/// The Cranelift backend.
#[derive(Default)]
pub struct CraneliftBackend {
    _private: (),
}

impl CraneliftBackend {
    pub fn new() -> Self {
        CraneliftBackend::default()
    }

    fn finish(&self, result: BridgeResult) -> Result<CodegenResult, BackendError> {
        if !result.success() {
            return Err(BackendError::Ffi(result.error_message()));
        }
        let mut out = CodegenResult::default();
        out.success = true;
        if let Some(text) = result.ir_text() {
            out.ir_text = text;
        }
        if let Some(bytes) = result.object_bytes() {
            let path = tml_codegen::temp_output_path("tml_cranelift");
            let path = PathBuf::from(path);
            std::fs::write(&path, bytes)
                .map_err(|err| BackendError::ObjectWrite(err.to_string()))?;
            out.object_file = Some(path);
        }
        Ok(out)
    }
}

impl Backend for CraneliftBackend {
    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_mir: true,
            supports_ast: false,
            supports_generics: false,
            supports_debug_info: true,
            supports_coverage: false,
            supports_cgu: true,
            max_optimization_level: 3,
        }
    }

    fn compile_mir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        tracing::debug!(module = %module.name, "cranelift compile_mir");
        let bytes = serialize_binary(module);
        let options = BridgeOptions::new(opts);
        // SAFETY: `bytes` outlives the call; `options.raw` stays alive
        // through `options` (the CString it points into included).
        let raw = unsafe {
            bridge::cranelift_compile_mir(bytes.as_ptr(), bytes.len(), &options.raw)
        };
        drop(options.triple);
        self.finish(BridgeResult { raw })
    }

    fn compile_mir_cgu(
        &self,
        module: &MirModule,
        func_indices: &[usize],
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        let bytes = serialize_binary(module);
        let options = BridgeOptions::new(opts);
        // SAFETY: all pointers are to live slices/structs for the
        // duration of the call.
        let raw = unsafe {
            bridge::cranelift_compile_mir_cgu(
                bytes.as_ptr(),
                bytes.len(),
                func_indices.as_ptr(),
                func_indices.len(),
                &options.raw,
            )
        };
        drop(options.triple);
        self.finish(BridgeResult { raw })
    }

    fn compile_ast(
        &self,
        _module: &tml_ir::ast::Module,
        _arena: &tml_ir::AstArena,
        _typed: &tml_typeck::TypedModule,
        _env: &mut tml_types::TypeEnv,
        _opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        // Generics, closures and imports need the AST walker the text
        // backend carries; the bridge only consumes MIR.
        Err(BackendError::Unsupported {
            backend: "cranelift",
            operation: "AST codegen",
        })
    }

    fn generate_ir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<String, BackendError> {
        let bytes = serialize_binary(module);
        let options = BridgeOptions::new(opts);
        // SAFETY: as in compile_mir.
        let raw = unsafe {
            bridge::cranelift_generate_ir(bytes.as_ptr(), bytes.len(), &options.raw)
        };
        drop(options.triple);
        let result = BridgeResult { raw };
        if !result.success() {
            return Err(BackendError::Ffi(result.error_message()));
        }
        result
            .ir_text()
            .ok_or_else(|| BackendError::Ffi("bridge returned no IR text".to_string()))
    }
}
