//! Raw FFI surface of the native bridge library.
//!
//! Mirrors the C header shipped with the bridge, function for
//! function. Every returned [`RawResult`] owns native allocations and
//! must be released with `cranelift_free_result` exactly once; the safe
//! wrapper in `lib.rs` guarantees that with a `Drop` impl.

use std::os::raw::{c_char, c_int};

/// Result of a bridge compilation operation.
///
/// `data`/`ir_text`/`error_msg` are owned by the bridge until
/// `cranelift_free_result` is called.
#[repr(C)]
pub struct RawResult {
    /// 0 = failure, 1 = success.
    pub success: c_int,
    /// Object file bytes (null when absent).
    pub data: *const u8,
    pub data_len: usize,
    /// Cranelift IR text (for `generate_ir`, null otherwise).
    pub ir_text: *const c_char,
    pub ir_text_len: usize,
    /// Error message (null on success).
    pub error_msg: *const c_char,
}

/// Options for bridge compilation.
#[repr(C)]
pub struct RawOptions {
    /// 0 = none, 1-3 = speed_and_size.
    pub optimization_level: c_int,
    /// e.g. "x86_64-unknown-linux-gnu"; null for host.
    pub target_triple: *const c_char,
    /// 0 or 1.
    pub debug_info: c_int,
    /// 0 or 1 (export public functions as dllexport).
    pub dll_export: c_int,
}

#[link(name = "tml_cranelift_bridge")]
extern "C" {
    /// Compile a full serialized MIR module to an object file.
    pub fn cranelift_compile_mir(
        mir_data: *const u8,
        mir_len: usize,
        options: *const RawOptions,
    ) -> RawResult;

    /// Compile a subset of functions from a MIR module (CGU mode).
    pub fn cranelift_compile_mir_cgu(
        mir_data: *const u8,
        mir_len: usize,
        func_indices: *const usize,
        num_indices: usize,
        options: *const RawOptions,
    ) -> RawResult;

    /// Generate Cranelift IR text from a MIR module (no compilation).
    pub fn cranelift_generate_ir(
        mir_data: *const u8,
        mir_len: usize,
        options: *const RawOptions,
    ) -> RawResult;

    /// Free a result. Must be called for every result returned.
    pub fn cranelift_free_result(result: *mut RawResult);

    /// Bridge version string (statically allocated, do not free).
    pub fn cranelift_version() -> *const c_char;
}
