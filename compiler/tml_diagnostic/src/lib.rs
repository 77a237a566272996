//! Diagnostic system for the TML compiler.
//!
//! Design:
//! - Error codes for searchability
//! - Clear messages (what went wrong)
//! - Primary span (where it went wrong)
//! - Secondary labels (why it's wrong / "the other borrow lives here")
//! - Suggestions (how to fix)
//!
//! # Error Guarantees
//!
//! [`ErrorGuaranteed`] is type-level proof that at least one error was
//! emitted; it can only be obtained from [`DiagnosticQueue::emit_error`],
//! so failing phases cannot forget to report.

pub mod emitter;

mod diagnostic;
mod error_code;
mod guarantee;
mod queue;

pub use diagnostic::{Diagnostic, Label, Note, Severity};
pub use error_code::{ErrorCode, ErrorTier};
pub use guarantee::ErrorGuaranteed;
pub use queue::{worst_tier, DiagnosticConfig, DiagnosticQueue};
