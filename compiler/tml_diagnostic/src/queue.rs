//! Diagnostic accumulation.
//!
//! Type checking and borrow checking accumulate every diagnostic for a
//! module before returning; the queue applies an error limit,
//! deduplicates same-span repeats, and can pick the primary cause by
//! tier priority for display.

use rustc_hash::FxHashSet;
use tml_ir::Span;

use crate::{Diagnostic, ErrorGuaranteed, ErrorTier, Severity};

/// Number of characters used for message-prefix deduplication.
const MESSAGE_PREFIX_LEN: usize = 30;

#[inline]
fn message_prefix(msg: &str) -> String {
    msg.chars().take(MESSAGE_PREFIX_LEN).collect()
}

/// Configuration for diagnostic processing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiagnosticConfig {
    /// Maximum number of errors before further errors are dropped
    /// (0 = unlimited). Warnings are never limited.
    pub error_limit: usize,
    /// Deduplicate diagnostics with the same span and similar message.
    pub deduplicate: bool,
    /// Drop follow-on errors (unresolved-inference noise at spans that
    /// already carry a real error).
    pub filter_follow_on: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        DiagnosticConfig {
            error_limit: 50,
            deduplicate: true,
            filter_follow_on: true,
        }
    }
}

/// Codes that only ever appear downstream of another error.
fn is_follow_on(code: crate::ErrorCode) -> bool {
    matches!(code, crate::ErrorCode::E2004)
}

/// Accumulator for a module's diagnostics.
#[derive(Default)]
pub struct DiagnosticQueue {
    config: DiagnosticConfig,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    dropped: usize,
    seen: FxHashSet<(Option<Span>, String)>,
    /// Spans that already carry an error (follow-on filtering).
    error_spans: Vec<Span>,
}

impl DiagnosticQueue {
    pub fn new() -> Self {
        DiagnosticQueue::default()
    }

    pub fn with_config(config: DiagnosticConfig) -> Self {
        DiagnosticQueue {
            config,
            ..DiagnosticQueue::default()
        }
    }

    /// Record a diagnostic of any severity.
    pub fn push(&mut self, diag: Diagnostic) {
        if self.config.deduplicate {
            let key = (diag.span(), message_prefix(&diag.message));
            if !self.seen.insert(key) {
                self.dropped += 1;
                return;
            }
        }
        if self.config.filter_follow_on && is_follow_on(diag.code) {
            if let Some(span) = diag.span() {
                if self.error_spans.iter().any(|prior| prior.contains(span)) {
                    self.dropped += 1;
                    return;
                }
            }
        }
        if diag.is_error() {
            if self.config.error_limit != 0 && self.error_count >= self.config.error_limit {
                self.dropped += 1;
                return;
            }
            self.error_count += 1;
            if let Some(span) = diag.span() {
                self.error_spans.push(span);
            }
        }
        self.diagnostics.push(diag);
    }

    /// Record an error, obtaining the proof token.
    pub fn emit_error(&mut self, diag: Diagnostic) -> ErrorGuaranteed {
        debug_assert_eq!(diag.severity, Severity::Error);
        self.push(diag);
        // Even if the limit dropped the record, an error happened.
        ErrorGuaranteed(())
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Diagnostics dropped by dedup or the error limit.
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain all diagnostics, sorted by span position (stable for
    /// deterministic output).
    pub fn take(&mut self) -> Vec<Diagnostic> {
        let mut out = std::mem::take(&mut self.diagnostics);
        self.seen.clear();
        out.sort_by_key(|d| d.span().map_or((u32::MAX, u32::MAX), |s| (s.start, s.end)));
        out
    }

    /// The displayed primary cause: the first error of the
    /// highest-priority tier (bug, then name, type, borrow, mono,
    /// backend). Warnings never become the primary cause.
    pub fn primary_cause(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_error())
            .min_by_key(|d| {
                let pos = d.span().map_or(u32::MAX, |s| s.start);
                (d.code.tier(), pos)
            })
    }

    /// Merge another queue's diagnostics into this one (e.g. borrow
    /// results appended after type results).
    pub fn absorb(&mut self, other: DiagnosticQueue) {
        for diag in other.diagnostics {
            self.push(diag);
        }
        self.dropped += other.dropped;
    }
}

/// Tier of the worst error in a batch, if any.
pub fn worst_tier(diags: &[Diagnostic]) -> Option<ErrorTier> {
    diags
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.code.tier())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    fn err(code: ErrorCode, start: u32, msg: &str) -> Diagnostic {
        Diagnostic::error(code)
            .with_message(msg)
            .with_label(Span::new(start, start + 1), "here")
    }

    #[test]
    fn dedup_same_span_same_prefix() {
        let mut q = DiagnosticQueue::new();
        q.push(err(ErrorCode::E2001, 5, "type mismatch: expected I32"));
        q.push(err(ErrorCode::E2001, 5, "type mismatch: expected I32"));
        assert_eq!(q.error_count(), 1);
        assert_eq!(q.dropped_count(), 1);
    }

    #[test]
    fn error_limit_drops_but_still_guarantees() {
        let mut q = DiagnosticQueue::with_config(DiagnosticConfig {
            error_limit: 1,
            deduplicate: false,
            filter_follow_on: false,
        });
        q.push(err(ErrorCode::E2001, 0, "first"));
        let _proof: ErrorGuaranteed = q.emit_error(err(ErrorCode::E2001, 9, "second"));
        assert_eq!(q.error_count(), 1);
        assert!(q.has_errors());
    }

    #[test]
    fn primary_cause_prefers_name_tier_over_borrow() {
        let mut q = DiagnosticQueue::new();
        q.push(err(ErrorCode::E3001, 0, "moved"));
        q.push(err(ErrorCode::E1001, 90, "unknown identifier"));
        let primary = q.primary_cause().map(|d| d.code);
        assert_eq!(primary, Some(ErrorCode::E1001));
    }

    #[test]
    fn follow_on_inference_errors_are_filtered() {
        let mut q = DiagnosticQueue::new();
        q.push(err(ErrorCode::E1001, 5, "unknown identifier"));
        // An unresolved-inference error at the same location is noise.
        q.push(
            Diagnostic::error(ErrorCode::E2004)
                .with_message("cannot infer type")
                .with_label(Span::new(5, 6), "here"),
        );
        assert_eq!(q.error_count(), 1);
        assert_eq!(q.dropped_count(), 1);
    }

    #[test]
    fn take_sorts_by_span() {
        let mut q = DiagnosticQueue::new();
        q.push(err(ErrorCode::E2001, 50, "later"));
        q.push(err(ErrorCode::E2001, 5, "earlier"));
        let out = q.take();
        assert_eq!(out[0].message, "earlier");
        assert_eq!(out[1].message, "later");
    }
}
