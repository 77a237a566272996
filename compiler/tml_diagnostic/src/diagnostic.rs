//! The diagnostic record.
//!
//! Each diagnostic carries a severity, an [`ErrorCode`], a primary
//! message, a primary labeled span, any number of secondary labels
//! ("other borrow lives here"), and optional notes and suggestions.
//! The core never renders; the driver does.

use std::fmt;

use tml_ir::Span;

use crate::ErrorCode;

/// Severity level for diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A labeled source span.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl Label {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Label {
            span,
            message: message.into(),
        }
    }
}

/// A free-standing note, optionally anchored to a span.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Note {
    pub message: String,
    pub span: Option<Span>,
}

/// A diagnostic: everything the driver needs to render one error.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    /// Primary label; its span is the diagnostic's location.
    pub primary: Option<Label>,
    /// Secondary labels ("previous borrow here", "declared here").
    pub secondary: Vec<Label>,
    pub notes: Vec<Note>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Start an error diagnostic.
    pub fn error(code: ErrorCode) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: String::new(),
            primary: None,
            secondary: Vec::new(),
            notes: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Start a warning diagnostic.
    pub fn warning(code: ErrorCode) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code)
        }
    }

    /// Internal-invariant diagnostic; never swallowed silently.
    pub fn bug(context: impl Into<String>) -> Self {
        Diagnostic::error(ErrorCode::E9001)
            .with_message(format!("internal compiler error: {}", context.into()))
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the primary label. Later calls replace earlier ones.
    #[must_use]
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.primary = Some(Label::new(span, message));
        self
    }

    /// Add a secondary label.
    #[must_use]
    pub fn with_secondary(mut self, span: Span, message: impl Into<String>) -> Self {
        self.secondary.push(Label::new(span, message));
        self
    }

    #[must_use]
    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            span: None,
        });
        self
    }

    #[must_use]
    pub fn with_note_at(mut self, span: Span, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            span: Some(span),
        });
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, message: impl Into<String>) -> Self {
        self.suggestions.push(message.into());
        self
    }

    /// The primary span, if a primary label was attached.
    pub fn span(&self) -> Option<Span> {
        self.primary.as_ref().map(|l| l.span)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates() {
        let d = Diagnostic::error(ErrorCode::E3002)
            .with_message("cannot use `x` while mutably borrowed")
            .with_label(Span::new(30, 35), "use occurs here")
            .with_secondary(Span::new(10, 19), "mutable borrow created here")
            .with_note("borrows are released at their last use");
        assert!(d.is_error());
        assert_eq!(d.span(), Some(Span::new(30, 35)));
        assert_eq!(d.secondary.len(), 1);
        assert_eq!(d.notes.len(), 1);
    }

    #[test]
    fn bug_uses_internal_code() {
        let d = Diagnostic::bug("placeholder leaked to codegen");
        assert_eq!(d.code, ErrorCode::E9001);
        assert!(d.message.contains("internal compiler error"));
    }
}
