//! Rendering diagnostics with `ariadne`.
//!
//! The core leaves rendering to the driver; this module is the shared
//! implementation the driver (and tests) call into.

use ariadne::{Config, Label as AriadneLabel, Report, ReportKind, Source};

use crate::{Diagnostic, Severity};

fn report_kind(severity: Severity) -> ReportKind<'static> {
    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Note | Severity::Help => ReportKind::Advice,
    }
}

/// Render one diagnostic against its source text.
///
/// Output is plain (uncolored) so it is stable in tests and logs.
pub fn render(diag: &Diagnostic, file_id: &str, source: &str) -> String {
    let offset = diag.span().map_or(0, |s| s.start as usize);

    let mut builder = Report::build(report_kind(diag.severity), file_id, offset)
        .with_config(Config::default().with_color(false))
        .with_code(diag.code.as_str())
        .with_message(&diag.message);

    if let Some(primary) = &diag.primary {
        builder = builder.with_label(
            AriadneLabel::new((file_id, primary.span.start as usize..primary.span.end as usize))
                .with_message(&primary.message)
                .with_priority(1),
        );
    }
    for label in &diag.secondary {
        builder = builder.with_label(
            AriadneLabel::new((file_id, label.span.start as usize..label.span.end as usize))
                .with_message(&label.message),
        );
    }
    for note in &diag.notes {
        builder = builder.with_note(&note.message);
    }
    for suggestion in &diag.suggestions {
        builder = builder.with_help(suggestion);
    }

    let mut buf = Vec::new();
    // Rendering failure must not mask the diagnostic itself.
    if builder
        .finish()
        .write((file_id, Source::from(source)), &mut buf)
        .is_err()
    {
        return format!("{}[{}]: {}", diag.severity, diag.code, diag.message);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render a batch in order, separated by blank lines.
pub fn render_all(diags: &[Diagnostic], file_id: &str, source: &str) -> String {
    let mut out = String::new();
    for diag in diags {
        out.push_str(&render(diag, file_id, source));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use tml_ir::Span;

    #[test]
    fn render_includes_code_and_message() {
        let src = "let mut x = 1\nx = 2\n";
        let diag = Diagnostic::error(ErrorCode::E3002)
            .with_message("cannot assign to `x` while borrowed")
            .with_label(Span::new(14, 19), "assignment here");
        let text = render(&diag, "demo.tml", src);
        assert!(text.contains("E3002"));
        assert!(text.contains("cannot assign to `x` while borrowed"));
    }
}
