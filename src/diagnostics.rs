//! Diagnostic model shared by every compilation stage.
//!
//! One constructor call per diagnostic, owned data, no string-table
//! threading required to report an error.

use crate::source::Span;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{s}")
    }
}

/// A fully owned diagnostic: no string-table or source-file borrow is
/// needed to carry it out of the stage that produced it, matching the
/// teacher's `ErrorLocation` design principle ("No StringTable
/// Dependencies").
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: PathBuf,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(file: impl Into<PathBuf>, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn warning(file: impl Into<PathBuf>, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn note(file: impl Into<PathBuf>, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Note,
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    /// User-visible format: `error: <message> at <file>:<line>:<column>`.
    pub fn render(&self, line_col: crate::source::LineCol) -> String {
        format!(
            "{}: {} at {}:{}",
            self.severity,
            self.message,
            self.file.display(),
            line_col
        )
    }
}

/// Accumulates diagnostics across a stage (or a whole compilation); never
/// aborts on the first error. The driver is the only consumer that tallies
/// severities and turns them into a process exit code.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, file: &Path, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::error(file.to_path_buf(), span, message));
    }

    pub fn warning(&mut self, file: &Path, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::warning(file.to_path_buf(), span, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn extend(&mut self, other: DiagnosticSink) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_ignores_warnings() {
        let mut sink = DiagnosticSink::new();
        sink.warning(Path::new("a.kei"), Span::default(), "unused variable");
        assert!(!sink.has_errors());
        sink.error(Path::new("a.kei"), Span::default(), "undeclared name");
        assert!(sink.has_errors());
    }

    #[test]
    fn render_matches_spec_format() {
        let d = Diagnostic::error(PathBuf::from("a.kei"), Span::new(0, 1), "bad thing");
        let rendered = d.render(crate::source::LineCol { line: 3, column: 5 });
        assert_eq!(rendered, "error: bad thing at a.kei:3:5");
    }
}
