//! Source buffers and byte-offset -> (line, column) resolution.
//!
//! A single owned source buffer per file; modules are few and short-lived
//! per compilation run, so no string-table interning is needed.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A byte span into an owning `SourceFile`. `start..end` are byte offsets,
/// `end` exclusive. Every AST and KIR node carries one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Span { start, end }
    }

    /// A zero-width span at `pos`, used for synthesized diagnostics that
    /// have no natural extent (e.g. "missing semicolon" after EOF).
    pub fn point(pos: u32) -> Self {
        Span { start: pos, end: pos }
    }

    pub fn to(self, other: Span) -> Self {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// 1-based line and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An immutable source buffer plus a lazily-built line-start index. Owned by
/// the module it backs for the lifetime of the compilation; the resolver's
/// module table keeps these alive.
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
    line_starts: OnceLock<Vec<u32>>,
}

impl SourceFile {
    pub fn new(path: PathBuf, contents: String) -> Self {
        SourceFile {
            path,
            contents,
            line_starts: OnceLock::new(),
        }
    }

    fn line_starts(&self) -> &[u32] {
        self.line_starts.get_or_init(|| {
            let mut starts = vec![0u32];
            for (i, b) in self.contents.bytes().enumerate() {
                if b == b'\n' {
                    starts.push(i as u32 + 1);
                }
            }
            starts
        })
    }

    /// Resolves a byte offset to a 1-based (line, column). Columns count
    /// UTF-8 bytes from the start of the line, not grapheme clusters —
    /// adequate for diagnostics.
    pub fn line_col(&self, offset: u32) -> LineCol {
        let starts = self.line_starts();
        let line_idx = match starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = starts[line_idx];
        LineCol {
            line: line_idx as u32 + 1,
            column: offset.saturating_sub(line_start) + 1,
        }
    }

    pub fn slice(&self, span: Span) -> &str {
        &self.contents[span.start as usize..span.end as usize]
    }

    pub fn display_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let src = SourceFile::new(PathBuf::from("t.kei"), "abc\ndef\nghi".to_string());
        assert_eq!(src.line_col(0), LineCol { line: 1, column: 1 });
        assert_eq!(src.line_col(4), LineCol { line: 2, column: 1 });
        assert_eq!(src.line_col(9), LineCol { line: 3, column: 2 });
    }

    #[test]
    fn slice_extracts_span_text() {
        let src = SourceFile::new(PathBuf::from("t.kei"), "let x = 1;".to_string());
        assert_eq!(src.slice(Span::new(4, 5)), "x");
    }
}
