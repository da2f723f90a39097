//! Byte ranges into HCL source and their line/column positions.

use std::ops::Range;

/// Half-open byte range `start..end` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span containing both.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Translate a span relative to a template or heredoc body into one
    /// relative to the whole file.
    pub fn offset(self, base: usize) -> Span {
        Span::new(base + self.start, base + self.end)
    }

    /// The covered text, if the span lies on character boundaries of `source`.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// 1-based `(line, column)` of a byte offset. Columns count characters, so a
/// multi-byte character advances the column by one. Offsets past the end
/// resolve to the position just after the last character.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
