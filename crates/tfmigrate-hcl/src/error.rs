//! Error types for lexing and parsing.

use crate::span::{offset_to_line_col, Span};
use thiserror::Error;

/// Error during lexing/parsing.
#[derive(Debug, Clone, Error)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The 1-based line the error starts on.
    pub fn line(&self, source: &str) -> usize {
        offset_to_line_col(source, self.span.start).0
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&format!("  --> line {}:{}\n", line, col));

        if let Some(source_line) = source.lines().nth(line - 1) {
            result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));

            for _ in 0..col {
                result.push(' ');
            }
            result.push('^');

            let span_len = self.span.end.saturating_sub(self.span.start);
            let room = (source_line.len() + 1).saturating_sub(col);
            for _ in 1..span_len.min(room) {
                result.push('~');
            }
            result.push('\n');
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let source = "resource \"a\" \"b\" {\n  name = \n}";
        let err = ParseError::new("expected expression, found newline", Span::new(26, 27))
            .with_hint("every attribute needs a value");

        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 2:8"));
        assert!(formatted.contains("expected expression"));
        assert!(formatted.contains("hint: every attribute needs a value"));
        assert_eq!(err.line(source), 2);
    }
}
