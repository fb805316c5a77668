//! Rich error types for every pipeline stage.
//!
//! Errors carry enough context to render instructional diagnostics: the
//! byte offset where the problem occurred, the full pattern text, a stable
//! machine-readable code, and an optional beginner-friendly hint. The
//! [`SourceError`] type renders a caret snippet pointing at the offending
//! position and converts to an LSP-compatible diagnostic value.

use crate::core::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an error, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    ResourceLimit,
    Complexity,
    Runtime,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Semantic => "semantic",
            ErrorCategory::ResourceLimit => "resource-limit",
            ErrorCategory::Complexity => "complexity",
            ErrorCategory::Runtime => "runtime",
        };
        f.write_str(s)
    }
}

/// A positional error with instructional context.
///
/// Stores the exact offset where the error occurred, the full text being
/// processed, a stable error code (e.g. `backref.missing`) and an optional
/// hint explaining how to fix the problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceError {
    /// A concise description of what went wrong
    pub message: String,
    /// The byte offset (0-indexed) into the pattern body
    pub pos: usize,
    /// The full pattern text being processed
    pub text: String,
    /// An instructional hint explaining how to fix the error
    pub hint: Option<String>,
    /// Stable machine-readable code, e.g. `lexer.unterminated_class`
    pub code: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>, pos: usize, text: impl Into<String>, code: &str) -> Self {
        SourceError {
            message: message.into(),
            pos,
            text: text.into(),
            hint: None,
            code: code.to_string(),
        }
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    /// Translate the byte offset into a (line, column) pair, both 0-indexed.
    pub fn line_col(&self) -> (usize, usize) {
        let mut line = 0;
        let mut col = 0;
        for (i, ch) in self.text.char_indices() {
            if i >= self.pos {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// Format the error with a caret snippet.
    ///
    /// The snippet shows the line containing the error (truncated to a
    /// viewport around the offset for very long lines) with a `^` marker
    /// under the offending column, followed by the hint when present.
    fn format_error(&self) -> String {
        if self.text.is_empty() {
            return format!("{} at position {}", self.message, self.pos);
        }

        let (line_num, col) = self.line_col();
        let line_text = self.text.lines().nth(line_num).unwrap_or("");

        // Truncate very long lines to a window around the caret.
        const VIEWPORT: usize = 60;
        let chars: Vec<char> = line_text.chars().collect();
        let (window, caret_col) = if chars.len() > VIEWPORT {
            let start = col.saturating_sub(VIEWPORT / 2).min(chars.len());
            let end = (start + VIEWPORT).min(chars.len());
            let mut w: String = chars[start..end].iter().collect();
            if start > 0 {
                w = format!("…{}", w);
            }
            if end < chars.len() {
                w.push('…');
            }
            (w, col - start + usize::from(start > 0))
        } else {
            (line_text.to_string(), col)
        };

        let mut parts = vec![
            format!("error[{}]: {}", self.code, self.message),
            format!("> {} | {}", line_num + 1, window),
            format!(">   | {}^", " ".repeat(caret_col)),
        ];

        if let Some(ref hint) = self.hint {
            parts.push(format!("hint: {}", hint));
        }

        parts.join("\n")
    }

    /// Convert the error to an LSP Diagnostic value.
    ///
    /// # Returns
    ///
    /// A `serde_json::Value` with `range`, `severity`, `message`, `source`
    /// and `code` fields, compatible with the Language Server Protocol
    /// Diagnostic specification.
    pub fn to_lsp_diagnostic(&self) -> serde_json::Value {
        let (line, col) = self.line_col();

        let mut message = self.message.clone();
        if let Some(ref hint) = self.hint {
            message.push_str(&format!("\n\nHint: {}", hint));
        }

        serde_json::json!({
            "range": {
                "start": {"line": line, "character": col},
                "end": {"line": line, "character": col + 1}
            },
            "severity": 1,
            "message": message,
            "source": "rexamine",
            "code": self.code,
        })
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format_error())
    }
}

/// The error surface shared by every pipeline stage.
///
/// Each variant corresponds to one error kind of the public contract; the
/// `category`, `offset`, `code` and `hint` accessors expose the uniform
/// error surface regardless of variant.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Error {
    /// Tokenization failure (bad escape, unterminated class, ...)
    #[error("{0}")]
    Lexer(SourceError),

    /// Structural parse failure (unbalanced group, dangling quantifier, ...)
    #[error("{0}")]
    Parser(SourceError),

    /// Semantic rule violation found by the validator
    #[error("{0}")]
    Validation(SourceError),

    /// A non-regular feature reached the automata pipeline
    #[error("cannot analyze: {reason}")]
    Complexity {
        reason: String,
        span: Option<Span>,
    },

    /// A configured ceiling was breached; never retried with a higher budget
    #[error("{limit} limit exceeded: observed {observed}, maximum {max}")]
    ResourceLimit {
        limit: String,
        observed: u64,
        max: u64,
    },

    /// The host runtime matcher rejected a pattern the validator accepted
    #[error("runtime compilation failed: {message}")]
    RuntimeCompilation { message: String },

    /// A solver or confirmation deadline expired
    #[error("deadline exceeded during {phase}")]
    DeadlineExceeded { phase: String },

    /// Internal cache failure; demoted to a miss by the facade
    #[error("cache failure: {message}")]
    Cache { message: String },

    /// Optimizer failure; demoted to "no suggestion" when opportunistic
    #[error("optimizer failure: {message}")]
    Optimizer { message: String },

    /// ReDoS analysis failure
    #[error("redos analysis failure: {message}")]
    Redos { message: String },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Lexer(_) | Error::Parser(_) => ErrorCategory::Syntax,
            Error::Validation(_) => ErrorCategory::Semantic,
            Error::Complexity { .. } => ErrorCategory::Complexity,
            Error::ResourceLimit { .. } | Error::DeadlineExceeded { .. } => {
                ErrorCategory::ResourceLimit
            }
            Error::RuntimeCompilation { .. } => ErrorCategory::Runtime,
            Error::Cache { .. } | Error::Optimizer { .. } | Error::Redos { .. } => {
                ErrorCategory::Runtime
            }
        }
    }

    /// Byte offset into the pattern body, when the error is positional.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Lexer(e) | Error::Parser(e) | Error::Validation(e) => Some(e.pos),
            Error::Complexity { span, .. } => span.map(|s| s.start),
            _ => None,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Lexer(e) | Error::Parser(e) | Error::Validation(e) => Some(&e.code),
            Error::ResourceLimit { .. } => Some("resource.limit"),
            Error::DeadlineExceeded { .. } => Some("resource.deadline"),
            Error::Complexity { .. } => Some("complexity.unsupported"),
            Error::RuntimeCompilation { .. } => Some("runtime.compile"),
            _ => None,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::Lexer(e) | Error::Parser(e) | Error::Validation(e) => e.hint.as_deref(),
            _ => None,
        }
    }

    /// Caret snippet for positional errors, empty otherwise.
    pub fn snippet(&self) -> Option<String> {
        match self {
            Error::Lexer(e) | Error::Parser(e) | Error::Validation(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let error = SourceError::new("Unexpected character", 6, "hello world", "parser.unexpected")
            .with_hint(Some("Did you mean to escape this?".to_string()));

        let formatted = error.to_string();
        assert!(formatted.contains("Unexpected character"));
        assert!(formatted.contains("hint:"));
        assert!(formatted.contains("Did you mean to escape this?"));
        assert!(formatted.contains("parser.unexpected"));
    }

    #[test]
    fn test_caret_position() {
        let error = SourceError::new("bad", 2, "abcd", "x.y");
        let formatted = error.to_string();
        let caret_line = formatted.lines().nth(2).unwrap();
        assert!(caret_line.ends_with("  ^"));
    }

    #[test]
    fn test_line_col_multiline() {
        let error = SourceError::new("bad", 6, "ab\ncd\nef", "x.y");
        assert_eq!(error.line_col(), (2, 0));
    }

    #[test]
    fn test_lsp_diagnostic() {
        let error = SourceError::new("Unterminated group", 3, "(abc", "parser.unbalanced_group");
        let diag = error.to_lsp_diagnostic();
        assert_eq!(diag["severity"], 1);
        assert_eq!(diag["source"], "rexamine");
        assert_eq!(diag["code"], "parser.unbalanced_group");
    }

    #[test]
    fn test_category_mapping() {
        let e = Error::ResourceLimit {
            limit: "dfa_states".into(),
            observed: 10_001,
            max: 10_000,
        };
        assert_eq!(e.category(), ErrorCategory::ResourceLimit);
        assert_eq!(e.code(), Some("resource.limit"));
    }
}
