//! Compiler diagnostics.
//!
//! A compilation either produces a complete source unit or fails with a
//! single located diagnostic. There is no partial-success mode and no retry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a compile failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompileErrorKind {
    /// Unterminated string/comment, unmatched bracket or parenthesis.
    Lexical,
    /// Unresolved variable or member, arity mismatch, dangling ternary.
    Semantic,
    /// Unknown or unusable construct that could not degrade to passthrough.
    Unsupported,
    /// A boundary resource (static include) could not be obtained.
    Resource,
}

/// The single error value surfaced to the caller: a human-readable message,
/// the offending source text when known, and a 1-based line/column when the
/// fault occurred while scanning a document.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub source_text: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CompileError {
    fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            source_text: None,
            line: None,
            column: None,
        }
    }

    pub fn lexical(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Lexical, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Semantic, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Unsupported, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Resource, message)
    }

    /// Attach the offending source text, keeping the first attachment
    /// (the innermost failure names the most precise text).
    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        if self.source_text.is_none() {
            self.source_text = Some(text.into());
        }
        self
    }

    /// Attach a 1-based document position if none was recorded yet.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.column = Some(column);
        }
        self
    }

}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(text) = &self.source_text {
            write!(f, " in '{}'", text)?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, " at line {} column {}", line, column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_with_location() {
        let err = CompileError::semantic("variable x does not exist")
            .with_source("x + 1")
            .at(3, 14);
        assert_eq!(
            err.to_string(),
            "variable x does not exist in 'x + 1' at line 3 column 14"
        );
    }

    #[test]
    fn test_location_is_not_overwritten() {
        let err = CompileError::lexical("unterminated string").at(2, 5).at(9, 9);
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(5));
    }

    #[test]
    fn test_error_serializes() {
        let err = CompileError::lexical("missing left parenthesis");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"kind\":\"lexical\""));
    }
}
