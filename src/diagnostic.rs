//! Machine-actionable failure descriptions.
//!
//! Every failure the engine, validator or transaction layer reports ends up
//! as a [`Diagnostic`]: a stable code for the caller to branch on, a message,
//! and a suggestion an automated caller can act on without a human.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    UnsupportedLanguage,
    DuplicateTarget,
    AmbiguousTarget,
    TargetNotFound,
    InvalidOperation,
    SyntaxError,
    ConflictingOperation,
    IoFailure,
}

impl DiagnosticCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            DiagnosticCode::DuplicateTarget => "DUPLICATE_TARGET",
            DiagnosticCode::AmbiguousTarget => "AMBIGUOUS_TARGET",
            DiagnosticCode::TargetNotFound => "TARGET_NOT_FOUND",
            DiagnosticCode::InvalidOperation => "INVALID_OPERATION",
            DiagnosticCode::SyntaxError => "SYNTAX_ERROR",
            DiagnosticCode::ConflictingOperation => "CONFLICTING_OPERATION",
            DiagnosticCode::IoFailure => "IO_FAILURE",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error with a corrective suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_match: Option<String>,
    /// Annotated source excerpt around `line_number`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: suggestion.into(),
            line_number: None,
            nearest_match: None,
            context: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line_number = Some(line);
        self
    }

    pub fn with_nearest_match(mut self, name: impl Into<String>) -> Self {
        self.nearest_match = Some(name.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn unsupported_language(language: &str) -> Self {
        let known = crate::Language::all()
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(
            DiagnosticCode::UnsupportedLanguage,
            format!("no grammar is registered for language '{language}'"),
            format!("Use one of the supported languages: {known}."),
        )
    }

    pub fn io_failure(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::new(
            DiagnosticCode::IoFailure,
            format!("I/O error on {}: {err}", path.display()),
            "Check permissions and free space on the target filesystem, then retry.",
        )
    }

    pub fn conflicting_operation(message: impl Into<String>) -> Self {
        Self::new(
            DiagnosticCode::ConflictingOperation,
            message,
            "Stage at most one operation per path, or split the work into separate transactions.",
        )
    }

    /// Everything except I/O failures can be retried with a corrected request.
    pub fn is_retryable(&self) -> bool {
        self.code != DiagnosticCode::IoFailure
    }

    /// Hand the diagnostic to the tracing subscriber.
    pub fn record(&self) {
        tracing::warn!(
            code = %self.code,
            message = %self.message,
            suggestion = %self.suggestion,
            line = ?self.line_number,
            nearest_match = ?self.nearest_match,
            "edit diagnostic"
        );
    }
}
