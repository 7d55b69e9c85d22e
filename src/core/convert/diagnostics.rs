use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, ErrorSeverity};
use serde::Serialize;
use std::fmt;

/// Recoverable issue classes recorded during a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    UnsupportedConstruct,
    UnresolvedExpression,
    IdentifierCollisionExhaustion,
    UnsupportedShape,
    CacheNotFolded,
}

impl DiagnosticKind {
    fn from_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::UnresolvedExpression => DiagnosticKind::UnresolvedExpression,
            ErrorCategory::IdentifierCollisionExhaustion => {
                DiagnosticKind::IdentifierCollisionExhaustion
            }
            ErrorCategory::UnsupportedShape => DiagnosticKind::UnsupportedShape,
            _ => DiagnosticKind::UnsupportedConstruct,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::UnsupportedConstruct => "unsupported-construct",
            DiagnosticKind::UnresolvedExpression => "unresolved-expression",
            DiagnosticKind::IdentifierCollisionExhaustion => "identifier-collision-exhaustion",
            DiagnosticKind::UnsupportedShape => "unsupported-shape",
            DiagnosticKind::CacheNotFolded => "cache-not-folded",
        };
        f.write_str(label)
    }
}

/// Individual issue emitted while converting one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub kind: DiagnosticKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        kind: DiagnosticKind,
        severity: ErrorSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            kind,
            severity,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    pub fn warning(code: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(code, kind, ErrorSeverity::Warning, message)
    }

    pub fn info(code: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(code, kind, ErrorSeverity::Info, message)
    }

    /// Downgrade a node-level error into a diagnostic.
    pub fn from_error(error: &AppError) -> Self {
        Self {
            code: error.code.clone(),
            kind: DiagnosticKind::from_category(error.category),
            severity: ErrorSeverity::Warning,
            message: error.message.clone(),
            location: None,
            suggestion: error.recovery_suggestions.first().cloned(),
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}

/// Ordered diagnostics accumulator owned by one conversion.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(code = %diagnostic.code, kind = %diagnostic.kind, "{}", diagnostic.message);
        self.entries.push(diagnostic);
    }

    /// Marker for [`Diagnostics::since`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded after `mark` was taken.
    pub fn since(&self, mark: usize) -> &[Diagnostic] {
        self.entries.get(mark..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
