use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Malformed or structurally invalid source tree.
    ParseError,
    /// Recognized source construct that has no target equivalent.
    UnsupportedConstruct,
    /// Expression token that matched no static or dynamic rule.
    UnresolvedExpression,
    /// The allocator ran out of collision suffixes for one identifier.
    IdentifierCollisionExhaustion,
    /// A field value did not decode into any accepted shape.
    UnsupportedShape,
    ValidationError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Whether an error of this category aborts the whole conversion.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCategory::ParseError
                | ErrorCategory::ValidationError
                | ErrorCategory::SerializationError
                | ErrorCategory::IoError
                | ErrorCategory::InternalError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Debug => write!(f, "debug"),
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
        }
    }
}

/// Source formats accepted by the bundled front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Circle,
    HarnessV0,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Circle => write!(f, "circle"),
            SourceFormat::HarnessV0 => write!(f, "harness-v0"),
        }
    }
}
