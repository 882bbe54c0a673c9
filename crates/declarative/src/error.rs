//! Error types for reconciliation runs.
//!
//! Errors are categorized so callers can tell user mistakes (fix the input)
//! apart from appliance trouble (check connectivity) and schema drift (the
//! resource declaration no longer matches what the appliance returns).

use std::fmt;

use crate::transport::{CallKind, TransportError};
use crate::types::FieldType;
use crate::validate::ValidationErrors;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Desired state violates a declared constraint.
    Validation,
    /// A required capability is unavailable.
    Environment,
    /// A remote call failed.
    Transport,
    /// The appliance returned data that does not match the schema.
    Normalization,
    /// The resource declaration itself is inconsistent.
    Schema,
}

impl ErrorCategory {
    /// Whether the error was caused by caller input.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation)
    }

    /// Whether the error points at a defect in a resource declaration.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Normalization | Self::Schema)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid desired state",
            Self::Environment => "Environmental error",
            Self::Transport => "Appliance API call failed",
            Self::Normalization => "Unexpected data from appliance",
            Self::Schema => "Invalid resource declaration",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Validation => "Correct the listed fields and run again",
            Self::Environment => "Check the resource supports the requested operation and credentials are configured",
            Self::Transport => "Check connectivity, API credentials and the appliance logs",
            Self::Normalization | Self::Schema => {
                "This might be a bug in the resource declaration; please report it"
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that end a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Desired state failed validation; no remote call was made.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A required capability is unavailable.
    #[error("environmental error: {0}")]
    Environment(String),

    /// A fetch, apply or reload call failed.
    #[error("{call} call to '{target}' failed: {source}")]
    Transport {
        /// Which call in the run failed.
        call: CallKind,
        /// API path of the failed call.
        target: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// A remote value does not match its declared type.
    #[error("possible module bug: field '{field}' has value {value} which is not a valid {expected}")]
    Normalization {
        /// Canonical field name.
        field: String,
        /// Offending remote value (JSON text).
        value: String,
        /// Declared type.
        expected: FieldType,
    },

    /// A remote response lacks the section the schema points at.
    #[error("possible module bug: response has no '{path}' section")]
    MissingEnvelope {
        /// Dotted path that could not be resolved.
        path: String,
    },

    /// The resource declaration is inconsistent.
    #[error("invalid resource schema: {0}")]
    Schema(String),
}

impl Error {
    /// Create a transport error with call context.
    pub fn transport(call: CallKind, target: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            call,
            target: target.into(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Environment(_) => ErrorCategory::Environment,
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::Normalization { .. } | Error::MissingEnvelope { .. } => {
                ErrorCategory::Normalization
            }
            Error::Schema(_) => ErrorCategory::Schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Violation;

    #[test]
    fn test_error_categories() {
        let err = Error::Validation(ValidationErrors::single(Violation::general("bad")));
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.category().is_user_error());

        let err = Error::Environment("no reload command".to_string());
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(!err.category().is_user_error());

        let err = Error::MissingEnvelope {
            path: "proxy.general".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Normalization);
        assert!(err.category().is_defect());
    }

    #[test]
    fn test_transport_error_names_call() {
        let err = Error::transport(
            CallKind::Apply,
            "proxy/settings/set",
            TransportError::Connection("connection refused".to_string()),
        );
        let display = err.to_string();
        assert!(display.contains("apply"));
        assert!(display.contains("proxy/settings/set"));
        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_normalization_display() {
        let err = Error::Normalization {
            field: "port".to_string(),
            value: "\"abc\"".to_string(),
            expected: FieldType::Int,
        };
        let display = err.to_string();
        assert!(display.contains("port"));
        assert!(display.contains("integer"));
        assert!(display.contains("bug"));
    }

    #[test]
    fn test_category_advice_and_description() {
        for category in [
            ErrorCategory::Validation,
            ErrorCategory::Environment,
            ErrorCategory::Transport,
            ErrorCategory::Normalization,
            ErrorCategory::Schema,
        ] {
            assert!(!category.description().is_empty());
            assert!(!category.advice().is_empty());
        }
    }
}
