//! Error types for connection setup.
//!
//! Failures of individual API calls are reported as
//! [`declarative::TransportError`]; this module covers everything that can go
//! wrong before the first call (configuration, credentials).

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for client setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of setup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration file missing or malformed.
    Config,
    /// API key or secret unavailable.
    Credentials,
    /// Filesystem error.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Config => "Invalid connection configuration",
            Self::Credentials => "API credentials unavailable",
            Self::Io => "File access failed",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Config => "Check the firewall address and settings in config.toml",
            Self::Credentials => {
                "Set api_key/api_secret, point api_credential_file at a key file, or export OPN_API_KEY and OPN_API_SECRET"
            }
            Self::Io => "Check the path exists and is readable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that prevent a client from being built.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration value is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// No usable API key/secret.
    #[error("missing API credentials: {0}")]
    MissingCredentials(String),

    /// IO error while reading a file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Parse { .. } => ErrorCategory::Config,
            Error::MissingCredentials(_) => ErrorCategory::Credentials,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// Setup failures surface to the engine as environmental errors.
impl From<Error> for declarative::Error {
    fn from(err: Error) -> Self {
        declarative::Error::Environment(err.to_string())
    }
}
