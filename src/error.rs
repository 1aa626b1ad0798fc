//! Error types for vdsattr
//!
//! All modules use `VdsResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vdsattr operations
pub type VdsResult<T> = Result<T, VdsError>;

/// All errors that can occur in vdsattr
#[derive(Error, Debug)]
pub enum VdsError {
    // Request errors
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Not authorized to read {0}")]
    Unauthorized(String),

    #[error("Could not fingerprint request: {0}")]
    Fingerprint(#[source] serde_json::Error),

    // Engine errors
    #[error("Could not open data source {url}: {reason}")]
    DataSourceOpen { url: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl VdsError {
    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error is caused by the caller's input.
    ///
    /// Fingerprint failures count as caller errors: the request could not be
    /// put into canonical form.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Fingerprint(_))
    }

    /// Nothing in the core is retried, neither input nor engine failures
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(_) => Some("Check the sas token(s) supplied with the request"),
            Self::DataSourceOpen { .. } => Some("Check that the vds url points to a volume file"),
            Self::ConfigInvalid { .. } => Some("Run: vdsattr config init --force"),
            _ => None,
        }
    }
}
