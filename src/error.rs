//! Error types for pkgcache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in pkgcache
#[derive(Error, Debug)]
pub enum CacheError {
    // Precondition errors (caller bugs)
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    // Persistence errors
    #[error("Database file is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("Failed to deserialize database {path}: {reason}")]
    DeserializationFailure { path: PathBuf, reason: String },

    // Refresh errors
    #[error("Package fetch returned no data for {requested} package(s)")]
    FetchFailure { requested: usize },

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

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the error means no usable database could be produced
    pub fn is_no_database(&self) -> bool {
        matches!(
            self,
            Self::EmptyFile(_) | Self::DeserializationFailure { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EmptyFile(_) | Self::DeserializationFailure { .. } => {
                Some("Remove the database file to start with a fresh cache")
            }
            Self::ConfigInvalid { .. } => Some("Run: pkgcache config init --force"),
            _ => None,
        }
    }
}
