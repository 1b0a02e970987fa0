//! Error types for QuestionHub.
//!
//! Library crates use [`QuestionHubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all QuestionHub operations.
#[derive(Debug, thiserror::Error)]
pub enum QuestionHubError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The question graph could not be canonicalized (dangling edge, duplicate node, ...).
    #[error("hash computation error: {message}")]
    HashComputation { message: String },

    /// The job queue rejected a submission or could not be reached.
    #[error("enqueue error: {0}")]
    Enqueue(String),

    /// The job queue could not produce a record listing.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A looked-up entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data validation error (malformed machine question, bad header value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuestionHubError>;

impl QuestionHubError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a hash computation error from any displayable message.
    pub fn hash(msg: impl Into<String>) -> Self {
        Self::HashComputation {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for `entity` keyed by `id`.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = QuestionHubError::config("missing db path");
        assert_eq!(err.to_string(), "config error: missing db path");

        let err = QuestionHubError::hash("edge e0 references unknown node n9");
        assert!(err.to_string().starts_with("hash computation error"));
        assert!(err.to_string().contains("n9"));

        let err = QuestionHubError::not_found("question", "abc");
        assert_eq!(err.to_string(), "question not found: abc");
    }

    #[test]
    fn json_errors_convert() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: QuestionHubError = parse.unwrap_err().into();
        assert!(matches!(err, QuestionHubError::Json(_)));
    }
}
