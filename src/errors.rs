//! Storage error types.
//!
//! Every fallible operation in the crate returns [`StorageError`].  The
//! variants map to the failure classes of the remote blob service:
//! missing blobs, rejected credentials, transport faults, and
//! unparseable metadata.  `NotFound` is the only variant the store
//! layer absorbs (idempotent delete, `exists`); everything else
//! propagates to the caller.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The blob does not exist in the container.
    #[error("blob not found: {key}")]
    NotFound { key: String },

    /// The service rejected the request credentials.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Invalid or incomplete configuration.  Raised at construction time,
    /// before any request is made.
    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// Network failure or an unexpected service response.
    #[error("{context}: {message}")]
    Transport { context: String, message: String },

    /// The service returned a last-modified value that the configured
    /// timestamp format cannot parse.
    #[error("cannot parse timestamp {value:?} with format {format:?}")]
    TimestampParse { value: String, format: String },

    /// Local mirror filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Build a `NotFound` error for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        StorageError::NotFound { key: key.into() }
    }

    /// Build a `Transport` error from any displayable cause.
    pub fn transport(context: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        StorageError::Transport {
            context: context.into(),
            message: cause.to_string(),
        }
    }

    /// True for the missing-blob case that idempotent operations absorb.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
