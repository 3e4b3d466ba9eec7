//! Error types shared by the registry, the JSON store and the notifier.

use std::path::PathBuf;

/// Failures of the on-disk state file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Errors surfaced by registry and camp-list operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required field (device id, coordinates) is missing or falsy.
    #[error("{0}")]
    Validation(String),
    /// Camp index outside `0..len`.
    #[error("{0}")]
    Index(String),
    /// The mutation is applied in memory but the state file could not be written.
    #[error("failed to persist state: {0}")]
    Persistence(#[from] StoreError),
}

impl RegistryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// True for errors caused by the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Index(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Validation(String),
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}
