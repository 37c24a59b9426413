use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The stored document moved past the revision the caller read.
    #[error("poll `{id}` was modified concurrently (expected revision {expected})")]
    Conflict { id: String, expected: u64 },
    /// A document with the same identifier already exists.
    #[error("poll `{id}` already exists")]
    Duplicate { id: String },
    /// The document to update does not exist.
    #[error("poll `{id}` not found")]
    Missing { id: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
