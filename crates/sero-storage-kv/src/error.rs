//! Error types for the storage layer.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying key-value store failure
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    /// Persisted value failed to decode
    #[error("Codec error: {0}")]
    Codec(String),
}
