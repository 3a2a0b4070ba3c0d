//! Error types for the wallet core.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input: hex decode failure, wrong-length key, bad JSON
    #[error("Malformed input: {0}")]
    InputMalformed(String),

    /// Codec failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Crypto failure on an explicit confirm
    #[error("Crypto error: {0}")]
    Crypto(String),
}
