//! Error taxonomy for the exchange.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Exchange errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input: hex decode failure, wrong-length key, bad JSON
    #[error("Malformed input: {0}")]
    InputMalformed(String),

    /// Operation references an account that is not registered
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// Requested subaddress index below the external minimum
    #[error("Subaddress index too low: {0} (must be >= 100)")]
    IndexTooLow(u64),

    /// Selection cannot cover the requested amount plus fee
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Entity could not be located
    #[error("Not found: {0}")]
    NotFound(String),

    /// Block/receipt consistency violation during receipt assembly
    #[error("Receipts mismatch: {0}")]
    ReceiptsMismatch(String),

    /// Underlying key-value store or codec failure
    #[error("Store error: {0}")]
    Store(#[from] sero_storage_kv::Error),

    /// Chain reader failure
    #[error("Chain error: {0}")]
    Chain(String),

    /// Cryptographic failure on an explicit confirm
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// The wire tag rendered into `{error: {tag, detail}}` responses.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::InputMalformed(_) => "INPUT_MALFORMED",
            Error::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Error::IndexTooLow(_) => "INDEX_TOO_LOW",
            Error::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            Error::NotFound(_) => "NOT_FOUND",
            Error::ReceiptsMismatch(_) => "RECEIPTS_MISMATCH",
            Error::Store(_) => "STORE_ERROR",
            Error::Chain(_) => "CHAIN_ERROR",
            Error::Crypto(_) => "CRYPTO_ERROR",
        }
    }

    /// A store-layer codec failure.
    pub fn codec(detail: impl Into<String>) -> Self {
        Error::Store(sero_storage_kv::Error::Codec(detail.into()))
    }
}

impl From<sero_wallet_core::Error> for Error {
    fn from(e: sero_wallet_core::Error) -> Self {
        match e {
            sero_wallet_core::Error::InputMalformed(d) => Error::InputMalformed(d),
            sero_wallet_core::Error::Codec(d) => Error::codec(d),
            sero_wallet_core::Error::Crypto(d) => Error::Crypto(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_the_wire_contract() {
        assert_eq!(Error::InputMalformed("x".into()).tag(), "INPUT_MALFORMED");
        assert_eq!(Error::IndexTooLow(3).tag(), "INDEX_TOO_LOW");
        assert_eq!(Error::codec("bad rlp").tag(), "STORE_ERROR");
        assert_eq!(Error::Chain("down".into()).tag(), "CHAIN_ERROR");
    }
}
