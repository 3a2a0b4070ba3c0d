//! SERO wallet engine core
//!
//! This crate holds the fundamental data model shared by the scanner,
//! the transaction builder and the storage layer: fixed-width identifiers,
//! subaddresses, assets, output states, UTXO records, transaction
//! parameters, and the crypto provider contract with its software
//! reference implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod error;
pub mod outputs;
pub mod tx;
pub mod types;

pub use crypto::{hash_stx, CryptoProvider, InfoDesc, SoftwareCrypto};
pub use error::{Error, Result};
pub use outputs::{
    Block, ChainOut, ChainOutState, OutKind, OutState, PlainOut, RootRecord, SealedOut, Utxo,
    Witness,
};
pub use tx::{GenTxParam, Kr, Receipt, SignedTx, Stx, TxIn, TxOut};
pub use types::{
    currency_id, currency_name, Amount, Asset, Balances, Id32, Id64, Seed, SubAddr, Ticket,
    Token, SERO_CURRENCY,
};
