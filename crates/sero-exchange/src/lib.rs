//! Ledger scanner, UTXO index and transaction builder.
//!
//! The [`Exchange`] continuously ingests blocks from a chain node,
//! trial-decrypts outputs against the viewing keys of its registered
//! accounts, maintains a persisted index of unspent outputs, serves
//! balance and history queries, and composes transactions with input
//! selection and change construction. An auto-merge job periodically
//! consolidates small coins. Chain access, proving and the transaction
//! pool are injected behind narrow traits so tests run against fakes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod api;
pub mod builder;
pub mod config;
pub mod error;
pub mod exchange;
pub mod merge;
pub mod scanner;
pub mod traits;

pub use account::{Account, AccountRegistry, MAIN_PKR_INDEX, MIN_EXTERNAL_INDEX};
pub use api::{confirm_out, render_error, BlockSummary, ConfirmedOut, PreTxParam, TxReceipt};
pub use builder::{Reception, TxParam};
pub use config::ExchangeConfig;
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeHandle};
pub use traits::{
    ChainIndex, ChainReader, CommittedTx, Signer, TxPool, WalletAccount, WalletBackend,
    WalletEvent,
};
