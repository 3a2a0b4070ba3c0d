//! Contracts of the external collaborators.
//!
//! The chain reader, the committed-chain lookup, the proof-assembling
//! signer, the transaction pool and the wallet backends are injected as
//! explicit handles; tests supply in-memory fakes.

use std::sync::Arc;

use sero_wallet_core::{Block, GenTxParam, Id32, Id64, Receipt, Seed, SignedTx, Witness};

use crate::error::Result;

/// One account exposed by a wallet backend.
#[derive(Clone, Debug)]
pub struct WalletAccount {
    /// Account public key.
    pub pk: Id64,
    /// Account viewing key.
    pub tk: Id64,
}

/// Narrow capability surface of a wallet backend.
pub trait WalletBackend: Send + Sync {
    /// The accounts this wallet holds.
    fn accounts(&self) -> Vec<WalletAccount>;

    /// Unlock and return the wallet seed.
    fn seed(&self) -> Result<Seed>;
}

/// Wallet lifecycle events emitted by the wallet manager.
pub enum WalletEvent {
    /// A wallet was opened or created.
    Arrived(Arc<dyn WalletBackend>),
    /// The wallet holding this account was dropped.
    Dropped(Id64),
}

/// Read access to the chain's output stream.
pub trait ChainReader: Send + Sync {
    /// Fetch up to `count` blocks starting at `start`.
    fn get_blocks_info(&self, start: u64, count: u64) -> Result<Vec<Block>>;

    /// Same as [`ChainReader::get_blocks_info`] but only returns blocks
    /// at least `delay` behind the tip.
    fn get_blocks_info_by_delay(&self, start: u64, count: u64, delay: u64) -> Result<Vec<Block>>;

    /// Fetch inclusion witnesses, positionally aligned with `roots`.
    fn get_anchor(&self, roots: &[Id32]) -> Result<Vec<Witness>>;
}

/// A transaction already committed to the chain.
#[derive(Clone, Debug)]
pub struct CommittedTx {
    /// The signed transaction.
    pub tx: SignedTx,
    /// Hash of the containing block.
    pub block_hash: Id32,
    /// Height of the containing block.
    pub block_num: u64,
    /// Index of the transaction within the block.
    pub index: usize,
}

/// Lookup surface over the committed chain, used by transaction and
/// receipt queries.
pub trait ChainIndex: Send + Sync {
    /// Locate a committed transaction by hash.
    fn read_transaction(&self, hash: &Id32) -> Result<Option<CommittedTx>>;

    /// The receipts of a block, in transaction order.
    fn receipts(&self, block_hash: &Id32) -> Result<Vec<Receipt>>;
}

/// The proof-assembling signer.
pub trait Signer: Send + Sync {
    /// Transform an unsigned parameter bundle into a signed transaction.
    fn gen_tx(&self, param: &GenTxParam) -> Result<SignedTx>;
}

/// The transaction pool signed transactions are submitted to.
pub trait TxPool: Send + Sync {
    /// Queue a locally built transaction.
    fn submit_local(&self, tx: SignedTx) -> Result<()>;

    /// A pending (not yet committed) transaction by hash, if any.
    fn pending(&self, hash: &Id32) -> Option<SignedTx>;
}
