//! Transaction parameter bundles exchanged with the proof-assembling
//! signer and the transaction pool.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::outputs::{hex_bytes, ChainOutState, Witness};
use crate::types::{Amount, Asset, Id32, Id64, SubAddr};

/// A key slot: the destination subaddress plus, once unlocked, the key
/// material the prover signs with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kr {
    /// Subaddress.
    pub pkr: SubAddr,
    /// Signing key in subaddress form; zero until stamped.
    pub skr: SubAddr,
}

/// A transaction input: a selected output with its witness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Root of the spent output.
    pub root: Id32,
    /// On-chain state of the spent output.
    pub state: ChainOutState,
    /// Inclusion witness, positionally fetched from the chain reader.
    pub witness: Witness,
    /// Signing key in subaddress form; zero until stamped.
    pub skr: SubAddr,
}

/// A transaction output to be created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Destination subaddress.
    pub pkr: SubAddr,
    /// Asset to transfer.
    pub asset: Asset,
    /// Memo.
    pub memo: Id64,
}

impl TxOut {
    /// An output with an empty memo.
    pub fn new(pkr: SubAddr, asset: Asset) -> Self {
        Self {
            pkr,
            asset,
            memo: Id64::default(),
        }
    }
}

/// The unsigned parameter bundle handed to the signer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenTxParam {
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: Amount,
    /// Sender slot (change and passthrough target).
    pub from: Kr,
    /// Inputs with witnesses.
    pub ins: Vec<TxIn>,
    /// Outputs including change and ticket passthrough.
    pub outs: Vec<TxOut>,
}

/// A sealed, proven transaction body.
///
/// The wallet treats the proof payload as opaque; the published input
/// traces are kept visible so receipts can enumerate destroyed outputs.
#[derive(
    Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Stx {
    /// Traces of the spent inputs, as published on chain.
    pub ins: Vec<Id32>,
    /// Opaque proof payload.
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

/// A signed transaction as returned by the signer and accepted by the
/// transaction pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: Amount,
    /// Proven transaction body.
    pub stx: Stx,
    /// Transaction hash.
    pub hash: Id32,
}

/// A transaction receipt as recorded by the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Execution status.
    pub status: u64,
    /// Share identifier, when the transaction created one.
    pub share_id: Option<Id32>,
    /// Pool identifier, when the transaction created one.
    pub pool_id: Option<Id32>,
}
