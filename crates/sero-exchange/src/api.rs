//! Flight operations: the synchronous surface an RPC layer binds.
//!
//! Errors are rendered as `{error: {tag, detail}}` objects by
//! [`render_error`].

use sero_wallet_core::{
    Asset, Block, ChainOutState, CryptoProvider, GenTxParam, Id32, Id64, Kr, SealedOut,
    SignedTx, SubAddr, TxIn, TxOut,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::exchange::Exchange;

/// Blocks walked per chain request when tracing backwards.
const TRACE_WINDOW: u64 = 128;

/// Explicit transaction assembly request: the caller names the input
/// roots and the exact outputs; no selection or change construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreTxParam {
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: u64,
    /// Sender subaddress.
    pub from: SubAddr,
    /// Input roots.
    pub ins: Vec<Id32>,
    /// Outputs, emitted verbatim.
    pub outs: Vec<TxOut>,
}

/// A transaction receipt joined with the block's output stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Execution status.
    pub status: u64,
    /// Transaction hash.
    pub tx_hash: Id32,
    /// Containing block height.
    pub b_num: u64,
    /// Containing block hash.
    pub b_hash: Id32,
    /// Roots of the outputs this transaction created.
    pub outs: Vec<Id32>,
    /// Traces of the outputs this transaction destroyed.
    pub nils: Vec<Id32>,
    /// Share identifier, when present.
    pub share_id: Option<Id32>,
    /// Pool identifier, when present.
    pub pool_id: Option<Id32>,
}

/// A block summary for by-number queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Block height.
    pub num: u64,
    /// Block hash.
    pub hash: Id32,
    /// Roots of the outputs created in the block.
    pub outs: Vec<Id32>,
    /// Nullifiers published in the block.
    pub nils: Vec<Id32>,
}

/// The result of an explicit offline confirmation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmedOut {
    /// Decrypted asset.
    pub asset: Asset,
    /// Decrypted memo.
    pub memo: Id64,
}

impl Exchange {
    /// Blocks in `[start, start + count)`, as served by the chain reader.
    pub fn get_blocks_info(&self, start: u64, count: u64) -> Result<Vec<Block>> {
        self.chain.get_blocks_info_by_delay(start, count, 0)
    }

    /// Summary of the block at `num`.
    pub fn get_block_by_number(&self, num: u64) -> Result<BlockSummary> {
        let blocks = self.chain.get_blocks_info_by_delay(num, 1, 0)?;
        let block = blocks
            .into_iter()
            .find(|b| b.num == num)
            .ok_or_else(|| Error::NotFound(format!("block {num}")))?;
        Ok(BlockSummary {
            num: block.num,
            hash: block.hash,
            outs: block.outs.iter().map(|o| o.root).collect(),
            nils: block.nils,
        })
    }

    /// Assemble an unsigned parameter bundle from explicit roots and
    /// outputs, stamping the key slots with the supplied viewing key.
    pub fn gen_tx_param(&self, pre: &PreTxParam, tk: &Id64) -> Result<GenTxParam> {
        let skr = SubAddr::bare(tk);
        let witnesses = self.chain.get_anchor(&pre.ins)?;
        if witnesses.len() != pre.ins.len() {
            return Err(Error::Chain(format!(
                "anchor returned {} witnesses for {} roots",
                witnesses.len(),
                pre.ins.len()
            )));
        }

        let mut ins = Vec::with_capacity(pre.ins.len());
        for (index, root) in pre.ins.iter().enumerate() {
            let record = self
                .get_root_record(root)?
                .ok_or_else(|| Error::NotFound(format!("root {root}")))?;
            ins.push(TxIn {
                root: *root,
                state: ChainOutState {
                    os: record.state.clone(),
                    num: record.num,
                    tx_hash: record.tx_hash,
                },
                witness: witnesses[index].clone(),
                skr,
            });
        }

        Ok(GenTxParam {
            gas: pre.gas,
            gas_price: pre.gas_price.into(),
            from: Kr { pkr: pre.from, skr },
            ins,
            outs: pre.outs.clone(),
        })
    }

    /// Scan backwards from `base` for the output whose trace (the
    /// viewing-key nullifier) matches.
    pub fn trace2root(&self, tk: &Id64, trace: &Id32, base: u64) -> Result<Id32> {
        let skr = SubAddr::bare(tk);
        let mut high = base;
        while high >= 1 {
            let low = high.saturating_sub(TRACE_WINDOW - 1).max(1);
            let mut blocks = self.chain.get_blocks_info(low, high - low + 1)?;
            blocks.retain(|b| b.num <= high);
            for block in blocks.iter().rev() {
                for out in &block.outs {
                    if self.crypto.generate_nullifier(&skr, &out.state.os.root_cm) == *trace {
                        return Ok(out.root);
                    }
                }
            }
            if low == 1 {
                break;
            }
            high = low - 1;
        }
        Err(Error::NotFound(format!("trace {trace}")))
    }

    /// The indexed output behind a root.
    pub fn get_out(&self, root: &Id32) -> Result<sero_wallet_core::ChainOut> {
        let record = self
            .get_root_record(root)?
            .ok_or_else(|| Error::NotFound(format!("root {root}")))?;
        Ok(sero_wallet_core::ChainOut {
            root: *root,
            state: ChainOutState {
                os: record.state,
                num: record.num,
                tx_hash: record.tx_hash,
            },
        })
    }

    /// A transaction by hash: the committed chain first, then the pool.
    pub fn get_tx(&self, hash: &Id32) -> Result<SignedTx> {
        if let Some(committed) = self.chain_index.read_transaction(hash)? {
            return Ok(committed.tx);
        }
        self.pool
            .pending(hash)
            .ok_or_else(|| Error::NotFound(format!("tx {hash}")))
    }

    /// The receipt of a committed transaction, joined with the block's
    /// output stream to enumerate created and destroyed commitments.
    pub fn get_tx_receipt(&self, hash: &Id32) -> Result<TxReceipt> {
        let committed = self
            .chain_index
            .read_transaction(hash)?
            .ok_or_else(|| Error::NotFound(format!("tx {hash}")))?;

        let receipts = self.chain_index.receipts(&committed.block_hash)?;
        let receipt = receipts.get(committed.index).ok_or_else(|| {
            Error::ReceiptsMismatch(format!(
                "block carries {} receipts, transaction index is {}",
                receipts.len(),
                committed.index
            ))
        })?;

        let blocks = self
            .chain
            .get_blocks_info_by_delay(committed.block_num, 1, 0)?;
        if blocks.len() != 1 {
            return Err(Error::NotFound(format!("block {}", committed.block_num)));
        }
        if blocks[0].hash != committed.block_hash {
            return Err(Error::ReceiptsMismatch("block hash mismatch".to_string()));
        }

        let outs = blocks[0]
            .outs
            .iter()
            .filter(|out| out.state.tx_hash == *hash)
            .map(|out| out.root)
            .collect();

        Ok(TxReceipt {
            status: receipt.status,
            tx_hash: *hash,
            b_num: committed.block_num,
            b_hash: committed.block_hash,
            outs,
            nils: committed.tx.stx.ins.clone(),
            share_id: receipt.share_id,
            pool_id: receipt.pool_id,
        })
    }

    /// Offline trial decryption of one sealed output with an explicit
    /// 32-byte key.
    pub fn confirm(&self, key: &Id32, out: &SealedOut) -> Result<ConfirmedOut> {
        confirm_out(self.crypto.as_ref(), key, out)
    }
}

/// Decrypt and confirm a sealed output with an explicit key. Unlike the
/// scanner, where a failed confirmation is a silent skip, any failure
/// here is a crypto error.
pub fn confirm_out(
    crypto: &dyn CryptoProvider,
    key: &Id32,
    out: &SealedOut,
) -> Result<ConfirmedOut> {
    let info = crypto
        .decrypt_info(key, true, &out.einfo)
        .ok_or_else(|| Error::Crypto("sealed payload is malformed".to_string()))?;
    if !crypto.confirm_sealed(&info, out) {
        return Err(Error::Crypto("confirmation failed".to_string()));
    }
    Ok(ConfirmedOut {
        asset: info.to_asset(),
        memo: info.memo,
    })
}

/// Render an error as the wire-level `{error: {tag, detail}}` object.
pub fn render_error(error: &Error) -> serde_json::Value {
    json!({
        "error": {
            "tag": error.tag(),
            "detail": error.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_shape() {
        let rendered = render_error(&Error::NotFound("tx 0xab".to_string()));
        assert_eq!(rendered["error"]["tag"], "NOT_FOUND");
        assert!(rendered["error"]["detail"]
            .as_str()
            .unwrap()
            .contains("0xab"));
    }
}
