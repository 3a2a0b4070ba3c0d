//! Block scan pipeline: fetch, trial-decrypt, index, reclaim.
//!
//! Accounts sharing a scan cursor share the same block reads and
//! decryption pass. Each window commits as a single atomic batch; the
//! cursor advances only when the batch lands, so reprocessing a window
//! is idempotent with respect to the index.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use borsh::BorshDeserialize;
use sero_storage_kv::{
    encode_number, nil_key, num_key, pk_key, pkr_key, root_from_pk_key, root_key, WriteBatch,
};
use sero_wallet_core::{
    Asset, ChainOut, CryptoProvider, Id32, Id64, OutKind, RootRecord, SubAddr,
};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::exchange::Exchange;

/// Grouping key for a window's matched outputs: every output here was
/// addressed to `pkr` in block `num` and belongs to account `pk`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey {
    pk: Id64,
    pkr: SubAddr,
    num: u64,
}

/// Outcome of one fetch-and-index window.
struct ScanOutcome {
    /// Number of blocks the chain reader returned.
    fetched: usize,
    /// Cursor value after the window.
    next: u64,
}

impl Exchange {
    /// One scan tick: process every cursor group. Concurrent ticks are
    /// dropped, not queued.
    pub fn scan_tick(&self) {
        if self
            .scan_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let _guard = crate::exchange::JobGuard(&self.scan_running);

        let groups: HashMap<u64, Vec<Id64>> = {
            let numbers = self.numbers.lock();
            let mut groups: HashMap<u64, Vec<Id64>> = HashMap::new();
            for (pk, num) in numbers.iter() {
                groups.entry(*num).or_default().push(*pk);
            }
            groups
        };

        for (num, pks) in groups {
            let mut start = num;
            loop {
                match self.fetch_and_index(start, &pks) {
                    Ok(outcome) => {
                        if (outcome.fetched as u64) < self.config.fetch_window {
                            break;
                        }
                        start = outcome.next;
                    }
                    Err(e) => {
                        warn!(start, error = %e, "scan window aborted");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch one window of blocks for a cursor group, trial-decrypt its
    /// outputs, and commit the index mutations plus the cursor advance
    /// as a single atomic batch.
    fn fetch_and_index(&self, start: u64, pks: &[Id64]) -> Result<ScanOutcome> {
        let blocks = self.chain.get_blocks_info(start, self.config.fetch_window)?;
        if blocks.is_empty() {
            return Ok(ScanOutcome {
                fetched: 0,
                next: start,
            });
        }
        debug!(start, blocks = blocks.len(), accounts = pks.len(), "scanning window");

        let mut outs: HashMap<GroupKey, Vec<ChainOut>> = HashMap::new();
        let mut accounts: HashMap<Id64, Arc<Account>> = HashMap::new();
        let mut nils: Vec<Id32> = Vec::new();

        for block in &blocks {
            for out in &block.outs {
                let dest = *out.state.os.dest();
                let Some(account) = self.own_pkr(pks, &dest) else {
                    continue;
                };
                let key = GroupKey {
                    pk: account.pk,
                    pkr: dest,
                    num: out.state.num,
                };
                accounts.entry(account.pk).or_insert(account);
                outs.entry(key).or_default().push(out.clone());
            }
            nils.extend_from_slice(&block.nils);
        }

        let mut utxos: HashMap<GroupKey, Vec<RootRecord>> = HashMap::new();
        for (key, group) in outs {
            let account = &accounts[&key.pk];
            let records = decrypt_outs(self.crypto.as_ref(), &group, &account.skr);
            if !records.is_empty() {
                utxos.insert(key, records);
            }
        }

        let mut batch = self.store.batch();
        if !utxos.is_empty() || !nils.is_empty() {
            self.index_window(&mut batch, &utxos, &nils)?;
        }

        let fetched = blocks.len();
        let next = blocks[fetched - 1].num + 1;
        for pk in pks {
            batch.put(num_key(pk), encode_number(next).to_vec());
        }
        batch.commit(&self.store)?;

        // The mirror only advances once the batch is durable, and only
        // for accounts that are still registered.
        let mut numbers = self.numbers.lock();
        for pk in pks {
            if let Some(cursor) = numbers.get_mut(pk) {
                *cursor = next;
            }
        }

        Ok(ScanOutcome { fetched, next })
    }

    /// Write index entries for the window's decrypted UTXOs, then apply
    /// the window's on-chain nullifiers.
    ///
    /// An output produced and spent within the same window never
    /// surfaces: its pending `PK` entry and both `NIL` aliases are
    /// dropped from the batch before commit.
    fn index_window(
        &self,
        batch: &mut WriteBatch,
        utxos: &HashMap<GroupKey, Vec<RootRecord>>,
        nils: &[Id32],
    ) -> Result<()> {
        for (key, records) in utxos {
            let mut roots: Vec<Id32> = Vec::with_capacity(records.len());
            for record in records {
                let encoded = borsh::to_vec(record)
                    .map_err(|e| Error::codec(format!("root record: {e}")))?;
                batch.put(root_key(&record.root), encoded);

                let asset_key = match (&record.asset.token, &record.asset.ticket) {
                    (Some(token), _) => token.currency,
                    (None, Some(ticket)) => ticket.value,
                    (None, None) => {
                        warn!(root = %record.root, "decrypted output carries no asset");
                        continue;
                    }
                };
                let marker = pk_key(&key.pk, &asset_key, &record.root);
                batch.put(marker.clone(), vec![0]);
                batch.put(nil_key(&record.nil), marker.clone());
                batch.put(nil_key(&record.root), marker);

                roots.push(record.root);
                info!(pk = %key.pk, root = %record.root, num = record.num, "index add");
            }

            if roots.is_empty() {
                continue;
            }
            // Merge with any roots previously indexed at this
            // (subaddress, block) slot so rescans stay idempotent.
            let history = pkr_key(&key.pkr, key.num);
            let mut merged = match self.store.get(&history)? {
                Some(raw) => Vec::<Id32>::try_from_slice(&raw).unwrap_or_else(|e| {
                    warn!(num = key.num, error = %e, "unreadable history entry replaced");
                    Vec::new()
                }),
                None => Vec::new(),
            };
            for root in roots {
                if !merged.contains(&root) {
                    merged.push(root);
                }
            }
            let encoded = borsh::to_vec(&merged)
                .map_err(|e| Error::codec(format!("roots list: {e}")))?;
            batch.put(history, encoded);
        }

        for nil in nils {
            let alias = nil_key(nil);
            if let Some(marker) = batch.pending(&alias).cloned() {
                // Produced and spent within this very window.
                batch.cancel(&alias);
                batch.cancel(&marker);
                if let Some(root) = root_from_pk_key(&marker) {
                    batch.cancel(&nil_key(&root));
                }
                info!(nil = %nil, "index cancel");
            } else if let Some(marker) = self.store.get(&alias)? {
                batch.delete(marker);
                batch.delete(alias);
                info!(nil = %nil, "index del");
            }
            self.used.lock().remove(nil);
        }

        Ok(())
    }

    /// Resolve the owning account of a destination among the current
    /// cursor group. Outputs belong to at most one account because
    /// viewing keys are disjoint.
    fn own_pkr(&self, pks: &[Id64], pkr: &SubAddr) -> Option<Arc<Account>> {
        for pk in pks {
            let Some(account) = self.registry.get(pk) else {
                // Dropped between grouping and processing.
                warn!(pk = %pk, "account vanished mid-scan");
                continue;
            };
            if self.crypto.is_my_address(&account.tk, pkr) {
                return Some(account);
            }
        }
        None
    }
}

/// Trial-decrypt a group of outputs addressed to one subaddress.
///
/// Cleartext outputs carry their asset; sealed outputs are decrypted
/// with the shared key and validated against the payload commitment. A
/// failed confirmation is an expected corner case (the viewing address
/// matched but the output is not ours) and is skipped silently.
pub(crate) fn decrypt_outs(
    crypto: &dyn CryptoProvider,
    outs: &[ChainOut],
    skr: &SubAddr,
) -> Vec<RootRecord> {
    let mut records = Vec::with_capacity(outs.len());
    for out in outs {
        let decrypted: Option<Asset> = match &out.state.os.kind {
            OutKind::Plain(plain) => Some(plain.asset.clone()),
            OutKind::Sealed(sealed) => {
                let (key, flag) = crypto.fetch_key(skr, &sealed.rpk);
                match crypto.decrypt_info(&key, flag, &sealed.einfo) {
                    Some(info) if crypto.confirm_sealed(&info, sealed) => Some(info.to_asset()),
                    _ => None,
                }
            }
        };
        let Some(asset) = decrypted else {
            debug!(root = %out.root, "sealed output failed confirmation");
            continue;
        };
        let nil = crypto.generate_nullifier(skr, &out.state.os.root_cm);
        records.push(RootRecord {
            root: out.root,
            tx_hash: out.state.tx_hash,
            nil,
            num: out.state.num,
            asset,
            state: out.state.os.clone(),
        });
    }
    records
}
