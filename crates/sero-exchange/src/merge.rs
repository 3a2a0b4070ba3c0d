//! Auto-merge: periodic consolidation of small SERO coins.
//!
//! Each sweep bounds the working set of dust outputs while preserving
//! the largest coins for direct spends: take up to 150 candidates,
//! require at least 11, drop the 8 largest, and collapse the rest into
//! a single self-transfer to the account's main subaddress.

use std::sync::atomic::Ordering;

use num_bigint::BigUint;
use sero_storage_kv::{pk_asset_prefix, root_from_pk_key};
use sero_wallet_core::{currency_id, Amount, Utxo, SERO_CURRENCY};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::builder::Reception;
use crate::error::Result;
use crate::exchange::{Exchange, JobGuard};

impl Exchange {
    /// One merge tick over every registered account. Concurrent ticks
    /// are dropped, not queued.
    pub fn merge_tick(&self) {
        if self
            .merge_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let _guard = JobGuard(&self.merge_running);

        for account in self.registry.all() {
            if let Err(e) = self.merge_account(&account) {
                warn!(pk = %account.pk, error = %e, "merge sweep failed");
            }
        }
    }

    /// Run one consolidation sweep for an account.
    ///
    /// Sweeps are single-flight per account: a slow chain cannot let two
    /// overlapping merges race on the same coins.
    pub fn merge_account(&self, account: &Account) -> Result<()> {
        if !self.merging.lock().insert(account.pk) {
            debug!(pk = %account.pk, "merge already in flight");
            return Ok(());
        }
        let result = self.merge_account_inner(account);
        self.merging.lock().remove(&account.pk);
        result
    }

    fn merge_account_inner(&self, account: &Account) -> Result<()> {
        let tag = currency_id(SERO_CURRENCY);
        let mut utxos: Vec<Utxo> = Vec::new();
        for entry in self.store.iter_prefix(&pk_asset_prefix(&account.pk, &tag)) {
            let (key, _) = entry?;
            let Some(root) = root_from_pk_key(&key) else {
                continue;
            };
            if let Ok(utxo) = self.get_utxo(&root) {
                utxos.push(utxo);
            }
            if utxos.len() >= self.config.merge_scan_cap {
                break;
            }
        }

        if utxos.len() < self.config.merge_min_candidates {
            return Ok(());
        }

        utxos.sort_by(|a, b| {
            let av = a.asset.token.as_ref().map(|t| &t.value);
            let bv = b.asset.token.as_ref().map(|t| &t.value);
            a.flag.cmp(&b.flag).then(av.cmp(&bv))
        });
        utxos.truncate(utxos.len() - self.config.merge_keep_largest);
        if utxos.len() < 2 {
            return Ok(());
        }

        let total = Self::sum_token(&utxos);
        let fee = Amount(
            BigUint::from(self.config.merge_gas) * BigUint::from(self.config.merge_gas_price),
        );
        let value = match total.checked_sub(&fee) {
            Some(value) if !value.is_zero() => value,
            _ => {
                debug!(pk = %account.pk, total = %total, "candidates below merge fee");
                return Ok(());
            }
        };

        let receptions = vec![Reception {
            addr: account.main_pkr,
            currency: SERO_CURRENCY.to_string(),
            value,
        }];
        let signed = self.sign_tx(
            &utxos,
            account,
            &receptions,
            self.config.merge_gas,
            self.config.merge_gas_price,
        )?;
        self.commit_tx(&signed)?;
        info!(pk = %account.pk, inputs = utxos.len(), hash = %signed.hash, "merge submitted");
        Ok(())
    }
}
