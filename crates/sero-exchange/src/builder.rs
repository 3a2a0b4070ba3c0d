//! Input selection and transaction assembly.

use std::collections::HashMap;

use num_bigint::BigUint;
use sero_storage_kv::{pk_asset_prefix, root_from_pk_key};
use sero_wallet_core::{
    currency_id, currency_name, hash_stx, Amount, Asset, GenTxParam, Id32, Id64, Kr,
    ChainOutState, SignedTx, SubAddr, TxIn, TxOut, Utxo, SERO_CURRENCY,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::exchange::Exchange;

/// A requested outgoing transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reception {
    /// Destination subaddress; a bare public key is re-targeted to the
    /// recipient's main subaddress.
    pub addr: SubAddr,
    /// Currency name.
    pub currency: String,
    /// Amount to transfer.
    pub value: Amount,
}

/// A transaction build request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxParam {
    /// Sending account.
    pub from: Id64,
    /// Requested transfers.
    pub receptions: Vec<Reception>,
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: u64,
    /// Explicit input roots; when non-empty, selection is skipped and
    /// exactly this set is spent.
    #[serde(default)]
    pub roots: Vec<Id32>,
}

fn fee_of(gas: u64, gas_price: u64) -> Amount {
    Amount(BigUint::from(gas) * BigUint::from(gas_price))
}

impl Exchange {
    /// Build an unsigned transaction parameter bundle for the request.
    pub fn gen_tx(&self, param: &TxParam) -> Result<GenTxParam> {
        let account = self
            .registry
            .get(&param.from)
            .ok_or_else(|| Error::UnknownAccount(param.from.to_string()))?;
        let utxos = self.pre_gen_tx(param)?;
        self.build_tx_param(
            &utxos,
            &account,
            &param.receptions,
            param.gas,
            param.gas_price,
        )
    }

    /// Build, sign and hash a transaction for the request.
    pub fn gen_tx_with_sign(&self, param: &TxParam) -> Result<SignedTx> {
        let account = self
            .registry
            .get(&param.from)
            .ok_or_else(|| Error::UnknownAccount(param.from.to_string()))?;
        let utxos = self.pre_gen_tx(param)?;
        match self.sign_tx(&utxos, &account, &param.receptions, param.gas, param.gas_price) {
            Ok(signed) => {
                info!(hash = %signed.hash, "transaction built");
                Ok(signed)
            }
            Err(e) => {
                warn!(from = %param.from, error = %e, "transaction build failed");
                Err(e)
            }
        }
    }

    /// Submit a signed transaction to the pool.
    pub fn commit_tx(&self, tx: &SignedTx) -> Result<()> {
        info!(hash = %tx.hash, "submitting transaction");
        self.pool.submit_local(tx.clone())
    }

    /// Resolve the input set: explicit roots verbatim, otherwise a
    /// per-currency search covering the aggregated receptions plus fee.
    fn pre_gen_tx(&self, param: &TxParam) -> Result<Vec<Utxo>> {
        if !param.roots.is_empty() {
            return param.roots.iter().map(|root| self.get_utxo(root)).collect();
        }

        let mut amounts: HashMap<String, Amount> = HashMap::new();
        for reception in &param.receptions {
            amounts
                .entry(reception.currency.to_ascii_uppercase())
                .or_default()
                .add_assign(&reception.value);
        }
        // The fee is funded in SERO even when no SERO output is
        // requested.
        amounts
            .entry(SERO_CURRENCY.to_string())
            .or_default()
            .add_assign(&fee_of(param.gas, param.gas_price));

        let mut utxos = Vec::new();
        for (currency, amount) in amounts {
            utxos.extend(self.find_utxos(&param.from, &currency, &amount)?);
        }
        Ok(utxos)
    }

    /// Select UTXOs of one currency covering `amount`.
    ///
    /// Free outputs are taken in index order first. If they cannot cover
    /// the request, outputs sitting in the reserved-spent set are taken
    /// as a second chance, smallest first: the set is advisory and a
    /// prior reservation may never land. Still short means the account
    /// cannot fund the request.
    pub(crate) fn find_utxos(
        &self,
        pk: &Id64,
        currency: &str,
        amount: &Amount,
    ) -> Result<Vec<Utxo>> {
        let tag = currency_id(currency);
        let mut remaining = amount.clone();
        let mut selected = Vec::new();
        let mut reserved = Vec::new();

        for entry in self.store.iter_prefix(&pk_asset_prefix(pk, &tag)) {
            let (key, _) = entry?;
            let Some(root) = root_from_pk_key(&key) else {
                continue;
            };
            let utxo = match self.get_utxo(&root) {
                Ok(utxo) => utxo,
                Err(e) => {
                    debug!(root = %root, error = %e, "index entry without record");
                    continue;
                }
            };
            let Some(token) = utxo.asset.token.clone() else {
                continue;
            };
            if utxo.flag == 0 {
                remaining = remaining.checked_sub(&token.value).unwrap_or_default();
                selected.push(utxo);
            } else {
                reserved.push(utxo);
            }
            if remaining.is_zero() {
                break;
            }
        }

        if !remaining.is_zero() && !reserved.is_empty() {
            reserved.sort_by(|a, b| {
                let av = a.asset.token.as_ref().map(|t| &t.value);
                let bv = b.asset.token.as_ref().map(|t| &t.value);
                a.flag.cmp(&b.flag).then(av.cmp(&bv))
            });
            for utxo in reserved {
                let Some(token) = utxo.asset.token.clone() else {
                    continue;
                };
                remaining = remaining.checked_sub(&token.value).unwrap_or_default();
                selected.push(utxo);
                if remaining.is_zero() {
                    break;
                }
            }
        }

        if !remaining.is_zero() {
            return Err(Error::InsufficientFunds(format!(
                "{currency}: {remaining} short"
            )));
        }
        Ok(selected)
    }

    /// Assemble the unsigned parameter bundle: inputs with witnesses,
    /// requested outputs, fee, change and ticket passthrough. All
    /// selected nullifiers are marked tentatively spent.
    pub(crate) fn build_tx_param(
        &self,
        utxos: &[Utxo],
        account: &Account,
        receptions: &[Reception],
        gas: u64,
        gas_price: u64,
    ) -> Result<GenTxParam> {
        let roots: Vec<Id32> = utxos.iter().map(|u| u.root).collect();
        let witnesses = self.chain.get_anchor(&roots)?;
        if witnesses.len() != roots.len() {
            return Err(Error::Chain(format!(
                "anchor returned {} witnesses for {} roots",
                witnesses.len(),
                roots.len()
            )));
        }

        let mut ins: Vec<TxIn> = Vec::with_capacity(utxos.len());
        let mut amounts: HashMap<String, Amount> = HashMap::new();
        let mut tickets: HashMap<Id32, Id32> = HashMap::new();

        for (index, utxo) in utxos.iter().enumerate() {
            let Some(record) = self.get_root_record(&utxo.root)? else {
                // Reclaimed while we were selecting; the scanner's view
                // wins and the input is skipped.
                debug!(root = %utxo.root, "selected root no longer indexed");
                continue;
            };
            ins.push(TxIn {
                root: record.root,
                state: ChainOutState {
                    os: record.state.clone(),
                    num: record.num,
                    tx_hash: record.tx_hash,
                },
                witness: witnesses[index].clone(),
                skr: SubAddr::default(),
            });
            if let Some(token) = &record.asset.token {
                amounts
                    .entry(currency_name(&token.currency))
                    .or_default()
                    .add_assign(&token.value);
            }
            if let Some(ticket) = &record.asset.ticket {
                tickets.insert(ticket.value, ticket.category);
            }
        }

        let mut outs: Vec<TxOut> = Vec::new();
        for reception in receptions {
            let currency = reception.currency.to_ascii_uppercase();
            let covered = amounts
                .get(&currency)
                .map(|bucket| *bucket >= reception.value)
                .unwrap_or(false);
            if !covered {
                // Selection guarantees coverage; caller-supplied roots
                // that fall short surface at the fee check below.
                continue;
            }
            let target = if reception.addr.is_bare() {
                self.crypto
                    .derive_subaddress(&reception.addr.to_pk(), &Id32::from_index(1))
            } else {
                reception.addr
            };
            outs.push(TxOut::new(
                target,
                Asset::token(currency_id(&currency), reception.value.clone()),
            ));
            let bucket = amounts.get_mut(&currency).expect("covered bucket exists");
            *bucket = bucket
                .checked_sub(&reception.value)
                .expect("covered bucket suffices");
            if bucket.is_zero() {
                amounts.remove(&currency);
            }
        }

        let fee = fee_of(gas, gas_price);
        let funded = match amounts.get_mut(SERO_CURRENCY) {
            Some(bucket) => match bucket.checked_sub(&fee) {
                Some(rest) => {
                    *bucket = rest;
                    true
                }
                None => false,
            },
            None => fee.is_zero(),
        };
        if !funded {
            return Err(Error::InsufficientFunds("not enough".to_string()));
        }
        if amounts
            .get(SERO_CURRENCY)
            .map(Amount::is_zero)
            .unwrap_or(false)
        {
            amounts.remove(SERO_CURRENCY);
        }

        for (currency, value) in amounts {
            outs.push(TxOut::new(
                account.main_pkr,
                Asset::token(currency_id(&currency), value),
            ));
        }
        for (value, category) in tickets {
            outs.push(TxOut::new(account.main_pkr, Asset::ticket(category, value)));
        }

        let mut used = self.used.lock();
        for utxo in utxos {
            used.insert(utxo.nil);
        }

        Ok(GenTxParam {
            gas,
            gas_price: Amount::from_u64(gas_price),
            from: Kr {
                pkr: account.main_pkr,
                skr: SubAddr::default(),
            },
            ins,
            outs,
        })
    }

    /// Build, stamp with the unlocked spending key, and sign.
    pub(crate) fn sign_tx(
        &self,
        utxos: &[Utxo],
        account: &Account,
        receptions: &[Reception],
        gas: u64,
        gas_price: u64,
    ) -> Result<SignedTx> {
        let mut param = self.build_tx_param(utxos, account, receptions, gas, gas_price)?;

        let sk = account.unlock_sk(self.crypto.as_ref())?;
        let skr = SubAddr::bare(&sk);
        param.from.skr = skr;
        for input in &mut param.ins {
            input.skr = skr;
        }

        let mut signed = self.signer.gen_tx(&param)?;
        signed.hash = hash_stx(&signed.stx);
        Ok(signed)
    }
}
