//! The exchange facade: injected handles, shared state, background jobs
//! and the balance/history query surface.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use borsh::BorshDeserialize;
use parking_lot::Mutex;
use sero_storage_kv::{
    decode_number, nil_key, num_from_pkr_key, num_key, pk_prefix, pkr_key, pkr_prefix,
    root_from_pk_key, root_key, KvStore,
};
use sero_wallet_core::{
    currency_name, Amount, Balances, CryptoProvider, Id32, Id64, RootRecord, SubAddr, Utxo,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::account::AccountRegistry;
use crate::config::ExchangeConfig;
use crate::error::{Error, Result};
use crate::traits::{ChainIndex, ChainReader, Signer, TxPool, WalletBackend, WalletEvent};

/// Cached balance snapshot of a non-main subaddress.
#[derive(Default, Clone)]
pub(crate) struct PkrBalances {
    pub(crate) balances: Balances,
    pub(crate) last_num: u64,
}

/// The wallet-side ledger scanner and transaction builder.
pub struct Exchange {
    pub(crate) store: KvStore,
    pub(crate) chain: Arc<dyn ChainReader>,
    pub(crate) chain_index: Arc<dyn ChainIndex>,
    pub(crate) signer: Arc<dyn Signer>,
    pub(crate) pool: Arc<dyn TxPool>,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
    pub(crate) registry: AccountRegistry,
    pub(crate) config: ExchangeConfig,

    /// In-memory mirror of the persisted scan cursors.
    pub(crate) numbers: Mutex<HashMap<Id64, u64>>,
    /// Nullifiers tentatively spent by built transactions. Advisory: it
    /// biases selection away from double-use, nothing more.
    pub(crate) used: Mutex<HashSet<Id32>>,
    /// Per-subaddress balance cache for non-main subaddresses.
    pub(crate) pkr_cache: Mutex<HashMap<SubAddr, PkrBalances>>,
    /// Single-flight guard for subaddress balance recomputation.
    pub(crate) inits: Mutex<HashSet<SubAddr>>,
    /// Single-flight guard for per-account merge sweeps.
    pub(crate) merging: Mutex<HashSet<Id64>>,

    pub(crate) scan_running: AtomicBool,
    pub(crate) merge_running: AtomicBool,
}

impl Exchange {
    /// Assemble an exchange over injected handles and register the
    /// initially open wallets.
    pub fn new(
        store: KvStore,
        chain: Arc<dyn ChainReader>,
        chain_index: Arc<dyn ChainIndex>,
        signer: Arc<dyn Signer>,
        pool: Arc<dyn TxPool>,
        crypto: Arc<dyn CryptoProvider>,
        wallets: Vec<Arc<dyn WalletBackend>>,
        config: ExchangeConfig,
    ) -> Result<Arc<Self>> {
        let exchange = Arc::new(Self {
            store,
            chain,
            chain_index,
            signer,
            pool,
            crypto: Arc::clone(&crypto),
            registry: AccountRegistry::new(crypto),
            config,
            numbers: Mutex::new(HashMap::new()),
            used: Mutex::new(HashSet::new()),
            pkr_cache: Mutex::new(HashMap::new()),
            inits: Mutex::new(HashSet::new()),
            merging: Mutex::new(HashSet::new()),
            scan_running: AtomicBool::new(false),
            merge_running: AtomicBool::new(false),
        });
        for wallet in wallets {
            exchange.register_wallet(wallet)?;
        }
        info!("exchange initialized");
        Ok(exchange)
    }

    /// Registry accessor.
    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Register a wallet's account and seed its scan cursor: from the
    /// persisted `NUM` entry when one exists, otherwise from block 1.
    pub fn register_wallet(&self, wallet: Arc<dyn WalletBackend>) -> Result<()> {
        let Some(account) = self.registry.register(wallet) else {
            warn!("wallet exposes no accounts");
            return Ok(());
        };
        let cursor = match self.store.get(&num_key(&account.pk))? {
            Some(raw) => decode_number(&raw)
                .ok_or_else(|| Error::codec("scan cursor is not a be_u64"))?,
            None => 1,
        };
        self.numbers.lock().entry(account.pk).or_insert(cursor);
        Ok(())
    }

    /// Apply a wallet lifecycle event.
    pub fn handle_wallet_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::Arrived(wallet) => {
                if let Err(e) = self.register_wallet(wallet) {
                    warn!(error = %e, "wallet registration failed");
                }
            }
            WalletEvent::Dropped(pk) => {
                self.registry.forget(&pk);
                self.numbers.lock().remove(&pk);
                if let Err(e) = self.store.delete(&num_key(&pk)) {
                    warn!(pk = %pk, error = %e, "cursor cleanup failed");
                }
            }
        }
    }

    /// Spawn the background jobs: the block scanner, the merge sweep and
    /// the wallet-event handler. Returns a handle that stops them.
    ///
    /// Each loop watches the handle's stop channel; a tick that is
    /// already running finishes its batch before the loop exits. If the
    /// handle is dropped without [`ExchangeHandle::shutdown`], the
    /// channel closes and the loops stop on their own.
    pub fn start(self: Arc<Self>, mut events: mpsc::Receiver<WalletEvent>) -> ExchangeHandle {
        let (stop, _) = watch::channel(false);
        let mut tasks = Vec::new();

        {
            let exchange = Arc::clone(&self);
            let mut stop = stop.subscribe();
            let interval = self.config.scan_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    let exchange = Arc::clone(&exchange);
                    if tokio::task::spawn_blocking(move || exchange.scan_tick())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }

        if self.config.auto_merge {
            let exchange = Arc::clone(&self);
            let mut stop = stop.subscribe();
            let interval = self.config.merge_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    let exchange = Arc::clone(&exchange);
                    if tokio::task::spawn_blocking(move || exchange.merge_tick())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }

        {
            let exchange = Arc::clone(&self);
            let mut stop = stop.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        event = events.recv() => match event {
                            Some(event) => exchange.handle_wallet_event(event),
                            None => break,
                        }
                    }
                }
            }));
        }

        ExchangeHandle { stop, tasks }
    }

    /// Issue the subaddress of `pk` at `index` (`index >= 100`; the main
    /// subaddress at index 1 is reserved).
    pub fn get_pkr(&self, pk: &Id64, index: u64) -> Result<SubAddr> {
        self.registry.derive_subaddress(pk, index)
    }

    /// Per-currency balances of a subaddress.
    ///
    /// For an account's main subaddress (or its bare public key) the
    /// index is authoritative: every live `PK` entry of the account is
    /// summed, reserved or not. For any other subaddress of a managed
    /// account, a cached per-subaddress snapshot is refreshed on demand
    /// under a single-flight guard. Unknown subaddresses yield nothing.
    pub fn get_balances(&self, pkr: &SubAddr) -> Balances {
        let account = if pkr.is_bare() {
            self.registry.get(&pkr.to_pk())
        } else {
            self.registry.is_mine(pkr)
        };
        let Some(account) = account else {
            return Balances::new();
        };

        if pkr.is_bare() || *pkr == account.main_pkr {
            return self.account_balances(&account.pk);
        }

        let begin_init = self.inits.lock().insert(*pkr);
        if begin_init {
            if let Err(e) = self.init_pkr_account(pkr) {
                warn!(pkr = %pkr, error = %e, "subaddress balance refresh failed");
            }
            self.inits.lock().remove(pkr);
        }
        self.pkr_cache
            .lock()
            .get(pkr)
            .map(|cached| cached.balances.clone())
            .unwrap_or_default()
    }

    /// Authoritative per-currency sums over an account's `PK` index.
    fn account_balances(&self, pk: &Id64) -> Balances {
        let mut balances = Balances::new();
        for entry in self.store.iter_prefix(&pk_prefix(pk)) {
            let key = match entry {
                Ok((key, _)) => key,
                Err(e) => {
                    warn!(error = %e, "balance scan aborted");
                    break;
                }
            };
            let Some(root) = root_from_pk_key(&key) else {
                continue;
            };
            match self.get_utxo(&root) {
                Ok(utxo) => {
                    if let Some(token) = utxo.asset.token {
                        balances
                            .entry(currency_name(&token.currency))
                            .or_default()
                            .add_assign(&token.value);
                    }
                }
                Err(e) => debug!(root = %root, error = %e, "dangling index entry"),
            }
        }
        balances
    }

    /// Transaction history of a subaddress over the block range
    /// `[begin, end]`, in non-decreasing block order. Empty when the
    /// subaddress belongs to no managed account.
    pub fn get_records(&self, pkr: &SubAddr, begin: u64, end: u64) -> Result<Vec<Utxo>> {
        let mut records = Vec::new();
        if self.registry.is_mine(pkr).is_some() {
            self.iterate_utxos(pkr, begin, end, |utxo| records.push(utxo))?;
        }
        Ok(records)
    }

    /// Refresh the cached balance snapshot of a non-main subaddress from
    /// the blocks indexed since the last refresh.
    ///
    /// Outputs whose nullifier alias is already gone (spent before the
    /// refresh saw them) are skipped; outputs spent after they entered
    /// the snapshot stay counted until the account-level query is used.
    fn init_pkr_account(&self, pkr: &SubAddr) -> Result<()> {
        if self.registry.is_mine(pkr).is_none() {
            return Ok(());
        }
        let mut snapshot = self
            .pkr_cache
            .lock()
            .get(pkr)
            .cloned()
            .unwrap_or_default();

        let mut last = snapshot.last_num;
        let mut store_failure = None;
        self.iterate_utxos(pkr, snapshot.last_num + 1, u64::MAX, |utxo| {
            let live = match self.store.get(&nil_key(&utxo.nil)) {
                Ok(alias) => alias.is_some(),
                Err(e) => {
                    store_failure = Some(e);
                    false
                }
            };
            if !live {
                return;
            }
            if let Some(token) = utxo.asset.token {
                snapshot
                    .balances
                    .entry(currency_name(&token.currency))
                    .or_default()
                    .add_assign(&token.value);
                last = last.max(utxo.num);
            }
        })?;
        if let Some(e) = store_failure {
            return Err(e.into());
        }
        snapshot.last_num = last;
        self.pkr_cache.lock().insert(*pkr, snapshot);
        Ok(())
    }

    /// Walk the `PKR` history index of `pkr` over `[begin, end]`.
    pub(crate) fn iterate_utxos(
        &self,
        pkr: &SubAddr,
        begin: u64,
        end: u64,
        mut handle: impl FnMut(Utxo),
    ) -> Result<()> {
        let prefix = pkr_prefix(pkr);
        let start = pkr_key(pkr, begin);
        for entry in self.store.seek(&prefix, &start) {
            let (key, value) = entry?;
            let Some(num) = num_from_pkr_key(&key) else {
                continue;
            };
            if num > end {
                break;
            }
            let roots = Vec::<Id32>::try_from_slice(&value)
                .map_err(|e| Error::codec(format!("roots list at block {num}: {e}")))?;
            for root in roots {
                match self.get_utxo(&root) {
                    Ok(utxo) => handle(utxo),
                    Err(e) => debug!(root = %root, error = %e, "dangling history root"),
                }
            }
        }
        Ok(())
    }

    /// Load a UTXO by root and stamp its reserved-spent flag.
    pub(crate) fn get_utxo(&self, root: &Id32) -> Result<Utxo> {
        let raw = self
            .store
            .get(&root_key(root))?
            .ok_or_else(|| Error::NotFound(format!("root {root}")))?;
        let record = RootRecord::try_from_slice(&raw)
            .map_err(|e| Error::codec(format!("root record {root}: {e}")))?;
        let flag = u8::from(self.used.lock().contains(&record.nil));
        Ok(record.to_utxo(flag))
    }

    /// The persisted record behind a root, if the scanner has indexed it.
    pub(crate) fn get_root_record(&self, root: &Id32) -> Result<Option<RootRecord>> {
        match self.store.get(&root_key(root))? {
            Some(raw) => {
                let record = RootRecord::try_from_slice(&raw)
                    .map_err(|e| Error::codec(format!("root record {root}: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Currency-keyed sum of a slice of UTXOs (fungible parts only).
    pub(crate) fn sum_token(utxos: &[Utxo]) -> Amount {
        let mut total = Amount::zero();
        for utxo in utxos {
            if let Some(token) = &utxo.asset.token {
                total.add_assign(&token.value);
            }
        }
        total
    }
}

/// RAII reset for a job's in-progress flag, so a panicking tick cannot
/// wedge the schedule.
pub(crate) struct JobGuard<'a>(pub(crate) &'a AtomicBool);

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, std::sync::atomic::Ordering::Release);
    }
}

/// Handle over the running background jobs.
///
/// Owns the stop channel the job loops watch. Dropping the handle
/// closes the channel and the loops exit on their own; [`shutdown`]
/// additionally waits for in-flight ticks to finish.
///
/// [`shutdown`]: ExchangeHandle::shutdown
pub struct ExchangeHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ExchangeHandle {
    /// Signal the stop channel and wait for the job loops to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("exchange background jobs stopped");
    }
}
