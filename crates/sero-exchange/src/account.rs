//! Account registry: live accounts, their key material and subaddresses.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sero_wallet_core::{CryptoProvider, Id32, Id64, SubAddr};
use tracing::info;

use crate::error::{Error, Result};
use crate::traits::WalletBackend;

/// The reserved index of an account's main subaddress.
pub const MAIN_PKR_INDEX: u64 = 1;

/// The lowest index issuable to external callers; everything below is
/// reserved.
pub const MIN_EXTERNAL_INDEX: u64 = 100;

/// A managed account: key material plus the derived main subaddress.
pub struct Account {
    wallet: Arc<dyn WalletBackend>,
    /// Account public key; accounts are identified uniquely by it.
    pub pk: Id64,
    /// Viewing key.
    pub tk: Id64,
    /// Viewing key in subaddress form, used for trial decryption.
    pub skr: SubAddr,
    /// Main subaddress, fixed at index 1.
    pub main_pkr: SubAddr,
    sk: Mutex<Option<Id64>>,
}

impl Account {
    fn new(
        wallet: Arc<dyn WalletBackend>,
        pk: Id64,
        tk: Id64,
        crypto: &dyn CryptoProvider,
    ) -> Self {
        let main_pkr = crypto.derive_subaddress(&pk, &Id32::from_index(MAIN_PKR_INDEX));
        Self {
            wallet,
            pk,
            tk,
            skr: SubAddr::bare(&tk),
            main_pkr,
            sk: Mutex::new(None),
        }
    }

    /// The spending key, lazily unlocked from the wallet seed on first
    /// use and cached for the lifetime of the account.
    pub fn unlock_sk(&self, crypto: &dyn CryptoProvider) -> Result<Id64> {
        let mut slot = self.sk.lock();
        if let Some(sk) = *slot {
            return Ok(sk);
        }
        let seed = self.wallet.seed()?;
        let sk = crypto.seed_to_sk(&seed);
        *slot = Some(sk);
        Ok(sk)
    }
}

/// Tracks live accounts and answers ownership queries.
///
/// Mutation is serialized by the write lock; the ownership test is
/// linear in the number of accounts, which stays small in practice.
pub struct AccountRegistry {
    accounts: RwLock<HashMap<Id64, Arc<Account>>>,
    crypto: Arc<dyn CryptoProvider>,
}

impl AccountRegistry {
    /// An empty registry.
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            crypto,
        }
    }

    /// Register the wallet's account and return it. Returns the existing
    /// entry when the account is already registered.
    pub fn register(&self, wallet: Arc<dyn WalletBackend>) -> Option<Arc<Account>> {
        let meta = wallet.accounts().into_iter().next()?;
        let mut accounts = self.accounts.write();
        if let Some(existing) = accounts.get(&meta.pk) {
            return Some(Arc::clone(existing));
        }
        let account = Arc::new(Account::new(wallet, meta.pk, meta.tk, self.crypto.as_ref()));
        info!(pk = %account.pk, "account registered");
        accounts.insert(meta.pk, Arc::clone(&account));
        Some(account)
    }

    /// Remove an account. Indexed UTXOs are retained for archival
    /// queries.
    pub fn forget(&self, pk: &Id64) -> bool {
        let removed = self.accounts.write().remove(pk).is_some();
        if removed {
            info!(pk = %pk, "account dropped");
        }
        removed
    }

    /// Look up an account by public key.
    pub fn get(&self, pk: &Id64) -> Option<Arc<Account>> {
        self.accounts.read().get(pk).cloned()
    }

    /// Every registered account.
    pub fn all(&self) -> Vec<Arc<Account>> {
        self.accounts.read().values().cloned().collect()
    }

    /// The account owning `addr`, if any. Viewing keys are disjoint, so
    /// at most one account matches.
    pub fn is_mine(&self, addr: &SubAddr) -> Option<Arc<Account>> {
        let accounts = self.accounts.read();
        accounts
            .values()
            .find(|account| self.crypto.is_my_address(&account.tk, addr))
            .cloned()
    }

    /// Derive the subaddress of `pk` at `index`. Indexes below
    /// [`MIN_EXTERNAL_INDEX`] are reserved (the main subaddress sits at
    /// index 1).
    pub fn derive_subaddress(&self, pk: &Id64, index: u64) -> Result<SubAddr> {
        if index < MIN_EXTERNAL_INDEX {
            return Err(Error::IndexTooLow(index));
        }
        if self.get(pk).is_none() {
            return Err(Error::UnknownAccount(pk.to_string()));
        }
        Ok(self
            .crypto
            .derive_subaddress(pk, &Id32::from_index(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sero_wallet_core::{Seed, SoftwareCrypto};
    use crate::traits::WalletAccount;

    struct TestWallet {
        seed: [u8; 32],
    }

    impl WalletBackend for TestWallet {
        fn accounts(&self) -> Vec<WalletAccount> {
            let crypto = SoftwareCrypto;
            let sk = crypto.seed_to_sk(&Seed::new(self.seed));
            let tk = crypto.sk_to_tk(&sk);
            vec![WalletAccount {
                pk: crypto.tk_to_pk(&tk),
                tk,
            }]
        }

        fn seed(&self) -> Result<Seed> {
            Ok(Seed::new(self.seed))
        }
    }

    fn registry() -> AccountRegistry {
        AccountRegistry::new(Arc::new(SoftwareCrypto))
    }

    #[test]
    fn test_register_and_ownership() {
        let reg = registry();
        let account = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();

        assert!(reg.get(&account.pk).is_some());
        assert!(reg.is_mine(&account.main_pkr).is_some());
        assert!(reg.is_mine(&SubAddr::bare(&account.pk)).is_some());
        assert!(reg.is_mine(&SubAddr::bare(&Id64([9u8; 64]))).is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let reg = registry();
        let a = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();
        let b = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();
        assert_eq!(a.pk, b.pk);
        assert_eq!(reg.all().len(), 1);
    }

    #[test]
    fn test_forget_removes_account() {
        let reg = registry();
        let account = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();
        assert!(reg.forget(&account.pk));
        assert!(!reg.forget(&account.pk));
        assert!(reg.get(&account.pk).is_none());
    }

    #[test]
    fn test_derive_subaddress_guards() {
        let reg = registry();
        let account = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();

        match reg.derive_subaddress(&account.pk, 99) {
            Err(Error::IndexTooLow(99)) => {}
            other => panic!("expected IndexTooLow, got {other:?}"),
        }
        match reg.derive_subaddress(&Id64([9u8; 64]), 100) {
            Err(Error::UnknownAccount(_)) => {}
            other => panic!("expected UnknownAccount, got {other:?}"),
        }

        let sub = reg.derive_subaddress(&account.pk, 100).unwrap();
        assert!(!sub.is_bare());
        assert!(reg.is_mine(&sub).is_some());
        assert_ne!(sub, account.main_pkr);
    }

    #[test]
    fn test_unlock_sk_is_cached() {
        let reg = registry();
        let account = reg.register(Arc::new(TestWallet { seed: [1u8; 32] })).unwrap();
        let crypto = SoftwareCrypto;
        let a = account.unlock_sk(&crypto).unwrap();
        let b = account.unlock_sk(&crypto).unwrap();
        assert_eq!(a, b);
        assert_eq!(crypto.sk_to_tk(&a), account.tk);
    }
}
