//! Identity → wallet and resolved account names, persisted after every change.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::cache::store::KeyValueStore;
use crate::cache::{CacheError, CacheResult};
use crate::chain::types::ChainId;
use crate::observability::metrics;

/// Public addresses of a custodial wallet. Empty strings when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Wallet {
    /// Antelope public key used for account lookup.
    pub eos_address: String,
    pub sol_address: String,
    pub eth_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAccounts {
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// Everything cached for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,
    /// Keyed by chain id, stored alongside `wallet` in the same object.
    #[serde(flatten)]
    pub chains: BTreeMap<ChainId, ChainAccounts>,
}

/// Concurrent credential cache over a [`KeyValueStore`].
pub struct CredentialCache {
    entries: DashMap<String, IdentityEntry>,
    logged: Mutex<Option<String>>,
    identity_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    store: Arc<dyn KeyValueStore>,
    /// Serializes snapshot + write so later states never get overwritten by earlier ones.
    persist_lock: Mutex<()>,
    data_key: String,
    logged_key: String,
}

impl CredentialCache {
    /// Load the cache stored under `<prefix>.data` and `<prefix>.logged`.
    pub fn open(store: Arc<dyn KeyValueStore>, prefix: &str) -> CacheResult<Self> {
        let data_key = format!("{}.data", prefix);
        let logged_key = format!("{}.logged", prefix);

        let entries = DashMap::new();
        if let Some(raw) = store.get(&data_key)? {
            let snapshot: BTreeMap<String, IdentityEntry> = serde_json::from_str(&raw)?;
            for (identity, entry) in snapshot {
                entries.insert(identity, entry);
            }
        }
        let logged = store.get(&logged_key)?.filter(|s| !s.is_empty());

        metrics::record_cache_identities(entries.len());
        tracing::debug!(identities = entries.len(), logged = logged.is_some(), "Credential cache opened");

        Ok(Self {
            entries,
            logged: Mutex::new(logged),
            identity_locks: DashMap::new(),
            store,
            persist_lock: Mutex::new(()),
            data_key,
            logged_key,
        })
    }

    /// Exclusive per-identity section. Different identities never contend.
    pub async fn lock_identity(&self, identity: &str) -> OwnedMutexGuard<()> {
        self.prune_idle_locks(Some(identity));
        let lock = self
            .identity_locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop lock entries nobody holds or waits on. The table owns the only
    /// reference to an idle lock.
    fn prune_idle_locks(&self, keep: Option<&str>) {
        self.identity_locks
            .retain(|identity, lock| Some(identity.as_str()) == keep || Arc::strong_count(lock) > 1);
    }

    /// Number of identities with a lock entry.
    pub fn identity_lock_count(&self) -> usize {
        self.identity_locks.len()
    }

    pub fn wallet(&self, identity: &str) -> Option<Wallet> {
        self.entries.get(identity).and_then(|e| e.wallet.clone())
    }

    pub fn put_wallet(&self, identity: &str, wallet: Wallet) -> CacheResult<()> {
        self.entries.entry(identity.to_string()).or_default().wallet = Some(wallet);
        self.persist()
    }

    /// Cached account names for `identity` on `chain_id`, in insertion order.
    pub fn account_names(&self, identity: &str, chain_id: &ChainId) -> Vec<String> {
        self.entries
            .get(identity)
            .and_then(|e| e.chains.get(chain_id).map(|c| c.accounts.clone()))
            .unwrap_or_default()
    }

    /// Append `name` unless already present. Returns whether it was added.
    pub fn add_account_name(&self, identity: &str, chain_id: &ChainId, name: &str) -> CacheResult<bool> {
        let added = {
            let mut entry = self.entries.entry(identity.to_string()).or_default();
            let accounts = &mut entry.chains.entry(chain_id.clone()).or_default().accounts;
            if accounts.iter().any(|a| a == name) {
                false
            } else {
                accounts.push(name.to_string());
                true
            }
        };
        if added {
            self.persist()?;
        }
        Ok(added)
    }

    pub fn logged_identity(&self) -> Option<String> {
        self.logged.lock().ok().and_then(|l| l.clone())
    }

    pub fn set_logged(&self, identity: &str) -> CacheResult<()> {
        {
            let mut logged = self.logged.lock().map_err(|_| CacheError::Poisoned)?;
            *logged = Some(identity.to_string());
        }
        self.store.set(&self.logged_key, identity)
    }

    /// Drop every identity and the logged pointer, in memory and in the store.
    pub fn clear(&self) -> CacheResult<()> {
        let _guard = self.persist_lock.lock().map_err(|_| CacheError::Poisoned)?;
        self.entries.clear();
        {
            let mut logged = self.logged.lock().map_err(|_| CacheError::Poisoned)?;
            *logged = None;
        }
        self.prune_idle_locks(None);
        self.store.remove(&self.data_key)?;
        self.store.remove(&self.logged_key)?;
        metrics::record_cache_identities(0);
        Ok(())
    }

    pub fn identity_count(&self) -> usize {
        self.entries.len()
    }

    /// Ordered copy of the whole cache.
    pub fn snapshot(&self) -> BTreeMap<String, IdentityEntry> {
        self.entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    fn persist(&self) -> CacheResult<()> {
        let _guard = self.persist_lock.lock().map_err(|_| CacheError::Poisoned)?;
        let snapshot = self.snapshot();
        let raw = serde_json::to_string(&snapshot)?;
        self.store.set(&self.data_key, &raw)?;
        metrics::record_cache_identities(snapshot.len());
        Ok(())
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("data_key", &self.data_key)
            .field("identities", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use std::time::Duration;

    fn chain() -> ChainId {
        ChainId::from("aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906")
    }

    fn wallet() -> Wallet {
        Wallet {
            eos_address: "PUB_K1_6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5BoDq63".to_string(),
            ..Wallet::default()
        }
    }

    #[test]
    fn test_stored_layout() {
        let store = MemoryStore::new();
        let cache = CredentialCache::open(Arc::new(store.clone()), "custodial").unwrap();
        cache.put_wallet("a@example.com", wallet()).unwrap();
        cache.add_account_name("a@example.com", &chain(), "alice").unwrap();

        let raw = store.get("custodial.data").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &json["a@example.com"];
        assert_eq!(entry["wallet"]["eosAddress"], wallet().eos_address);
        assert_eq!(entry["wallet"]["solAddress"], "");
        assert_eq!(entry[chain().as_str()]["accounts"][0], "alice");
    }

    #[test]
    fn test_reopen_restores_state() {
        let store = MemoryStore::new();
        {
            let cache = CredentialCache::open(Arc::new(store.clone()), "custodial").unwrap();
            cache.put_wallet("a@example.com", wallet()).unwrap();
            cache.add_account_name("a@example.com", &chain(), "alice").unwrap();
            cache.set_logged("a@example.com").unwrap();
        }
        let cache = CredentialCache::open(Arc::new(store), "custodial").unwrap();
        assert_eq!(cache.wallet("a@example.com"), Some(wallet()));
        assert_eq!(cache.account_names("a@example.com", &chain()), vec!["alice"]);
        assert_eq!(cache.logged_identity().as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_account_names_deduplicated() {
        let cache = CredentialCache::open(Arc::new(MemoryStore::new()), "custodial").unwrap();
        assert!(cache.add_account_name("id", &chain(), "alice").unwrap());
        assert!(cache.add_account_name("id", &chain(), "bob").unwrap());
        assert!(!cache.add_account_name("id", &chain(), "alice").unwrap());
        assert_eq!(cache.account_names("id", &chain()), vec!["alice", "bob"]);
        assert!(cache.account_names("id", &ChainId::from("other")).is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = MemoryStore::new();
        let cache = CredentialCache::open(Arc::new(store.clone()), "custodial").unwrap();
        cache.put_wallet("id", wallet()).unwrap();
        cache.set_logged("id").unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.identity_count(), 0);
        assert!(cache.logged_identity().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_idle_identity_locks_are_pruned() {
        let cache = CredentialCache::open(Arc::new(MemoryStore::new()), "custodial").unwrap();
        for i in 0..5 {
            let _guard = cache.lock_identity(&format!("user{}@example.com", i)).await;
        }
        // Only the most recently requested entry survives
        assert_eq!(cache.identity_lock_count(), 1);

        let held = cache.lock_identity("held@example.com").await;
        drop(cache.lock_identity("other@example.com").await);
        assert_eq!(cache.identity_lock_count(), 2);

        cache.clear().unwrap();
        assert_eq!(cache.identity_lock_count(), 1);
        drop(held);
        cache.clear().unwrap();
        assert_eq!(cache.identity_lock_count(), 0);
    }

    #[test]
    fn test_corrupt_data_is_an_error() {
        let store = MemoryStore::new();
        store.set("custodial.data", "{oops").unwrap();
        assert!(matches!(
            CredentialCache::open(Arc::new(store), "custodial"),
            Err(CacheError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_lock_is_per_identity() {
        let cache = Arc::new(CredentialCache::open(Arc::new(MemoryStore::new()), "custodial").unwrap());
        let _held = cache.lock_identity("a").await;

        // A different identity is not blocked
        tokio::time::timeout(Duration::from_millis(100), cache.lock_identity("b"))
            .await
            .unwrap();

        // The same identity is
        let blocked = tokio::time::timeout(Duration::from_millis(50), cache.lock_identity("a")).await;
        assert!(blocked.is_err());
    }
}
