//! Identity → canonical account name.
//!
//! # States
//! ```text
//! Uncached → CacheHit
//! Uncached → QueryPending → Found
//! Uncached → QueryPending → NotFound → CreatePending → Created
//! QueryPending | CreatePending → Failed
//! ```
//!
//! The whole resolution for one identity runs under that identity's cache
//! lock, so concurrent callers never create two accounts for the same key.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::accounts::creation::{AccountCreator, CreationError};
use crate::accounts::lookup::{LookupError, LookupResult, RetryingLookup};
use crate::cache::{CacheError, CredentialCache};
use crate::chain::name::Name;
use crate::chain::types::ChainId;
use crate::observability::metrics;

/// Source of the accounts a public key controls.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Unique account names in response order. Empty when none exist.
    async fn accounts_for_key(&self, public_key: &str) -> LookupResult<Vec<String>>;
}

/// [`RetryingLookup`] bound to a fixed endpoint list.
#[derive(Debug, Clone)]
pub struct EndpointLookup {
    lookup: RetryingLookup,
    endpoints: Vec<String>,
}

impl EndpointLookup {
    pub fn new(lookup: RetryingLookup, endpoints: Vec<String>) -> Self {
        Self { lookup, endpoints }
    }
}

#[async_trait]
impl AccountLookup for EndpointLookup {
    async fn accounts_for_key(&self, public_key: &str) -> LookupResult<Vec<String>> {
        let response = self.lookup.accounts_for_key(&self.endpoints, public_key).await?;
        Ok(response.unique_account_names())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no identity to resolve")]
    NoIdentity,

    #[error("wallet for '{0}' has no public key")]
    NoPublicKey(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("account creation failed: {0}")]
    AccountCreationFailed(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<CreationError> for ResolveError {
    fn from(e: CreationError) -> Self {
        ResolveError::AccountCreationFailed(e.to_string())
    }
}

/// How an account name was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    CacheHit(String),
    Found(String),
    Created(String),
}

impl Resolution {
    pub fn account_name(&self) -> &str {
        match self {
            Resolution::CacheHit(name) | Resolution::Found(name) | Resolution::Created(name) => name,
        }
    }

    pub fn into_account_name(self) -> String {
        match self {
            Resolution::CacheHit(name) | Resolution::Found(name) | Resolution::Created(name) => name,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Resolution::CacheHit(_) => "cache_hit",
            Resolution::Found(_) => "found",
            Resolution::Created(_) => "created",
        }
    }
}

#[derive(Clone)]
pub struct AccountResolver {
    cache: Arc<CredentialCache>,
    lookup: Arc<dyn AccountLookup>,
    creator: Arc<dyn AccountCreator>,
    chain_id: ChainId,
}

impl AccountResolver {
    pub fn new(
        cache: Arc<CredentialCache>,
        lookup: Arc<dyn AccountLookup>,
        creator: Arc<dyn AccountCreator>,
        chain_id: ChainId,
    ) -> Self {
        Self {
            cache,
            lookup,
            creator,
            chain_id,
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub async fn resolve(&self, identity: &str) -> Result<Resolution, ResolveError> {
        if identity.is_empty() {
            return Err(ResolveError::NoIdentity);
        }

        let _guard = self.cache.lock_identity(identity).await;
        let result = self.resolve_locked(identity).await;
        match &result {
            Ok(resolution) => {
                metrics::record_resolution(resolution.outcome());
                tracing::info!(
                    identity = %identity,
                    account = %resolution.account_name(),
                    outcome = resolution.outcome(),
                    "Account resolved"
                );
            }
            Err(e) => {
                metrics::record_resolution("failed");
                tracing::warn!(identity = %identity, error = %e, "Account resolution failed");
            }
        }
        result
    }

    async fn resolve_locked(&self, identity: &str) -> Result<Resolution, ResolveError> {
        if let Some(first) = self.cache.account_names(identity, &self.chain_id).into_iter().next() {
            return Ok(Resolution::CacheHit(first));
        }

        let public_key = self
            .cache
            .wallet(identity)
            .map(|w| w.eos_address)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ResolveError::NoPublicKey(identity.to_string()))?;

        let accounts = self.lookup.accounts_for_key(&public_key).await?;
        let resolution = match accounts.into_iter().next() {
            Some(existing) => Resolution::Found(existing),
            None => {
                tracing::info!(identity = %identity, "No account controlled by key, creating one");
                let created = self.creator.create_account(&public_key).await?;
                if created.parse::<Name>().is_err() {
                    return Err(ResolveError::AccountCreationFailed(format!(
                        "service returned invalid account name '{}'",
                        created
                    )));
                }
                Resolution::Created(created)
            }
        };

        self.cache
            .add_account_name(identity, &self.chain_id, resolution.account_name())?;
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, Wallet};
    use crate::test_support::{FakeCreator, FakeLookup};

    const IDENTITY: &str = "user@example.com";
    const KEY: &str = "PUB_K1_6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5BoDq63";

    fn chain() -> ChainId {
        ChainId::from("aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906")
    }

    fn cache_with_wallet(store: &MemoryStore) -> Arc<CredentialCache> {
        let cache = CredentialCache::open(Arc::new(store.clone()), "custodial").unwrap();
        cache
            .put_wallet(
                IDENTITY,
                Wallet {
                    eos_address: KEY.to_string(),
                    ..Wallet::default()
                },
            )
            .unwrap();
        Arc::new(cache)
    }

    fn resolver(cache: Arc<CredentialCache>, lookup: Arc<FakeLookup>, creator: Arc<FakeCreator>) -> AccountResolver {
        AccountResolver::new(cache, lookup, creator, chain())
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_calls() {
        let cache = cache_with_wallet(&MemoryStore::new());
        cache.add_account_name(IDENTITY, &chain(), "alice").unwrap();
        cache.add_account_name(IDENTITY, &chain(), "bob").unwrap();
        let lookup = Arc::new(FakeLookup::returning(vec!["zed"]));
        let creator = Arc::new(FakeCreator::returning("carol"));

        let resolution = resolver(cache, lookup.clone(), creator.clone())
            .resolve(IDENTITY)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::CacheHit("alice".to_string()));
        assert_eq!(lookup.calls(), 0);
        assert_eq!(creator.calls(), 0);
    }

    #[tokio::test]
    async fn test_found_account_is_cached() {
        let cache = cache_with_wallet(&MemoryStore::new());
        let lookup = Arc::new(FakeLookup::returning(vec!["alice", "bob"]));
        let creator = Arc::new(FakeCreator::returning("carol"));
        let resolver = resolver(cache.clone(), lookup.clone(), creator.clone());

        assert_eq!(resolver.resolve(IDENTITY).await.unwrap(), Resolution::Found("alice".to_string()));
        assert_eq!(cache.account_names(IDENTITY, &chain()), vec!["alice"]);
        assert_eq!(lookup.last_key().as_deref(), Some(KEY));
        assert_eq!(creator.calls(), 0);

        // Second call is served from cache
        assert_eq!(resolver.resolve(IDENTITY).await.unwrap(), Resolution::CacheHit("alice".to_string()));
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_creates_exactly_once_when_not_found() {
        let cache = cache_with_wallet(&MemoryStore::new());
        let lookup = Arc::new(FakeLookup::returning(Vec::new()));
        let creator = Arc::new(FakeCreator::returning("newaccount12"));
        let resolver = resolver(cache.clone(), lookup, creator.clone());

        let (a, b) = tokio::join!(resolver.resolve(IDENTITY), resolver.resolve(IDENTITY));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|r| matches!(r, Resolution::CacheHit(_)));

        assert_eq!(outcomes[0], Resolution::Created("newaccount12".to_string()));
        assert_eq!(outcomes[1], Resolution::CacheHit("newaccount12".to_string()));
        assert_eq!(creator.calls(), 1);
        assert_eq!(creator.last_key().as_deref(), Some(KEY));
        assert_eq!(cache.account_names(IDENTITY, &chain()), vec!["newaccount12"]);
    }

    #[tokio::test]
    async fn test_lookup_failure_never_creates() {
        let cache = cache_with_wallet(&MemoryStore::new());
        let lookup = Arc::new(FakeLookup::failing());
        let creator = Arc::new(FakeCreator::returning("carol"));

        let err = resolver(cache.clone(), lookup, creator.clone())
            .resolve(IDENTITY)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Lookup(LookupError::AllEndpointsExhausted { .. })));
        assert_eq!(creator.calls(), 0);
        assert!(cache.account_names(IDENTITY, &chain()).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_created_name_rejected() {
        let cache = cache_with_wallet(&MemoryStore::new());
        let lookup = Arc::new(FakeLookup::returning(Vec::new()));
        let creator = Arc::new(FakeCreator::returning("Not.Valid!"));

        let err = resolver(cache.clone(), lookup, creator).resolve(IDENTITY).await.unwrap_err();
        assert!(matches!(err, ResolveError::AccountCreationFailed(_)));
        assert!(cache.account_names(IDENTITY, &chain()).is_empty());
    }

    #[tokio::test]
    async fn test_creation_failure() {
        let cache = cache_with_wallet(&MemoryStore::new());
        let lookup = Arc::new(FakeLookup::returning(Vec::new()));
        let creator = Arc::new(FakeCreator::failing());

        let err = resolver(cache, lookup, creator).resolve(IDENTITY).await.unwrap_err();
        assert!(matches!(err, ResolveError::AccountCreationFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_identity_or_key() {
        let cache = Arc::new(CredentialCache::open(Arc::new(MemoryStore::new()), "custodial").unwrap());
        let lookup = Arc::new(FakeLookup::returning(vec!["alice"]));
        let creator = Arc::new(FakeCreator::returning("carol"));
        let resolver = resolver(cache.clone(), lookup.clone(), creator);

        assert!(matches!(resolver.resolve("").await, Err(ResolveError::NoIdentity)));
        assert!(matches!(resolver.resolve(IDENTITY).await, Err(ResolveError::NoPublicKey(_))));

        cache.put_wallet(IDENTITY, Wallet::default()).unwrap();
        assert!(matches!(resolver.resolve(IDENTITY).await, Err(ResolveError::NoPublicKey(_))));
        assert_eq!(lookup.calls(), 0);
    }
}
