//! Pipeline façade: build, sign, pack and optionally broadcast.
//!
//! # Data Flow
//! ```text
//! actions + SignOptions
//!     → TransactionBuilder (chain info, ABIs, encoding)
//!     → RemoteSigner (one prompt, cancellable through SignOptions::cancel)
//!     → PackedTransaction
//!     → Broadcaster (skipped when broadcast = false)
//!     → PushResult
//!
//! login
//!     → RemoteSigner::login → credential cache (logged identity, wallet)
//!     → AccountResolver → SessionUser
//! ```
//!
//! # Design Decisions
//! - All session state is owned here; nothing is global
//! - Nothing touches the cache until a signature exists
//! - Each operation runs inside its own request-id span

pub mod error;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::accounts::{
    AccountCreator, AccountLookup, AccountResolver, EndpointLookup, Resolution, RetryingLookup,
};
use crate::cache::CredentialCache;
use crate::chain::client::ChainApi;
use crate::chain::packer::{Broadcaster, PackedTransaction, PushResult};
use crate::chain::transaction::{Action, TransactionBuilder, TransactionOverrides};
use crate::chain::types::ChainId;
use crate::config::PipelineConfig;
use crate::observability::metrics;
use crate::observability::spans::request_span;
use crate::resilience::RetryPolicy;
use crate::signer::{RemoteSigner, SignOutcome, SigningEnvelope};

pub use error::{ErrorKind, PipelineError, PipelineResult, TRANSACTION_CANCELED_KEY};

/// Permission every custodial session signs with.
pub const SESSION_PERMISSION: &str = "active";

/// A logged-in user bound to an account on the configured chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub account_name: String,
    pub permission: String,
    pub public_key: String,
    pub chain_id: ChainId,
}

/// Per-call options for [`Pipeline::sign_and_maybe_broadcast`].
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Submit to the chain after signing.
    pub broadcast: bool,
    /// Reason shown by the signer; the configured default when `None`.
    pub reason: Option<String>,
    pub overrides: TransactionOverrides,
    /// Cancels this call's pending signature only. Keep a clone to cancel.
    pub cancel: CancellationToken,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            broadcast: true,
            reason: None,
            overrides: TransactionOverrides::default(),
            cancel: CancellationToken::new(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    chain_id: ChainId,
    builder: TransactionBuilder,
    broadcaster: Broadcaster,
    cache: Arc<CredentialCache>,
    resolver: AccountResolver,
    signer: RwLock<Option<Arc<dyn RemoteSigner>>>,
}

impl Pipeline {
    /// Lookups go to `config.chain`'s lookup endpoints with `config.lookup`'s policy.
    pub fn new(
        config: PipelineConfig,
        chain: Arc<dyn ChainApi>,
        cache: Arc<CredentialCache>,
        creator: Arc<dyn AccountCreator>,
    ) -> Self {
        let lookup = EndpointLookup::new(
            RetryingLookup::new(RetryPolicy::from(&config.lookup)),
            config.chain.lookup_endpoints(),
        );
        Self::with_lookup(config, chain, cache, Arc::new(lookup), creator)
    }

    pub fn with_lookup(
        config: PipelineConfig,
        chain: Arc<dyn ChainApi>,
        cache: Arc<CredentialCache>,
        lookup: Arc<dyn AccountLookup>,
        creator: Arc<dyn AccountCreator>,
    ) -> Self {
        let chain_id = ChainId::from(config.chain.chain_id.as_str());
        Self {
            builder: TransactionBuilder::new(chain.clone(), config.chain.expiration_secs),
            broadcaster: Broadcaster::new(chain),
            resolver: AccountResolver::new(cache.clone(), lookup, creator, chain_id.clone()),
            cache,
            chain_id,
            config,
            signer: RwLock::new(None),
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn establish_signer(&self, signer: Arc<dyn RemoteSigner>) {
        if let Ok(mut slot) = self.signer.write() {
            *slot = Some(signer);
            tracing::debug!("Signer session established");
        }
    }

    fn current_signer(&self) -> PipelineResult<Arc<dyn RemoteSigner>> {
        self.signer
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(PipelineError::SignerNotInitialized)
    }

    pub fn logged_identity(&self) -> Option<String> {
        self.cache.logged_identity()
    }

    /// Sign in through the signer, remember the identity and resolve its account.
    pub async fn login(&self) -> PipelineResult<SessionUser> {
        self.login_inner().instrument(request_span("login")).await
    }

    async fn login_inner(&self) -> PipelineResult<SessionUser> {
        let signer = self.current_signer()?;
        let login = signer.login().await?;
        tracing::info!(identity = %login.identity, "Signer login succeeded");

        self.cache.set_logged(&login.identity)?;
        let public_key = login.wallet.eos_address.clone();
        self.cache.put_wallet(&login.identity, login.wallet)?;

        let account_name = self.resolver.resolve(&login.identity).await?.into_account_name();
        Ok(SessionUser {
            account_name,
            permission: SESSION_PERMISSION.to_string(),
            public_key,
            chain_id: self.chain_id.clone(),
        })
    }

    /// Resolve the account name for `identity` on the configured chain.
    pub async fn resolve_account(&self, identity: &str) -> PipelineResult<String> {
        self.resolve(identity)
            .instrument(request_span("resolve_account"))
            .await
            .map(Resolution::into_account_name)
    }

    async fn resolve(&self, identity: &str) -> PipelineResult<Resolution> {
        Ok(self.resolver.resolve(identity).await?)
    }

    /// Build, sign, pack and (unless disabled) broadcast `actions`.
    pub async fn sign_and_maybe_broadcast(
        &self,
        actions: Vec<Action>,
        options: SignOptions,
    ) -> PipelineResult<PushResult> {
        self.sign_inner(actions, options)
            .instrument(request_span("sign_and_maybe_broadcast"))
            .await
    }

    async fn sign_inner(&self, actions: Vec<Action>, options: SignOptions) -> PipelineResult<PushResult> {
        let SignOptions {
            broadcast,
            reason,
            overrides,
            cancel,
        } = options;
        let signer = self.current_signer()?;

        let raw = self.builder.build(actions, overrides).await?;
        let reason = reason.unwrap_or_else(|| self.config.signer.default_reason.clone());
        let envelope = SigningEnvelope::new(raw, self.chain_id.clone());

        tracing::info!(actions = envelope.raw_transaction.actions.len(), "Requesting signature");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Pending signature canceled");
                SignOutcome::Declined
            }
            outcome = signer.sign(&envelope, &reason) => outcome,
        };

        let signature = match outcome {
            SignOutcome::Success(signature) => {
                metrics::record_sign("success");
                signature
            }
            SignOutcome::Declined => {
                metrics::record_sign("declined");
                tracing::info!("Signature declined");
                return Err(PipelineError::SignerDeclined);
            }
            SignOutcome::Failed(detail) => {
                metrics::record_sign("failed");
                tracing::warn!(detail = detail.as_deref().unwrap_or(""), "Signer failed");
                return Err(PipelineError::SignerFailed(detail));
            }
        };

        let packed = PackedTransaction::from_signed(&envelope.raw_transaction, signature)?;
        self.broadcaster
            .submit(packed, broadcast)
            .await
            .map_err(PipelineError::Broadcast)
    }

    /// Forget every cached identity and the logged pointer.
    pub fn logout(&self) -> PipelineResult<()> {
        self.cache.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("chain_id", &self.chain_id)
            .field("expiration_secs", &self.builder.expiration_secs())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, Wallet};
    use crate::chain::transaction::ActionData;
    use crate::test_support::{FakeChain, FakeCreator, FakeLookup, FakeSigner};
    use serde_json::json;
    use std::time::Duration;

    const CHAIN_ID: &str = "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906";

    struct Harness {
        pipeline: Arc<Pipeline>,
        chain: Arc<FakeChain>,
        lookup: Arc<FakeLookup>,
        creator: Arc<FakeCreator>,
        store: MemoryStore,
    }

    fn harness(chain: FakeChain, lookup: FakeLookup) -> Harness {
        let mut config = PipelineConfig::default();
        config.chain.chain_id = CHAIN_ID.to_string();
        let store = MemoryStore::new();
        let cache = Arc::new(CredentialCache::open(Arc::new(store.clone()), "custodial").unwrap());
        let chain = Arc::new(chain);
        let lookup = Arc::new(lookup);
        let creator = Arc::new(FakeCreator::returning("newaccount12"));
        let pipeline = Pipeline::with_lookup(config, chain.clone(), cache, lookup.clone(), creator.clone());
        Harness {
            pipeline: Arc::new(pipeline),
            chain,
            lookup,
            creator,
            store,
        }
    }

    fn transfer() -> Vec<Action> {
        vec![serde_json::from_value(json!({
            "account": "eosio.token",
            "name": "transfer",
            "authorization": [{"actor": "alice", "permission": "active"}],
            "data": {"from": "alice", "to": "bob", "quantity": "1.0000 EOS", "memo": "hi"}
        }))
        .unwrap()]
    }

    fn store_snapshot(store: &MemoryStore) -> (Option<String>, Option<String>) {
        use crate::cache::KeyValueStore;
        (
            store.get("custodial.data").unwrap(),
            store.get("custodial.logged").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sign_without_signer_fails_fast() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerNotInitialized);
        assert_eq!(h.chain.info_calls(), 0);
    }

    #[tokio::test]
    async fn test_sign_and_broadcast() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        let signer = Arc::new(FakeSigner::signing("SIG_K1_test"));
        h.pipeline.establish_signer(signer.clone());

        let result = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap();
        assert!(result.was_broadcast);
        assert_eq!(result.status, "executed");
        assert_eq!(result.transaction.signatures[0].0, "SIG_K1_test");
        assert_eq!(h.chain.push_calls(), 1);

        let (envelope, reason) = signer.last_request().unwrap();
        assert_eq!(reason, "sign this transaction");
        assert_eq!(envelope.extra_signing_data.chain_id.as_str(), CHAIN_ID);
        assert!(matches!(envelope.raw_transaction.actions[0].data, ActionData::Encoded(_)));
        assert_eq!(result.transaction.unpack().unwrap(), envelope.raw_transaction);
    }

    #[tokio::test]
    async fn test_no_broadcast_skips_push() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        h.pipeline.establish_signer(Arc::new(FakeSigner::signing("SIG_K1_test")));

        let options = SignOptions {
            broadcast: false,
            reason: Some("pay bob".to_string()),
            ..SignOptions::default()
        };
        let result = h.pipeline.sign_and_maybe_broadcast(transfer(), options).await.unwrap();
        assert!(!result.was_broadcast);
        assert!(result.transaction_id.is_empty());
        assert!(result.status.is_empty());
        assert_eq!(h.chain.push_calls(), 0);
    }

    #[tokio::test]
    async fn test_declined_has_no_side_effects() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        h.pipeline.establish_signer(Arc::new(FakeSigner::declining()));
        let before = store_snapshot(&h.store);

        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerDeclined);
        assert_eq!(err.user_message(), TRANSACTION_CANCELED_KEY);
        assert_eq!(h.chain.push_calls(), 0);
        assert_eq!(store_snapshot(&h.store), before);
    }

    #[tokio::test]
    async fn test_signer_failure_detail() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        h.pipeline
            .establish_signer(Arc::new(FakeSigner::failing(Some("quota exceeded"))));

        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerFailed);
        assert_eq!(err.user_message(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_cancel_declines_only_its_own_sign() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        let signer = Arc::new(FakeSigner::hanging());
        h.pipeline.establish_signer(signer.clone());

        let first = SignOptions::default();
        let second = SignOptions::default();
        let first_cancel = first.cancel.clone();
        let second_cancel = second.cancel.clone();

        let pipeline = h.pipeline.clone();
        let pending_first =
            tokio::spawn(async move { pipeline.sign_and_maybe_broadcast(transfer(), first).await });
        let pipeline = h.pipeline.clone();
        let pending_second =
            tokio::spawn(async move { pipeline.sign_and_maybe_broadcast(transfer(), second).await });

        // Both requests reach the signer
        for _ in 0..100 {
            if signer.sign_calls() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(signer.sign_calls(), 2);

        first_cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(2), pending_first)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerDeclined);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending_second.is_finished());

        second_cancel.cancel();
        let err = pending_second.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerDeclined);
        assert_eq!(h.chain.push_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_signing_declines() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec!["alice"]));
        h.pipeline.establish_signer(Arc::new(FakeSigner::signing("SIG_K1_test")));

        let options = SignOptions::default();
        options.cancel.cancel();
        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignerDeclined);
        assert_eq!(h.chain.push_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_push_surfaces_node_message() {
        let h = harness(
            FakeChain::with_token_abi().rejecting_push("overdrawn balance"),
            FakeLookup::returning(vec!["alice"]),
        );
        h.pipeline.establish_signer(Arc::new(FakeSigner::signing("SIG_K1_test")));

        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionRejected);
        assert_eq!(err.user_message(), "overdrawn balance");
        assert_eq!(h.chain.push_calls(), 1);
    }

    #[tokio::test]
    async fn test_build_failures_classified() {
        let h = harness(FakeChain::with_token_abi().failing_info(), FakeLookup::returning(vec![]));
        h.pipeline.establish_signer(Arc::new(FakeSigner::signing("SIG_K1_test")));
        let err = h
            .pipeline
            .sign_and_maybe_broadcast(transfer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainInfoUnavailable);
    }

    #[tokio::test]
    async fn test_login_resolves_and_caches() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::returning(vec![]));
        let wallet = Wallet {
            eos_address: "PUB_K1_6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5BoDq63".to_string(),
            ..Wallet::default()
        };
        let signer = FakeSigner::signing("SIG_K1_test").with_login("a@example.com", wallet.clone());
        h.pipeline.establish_signer(Arc::new(signer));

        let user = h.pipeline.login().await.unwrap();
        assert_eq!(user.account_name, "newaccount12");
        assert_eq!(user.permission, "active");
        assert_eq!(user.public_key, wallet.eos_address);
        assert_eq!(user.chain_id.as_str(), CHAIN_ID);
        assert_eq!(h.pipeline.logged_identity().as_deref(), Some("a@example.com"));
        assert_eq!(h.creator.calls(), 1);

        // Cached afterwards: no lookups, no creation
        let name = h.pipeline.resolve_account("a@example.com").await.unwrap();
        assert_eq!(name, "newaccount12");
        assert_eq!(h.lookup.calls(), 1);
        assert_eq!(h.creator.calls(), 1);

        h.pipeline.logout().unwrap();
        assert!(h.pipeline.logged_identity().is_none());
        assert_eq!(store_snapshot(&h.store), (None, None));
    }

    #[tokio::test]
    async fn test_resolve_errors_classified() {
        let h = harness(FakeChain::with_token_abi(), FakeLookup::failing());
        assert_eq!(
            h.pipeline.resolve_account("").await.unwrap_err().kind(),
            ErrorKind::NoIdentity
        );
        assert_eq!(
            h.pipeline.resolve_account("nobody@example.com").await.unwrap_err().kind(),
            ErrorKind::NoPublicKey
        );
    }
}
