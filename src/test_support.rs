//! In-process fakes for unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::accounts::{AccountCreator, AccountLookup, CreationError, LookupError, LookupResult};
use crate::cache::Wallet;
use crate::chain::abi::AbiDef;
use crate::chain::client::ChainApi;
use crate::chain::name::Name;
use crate::chain::packer::{PackedTransaction, Signature};
use crate::chain::types::{
    ChainError, ChainId, ChainInfo, ChainResult, ProcessedTransaction, PushTransactionResponse,
    TransactionReceipt,
};
use crate::signer::{LoginResponse, RemoteSigner, SignOutcome, SignerResult, SigningEnvelope};

pub fn token_abi_def() -> AbiDef {
    serde_json::from_value(json!({
        "version": "eosio::abi/1.2",
        "structs": [{"name": "transfer", "base": "", "fields": [
            {"name": "from", "type": "name"},
            {"name": "to", "type": "name"},
            {"name": "quantity", "type": "asset"},
            {"name": "memo", "type": "string"}
        ]}],
        "actions": [{"name": "transfer", "type": "transfer", "ricardian_contract": ""}]
    }))
    .unwrap()
}

/// `eosio.null` with a single context-free `nonce` action.
pub fn nonce_abi_def() -> AbiDef {
    serde_json::from_value(json!({
        "version": "eosio::abi/1.2",
        "structs": [{"name": "nonce", "base": "", "fields": [{"name": "value", "type": "string"}]}],
        "actions": [{"name": "nonce", "type": "nonce", "ricardian_contract": ""}]
    }))
    .unwrap()
}

pub fn sample_info() -> ChainInfo {
    ChainInfo {
        chain_id: ChainId::from("aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906"),
        head_block_num: 300_000_010,
        head_block_time: "2024-05-01T12:00:00.500".to_string(),
        last_irreversible_block_num: 300_000_000,
        last_irreversible_block_id: "11e1a3002d4b7e2f5a6b7c8d9eafb0c1d2e3f405162738495a6b7c8d9eafb0c1".to_string(),
        head_block_id: String::new(),
        server_version_string: None,
    }
}

/// Chain serving the `eosio.token` and `eosio.null` ABIs. Account `missing`
/// fails to load.
#[derive(Default)]
pub struct FakeChain {
    fail_info: bool,
    reject_push: Option<String>,
    info_calls: AtomicUsize,
    abi_calls: AtomicUsize,
    push_calls: AtomicUsize,
}

impl FakeChain {
    pub fn with_token_abi() -> Self {
        Self::default()
    }

    pub fn failing_info(mut self) -> Self {
        self.fail_info = true;
        self
    }

    pub fn rejecting_push(mut self, message: &str) -> Self {
        self.reject_push = Some(message.to_string());
        self
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn abi_calls(&self) -> usize {
        self.abi_calls.load(Ordering::SeqCst)
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainApi for FakeChain {
    async fn get_info(&self) -> ChainResult<ChainInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_info {
            return Err(ChainError::Rpc("connection refused".to_string()));
        }
        Ok(sample_info())
    }

    async fn get_abi(&self, account: Name) -> ChainResult<Option<AbiDef>> {
        self.abi_calls.fetch_add(1, Ordering::SeqCst);
        match account.to_string().as_str() {
            "eosio.token" => Ok(Some(token_abi_def())),
            "eosio.null" => Ok(Some(nonce_abi_def())),
            "missing" => Err(ChainError::Rejected("unknown key".to_string())),
            _ => Ok(None),
        }
    }

    async fn push_transaction(&self, _packed: &PackedTransaction) -> ChainResult<PushTransactionResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.reject_push {
            return Err(ChainError::Rejected(message.clone()));
        }
        Ok(PushTransactionResponse {
            transaction_id: "f0e1d2c3".to_string(),
            processed: ProcessedTransaction {
                receipt: Some(TransactionReceipt {
                    status: "executed".to_string(),
                }),
            },
        })
    }
}

enum SignBehavior {
    Sign(String),
    Decline,
    Fail(Option<String>),
    Hang,
}

pub struct FakeSigner {
    behavior: SignBehavior,
    login: Option<LoginResponse>,
    last_request: Mutex<Option<(SigningEnvelope, String)>>,
    sign_calls: AtomicUsize,
}

impl FakeSigner {
    fn with_behavior(behavior: SignBehavior) -> Self {
        Self {
            behavior,
            login: None,
            last_request: Mutex::new(None),
            sign_calls: AtomicUsize::new(0),
        }
    }

    pub fn signing(signature: &str) -> Self {
        Self::with_behavior(SignBehavior::Sign(signature.to_string()))
    }

    pub fn declining() -> Self {
        Self::with_behavior(SignBehavior::Decline)
    }

    pub fn failing(detail: Option<&str>) -> Self {
        Self::with_behavior(SignBehavior::Fail(detail.map(str::to_string)))
    }

    /// Never answers, like a user who walked away.
    pub fn hanging() -> Self {
        Self::with_behavior(SignBehavior::Hang)
    }

    pub fn with_login(mut self, identity: &str, wallet: Wallet) -> Self {
        self.login = Some(LoginResponse {
            identity: identity.to_string(),
            wallet,
        });
        self
    }

    pub fn last_request(&self) -> Option<(SigningEnvelope, String)> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSigner for FakeSigner {
    async fn login(&self) -> SignerResult<LoginResponse> {
        self.login
            .clone()
            .ok_or(crate::signer::SignerError::Declined)
    }

    async fn sign(&self, envelope: &SigningEnvelope, reason: &str) -> SignOutcome {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((envelope.clone(), reason.to_string()));
        match &self.behavior {
            SignBehavior::Sign(signature) => SignOutcome::Success(Signature(signature.clone())),
            SignBehavior::Decline => SignOutcome::Declined,
            SignBehavior::Fail(detail) => SignOutcome::Failed(detail.clone()),
            SignBehavior::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeLookup {
    result: LookupResult<Vec<String>>,
    calls: AtomicUsize,
    last_key: Mutex<Option<String>>,
}

impl FakeLookup {
    pub fn returning(accounts: Vec<&str>) -> Self {
        Self {
            result: Ok(accounts.into_iter().map(str::to_string).collect()),
            calls: AtomicUsize::new(0),
            last_key: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(LookupError::AllEndpointsExhausted {
                attempts: 3,
                last_error: "HTTP 503 Service Unavailable".to_string(),
            }),
            calls: AtomicUsize::new(0),
            last_key: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_key(&self) -> Option<String> {
        self.last_key.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountLookup for FakeLookup {
    async fn accounts_for_key(&self, public_key: &str) -> LookupResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(public_key.to_string());
        tokio::task::yield_now().await;
        self.result.clone()
    }
}

pub struct FakeCreator {
    result: Result<String, CreationError>,
    calls: AtomicUsize,
    last_key: Mutex<Option<String>>,
}

impl FakeCreator {
    pub fn returning(name: &str) -> Self {
        Self {
            result: Ok(name.to_string()),
            calls: AtomicUsize::new(0),
            last_key: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(CreationError::Rejected("key already registered".to_string())),
            calls: AtomicUsize::new(0),
            last_key: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_key(&self) -> Option<String> {
        self.last_key.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountCreator for FakeCreator {
    async fn create_account(&self, public_key: &str) -> Result<String, CreationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(public_key.to_string());
        tokio::task::yield_now().await;
        self.result.clone()
    }
}
