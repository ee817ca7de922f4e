//! Remote signer boundary.
//!
//! # Responsibilities
//! - Define the contract every custodial signer implements
//! - Carry the signing envelope in the shape the signer expects
//! - Tell a user refusal apart from a signer failure
//!
//! # Design Decisions
//! - Signing is never retried; a second prompt is the user's decision
//! - Private keys never exist on this side of the boundary

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::Wallet;
use crate::chain::packer::Signature;
use crate::chain::transaction::RawTransaction;
use crate::chain::types::ChainId;

pub use http::HttpSigner;

/// Data sent alongside the transaction so the signer can compute the digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraSigningData {
    pub chain_id: ChainId,
}

/// What the signer is asked to sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningEnvelope {
    pub raw_transaction: RawTransaction,
    pub extra_signing_data: ExtraSigningData,
}

impl SigningEnvelope {
    pub fn new(raw_transaction: RawTransaction, chain_id: ChainId) -> Self {
        Self {
            raw_transaction,
            extra_signing_data: ExtraSigningData { chain_id },
        }
    }
}

/// Result of one signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Success(Signature),
    /// The user refused.
    Declined,
    /// Anything else, with the signer's detail when it gave one.
    Failed(Option<String>),
}

/// A signed-in custodial user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub identity: String,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("user declined the request")]
    Declined,

    #[error("signer request failed: {0}")]
    Request(String),

    #[error("signer response is malformed: {0}")]
    InvalidResponse(String),
}

pub type SignerResult<T> = Result<T, SignerError>;

#[async_trait]
pub trait RemoteSigner: Send + Sync {
    async fn login(&self) -> SignerResult<LoginResponse>;

    async fn sign(&self, envelope: &SigningEnvelope, reason: &str) -> SignOutcome;
}
