//! Pipeline error taxonomy.

use std::fmt;
use thiserror::Error;

use crate::accounts::{LookupError, ResolveError};
use crate::cache::CacheError;
use crate::chain::packer::PackError;
use crate::chain::transaction::BuildError;
use crate::chain::types::ChainError;
use crate::signer::SignerError;

/// Localization key hosts show when the user cancels signing.
pub const TRANSACTION_CANCELED_KEY: &str = "antelope.evm.error_transaction_canceled";

/// Stable classification of every pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ChainUnavailable,
    ChainInfoUnavailable,
    AbiFetchFailed,
    EncodingError,
    TransactionRejected,
    SignerNotInitialized,
    SignerDeclined,
    SignerFailed,
    AllEndpointsExhausted,
    /// A lookup endpoint answered 2xx with a body of the wrong shape.
    InvalidLookupResponse,
    NoIdentity,
    NoPublicKey,
    AccountCreationFailed,
    CacheUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ChainUnavailable => "chain_unavailable",
            ErrorKind::ChainInfoUnavailable => "chain_info_unavailable",
            ErrorKind::AbiFetchFailed => "abi_fetch_failed",
            ErrorKind::EncodingError => "encoding_error",
            ErrorKind::TransactionRejected => "transaction_rejected",
            ErrorKind::SignerNotInitialized => "signer_not_initialized",
            ErrorKind::SignerDeclined => "signer_declined",
            ErrorKind::SignerFailed => "signer_failed",
            ErrorKind::AllEndpointsExhausted => "all_endpoints_exhausted",
            ErrorKind::InvalidLookupResponse => "invalid_lookup_response",
            ErrorKind::NoIdentity => "no_identity",
            ErrorKind::NoPublicKey => "no_public_key",
            ErrorKind::AccountCreationFailed => "account_creation_failed",
            ErrorKind::CacheUnavailable => "cache_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("signer is not initialized")]
    SignerNotInitialized,

    #[error("transaction signing was canceled")]
    SignerDeclined,

    #[error("signing failed: {}", .0.as_deref().unwrap_or("unknown signer error"))]
    SignerFailed(Option<String>),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("broadcast failed: {0}")]
    Broadcast(ChainError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<SignerError> for PipelineError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Declined => PipelineError::SignerDeclined,
            other => PipelineError::SignerFailed(Some(other.to_string())),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Build(BuildError::NoActions) => ErrorKind::EncodingError,
            PipelineError::Build(BuildError::ChainInfoUnavailable(_)) => ErrorKind::ChainInfoUnavailable,
            PipelineError::Build(BuildError::AbiFetchFailed { .. }) => ErrorKind::AbiFetchFailed,
            PipelineError::Build(BuildError::Encoding { .. }) => ErrorKind::EncodingError,
            PipelineError::SignerNotInitialized => ErrorKind::SignerNotInitialized,
            PipelineError::SignerDeclined => ErrorKind::SignerDeclined,
            PipelineError::SignerFailed(_) => ErrorKind::SignerFailed,
            PipelineError::Pack(_) => ErrorKind::EncodingError,
            PipelineError::Broadcast(ChainError::Rejected(_)) => ErrorKind::TransactionRejected,
            PipelineError::Broadcast(_) => ErrorKind::ChainUnavailable,
            PipelineError::Resolve(ResolveError::NoIdentity) => ErrorKind::NoIdentity,
            PipelineError::Resolve(ResolveError::NoPublicKey(_)) => ErrorKind::NoPublicKey,
            PipelineError::Resolve(ResolveError::Lookup(LookupError::InvalidInput(_))) => ErrorKind::NoPublicKey,
            PipelineError::Resolve(ResolveError::Lookup(LookupError::InvalidResponse(_))) => {
                ErrorKind::InvalidLookupResponse
            }
            PipelineError::Resolve(ResolveError::Lookup(LookupError::AllEndpointsExhausted { .. })) => {
                ErrorKind::AllEndpointsExhausted
            }
            PipelineError::Resolve(ResolveError::AccountCreationFailed(_)) => ErrorKind::AccountCreationFailed,
            PipelineError::Resolve(ResolveError::Cache(_)) | PipelineError::Cache(_) => ErrorKind::CacheUnavailable,
        }
    }

    /// Message suitable for the end user: the cancel key for declines, the
    /// most specific detail available otherwise.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::SignerDeclined => TRANSACTION_CANCELED_KEY.to_string(),
            PipelineError::SignerFailed(Some(detail)) => detail.clone(),
            PipelineError::Broadcast(ChainError::Rejected(detail)) => detail.clone(),
            other => other.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
