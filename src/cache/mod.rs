//! Credential cache subsystem.
//!
//! # Data Flow
//! ```text
//! login / resolver
//!     → credentials.rs (DashMap of identities, per-identity locks)
//!     → store.rs (string key-value backend: memory or JSON file)
//! ```
//!
//! # Design Decisions
//! - Every mutation is persisted before it returns
//! - The stored layout is one JSON document under `<prefix>.data` plus the
//!   logged identity under `<prefix>.logged`
//! - Callers serialize per-identity work with `lock_identity`

pub mod credentials;
pub mod store;

use thiserror::Error;

pub use credentials::{ChainAccounts, CredentialCache, IdentityEntry, Wallet};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Errors raised by the cache or its backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache data is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;
