//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the signing pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chain node endpoints and transaction defaults.
    pub chain: ChainConfig,

    /// Retry policy for account lookups.
    pub lookup: RetryConfig,

    /// Remote signer bridge.
    pub signer: SignerConfig,

    /// Account-creation service.
    pub account_creation: AccountCreationConfig,

    /// Persisted credential cache.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Hex chain id the node must report.
    pub chain_id: String,

    /// Primary node URL. Transactions are pushed here only.
    pub rpc_url: String,

    /// Failover node URLs for read calls.
    pub failover_urls: Vec<String>,

    /// Endpoints queried, in order, for key-to-account lookups.
    /// Empty means primary followed by failovers.
    pub read_endpoints: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Seconds past the head block time a built transaction expires.
    pub expiration_secs: u32,
}

impl ChainConfig {
    /// Endpoints used for account lookups.
    pub fn lookup_endpoints(&self) -> Vec<String> {
        if !self.read_endpoints.is_empty() {
            return self.read_endpoints.clone();
        }
        std::iter::once(self.rpc_url.clone())
            .chain(self.failover_urls.iter().cloned())
            .collect()
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            rpc_url: "http://127.0.0.1:8888".to_string(),
            failover_urls: Vec::new(),
            read_endpoints: Vec::new(),
            rpc_timeout_secs: 10,
            expiration_secs: 120,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per endpoint.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Deadline for a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            attempt_timeout_ms: 2500,
        }
    }
}

/// Remote signer bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Base URL of the signer bridge. Empty disables signing.
    pub bridge_url: String,

    /// Application id registered with the custodial signer.
    pub app_id: String,

    /// Reason shown to the user when none is supplied.
    pub default_reason: String,

    /// How long to wait for the user to approve, in seconds.
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            bridge_url: String::new(),
            app_id: String::new(),
            default_reason: "sign this transaction".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Account-creation service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountCreationConfig {
    /// Service URL. Empty disables creation.
    pub url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AccountCreationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Credential cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// JSON file backing the cache. Empty keeps it in memory.
    pub path: String,

    /// Prefix of the stored keys (`<prefix>.data`, `<prefix>.logged`).
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            key_prefix: "custodial".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
