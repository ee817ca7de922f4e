//! Chain node RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Query chain info and contract ABIs from the node HTTP API
//! - Fail over across configured endpoints for read calls
//! - Submit signed transactions to the primary endpoint only
//! - Surface the node's own error message when a call is rejected

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::chain::abi::AbiDef;
use crate::chain::name::Name;
use crate::chain::packer::PackedTransaction;
use crate::chain::types::{
    node_error_detail, ChainConfig, ChainError, ChainId, ChainInfo, ChainResult, GetAbiResponse,
    PushTransactionResponse,
};

/// The node calls the pipeline depends on.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn get_info(&self) -> ChainResult<ChainInfo>;

    /// `Ok(None)` when the account exists but has no contract.
    async fn get_abi(&self, account: Name) -> ChainResult<Option<AbiDef>>;

    async fn push_transaction(&self, packed: &PackedTransaction) -> ChainResult<PushTransactionResponse>;
}

/// HTTP client for a chain node, primary endpoint first.
#[derive(Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    /// Primary followed by failovers.
    endpoints: Vec<Url>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl ChainClient {
    /// Create a client without touching the network.
    pub fn new(config: ChainConfig) -> ChainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut endpoints = Vec::new();

        let primary: Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        endpoints.push(primary);

        for url_str in &config.failover_urls {
            match url_str.parse() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ChainError::Rpc(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            config,
            timeout_duration,
        })
    }

    /// Create a client and check the node serves the configured chain.
    ///
    /// A failed check is logged, not returned, so an unreachable node does
    /// not prevent startup.
    pub async fn connect(config: ChainConfig) -> ChainResult<Self> {
        let client = Self::new(config)?;
        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                rpc_url = %client.config.rpc_url,
                chain_id = %client.config.chain_id,
                "Chain client initialized"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Chain client initialized but chain verification failed"
            ),
        }
        Ok(client)
    }

    /// Ok when no chain id is configured.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        if self.config.chain_id.is_empty() {
            return Ok(());
        }
        let info = self.get_info().await?;
        let expected = ChainId::from(self.config.chain_id.as_str());
        if info.chain_id != expected {
            return Err(ChainError::InvalidResponse(format!(
                "chain id mismatch: expected {}, node reports {}",
                expected, info.chain_id
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    async fn post_json<T: DeserializeOwned>(&self, base: &Url, path: &str, body: &Value) -> ChainResult<T> {
        let url = endpoint_url(base, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: {}", url, e)))?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(failure_from(&url, status, &payload));
        }

        serde_json::from_value(payload).map_err(|e| ChainError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Read call with failover. A node rejection is final; transport errors,
    /// gateway 5xx and timeouts move on to the next endpoint.
    async fn read<T: DeserializeOwned>(&self, path: &str, body: Value) -> ChainResult<T> {
        let mut last_error = ChainError::Rpc("no RPC endpoints configured".to_string());

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            match timeout(self.timeout_duration, self.post_json(endpoint, path, &body)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(ChainError::Rejected(detail))) => return Err(ChainError::Rejected(detail)),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, path, error = %e, "RPC error, trying next provider");
                    last_error = e;
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, path, "RPC timeout, trying next provider");
                    last_error = ChainError::Timeout(self.config.rpc_timeout_secs);
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl ChainApi for ChainClient {
    async fn get_info(&self) -> ChainResult<ChainInfo> {
        self.read("/v1/chain/get_info", json!({})).await
    }

    async fn get_abi(&self, account: Name) -> ChainResult<Option<AbiDef>> {
        let response: GetAbiResponse = self
            .read("/v1/chain/get_abi", json!({ "account_name": account.to_string() }))
            .await?;
        Ok(response.abi)
    }

    async fn push_transaction(&self, packed: &PackedTransaction) -> ChainResult<PushTransactionResponse> {
        let body = serde_json::to_value(packed)
            .map_err(|e| ChainError::InvalidResponse(format!("unserializable transaction: {}", e)))?;
        let primary = &self.endpoints[0];

        match timeout(
            self.timeout_duration,
            self.post_json(primary, "/v1/chain/push_transaction", &body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("endpoints", &self.endpoints.len())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

/// A node error body or a 4xx is the node's answer. Any other 5xx came from
/// an unhealthy node or its gateway, so reads try the next endpoint.
fn failure_from(url: &str, status: reqwest::StatusCode, payload: &Value) -> ChainError {
    let node_error = payload.get("error").is_some();
    if node_error || status.is_client_error() {
        let detail = node_error_detail(payload).unwrap_or_else(|| format!("HTTP {}", status));
        return ChainError::Rejected(detail);
    }
    ChainError::Rpc(format!("{}: HTTP {}", url, status))
}

/// Join a base URL and an API path, tolerating a trailing slash on the base.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), path)
}
