//! Account-creation collaborator.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::AccountCreationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreationError {
    #[error("account creation is not configured")]
    NotConfigured,

    #[error("account creation request failed: {0}")]
    Request(String),

    #[error("account creation service rejected the request: {0}")]
    Rejected(String),

    #[error("account creation response has no account name")]
    MissingAccountName,
}

/// Creates an on-chain account owned by a public key.
#[async_trait]
pub trait AccountCreator: Send + Sync {
    /// Create an account with `public_key` as owner and active key.
    async fn create_account(&self, public_key: &str) -> Result<String, CreationError>;
}

/// Creator backed by an HTTP service: `POST {url} {ownerKey, activeKey}`.
#[derive(Debug, Clone)]
pub struct HttpAccountCreator {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpAccountCreator {
    pub fn new(config: &AccountCreationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl AccountCreator for HttpAccountCreator {
    async fn create_account(&self, public_key: &str) -> Result<String, CreationError> {
        if self.url.is_empty() {
            return Err(CreationError::NotConfigured);
        }

        tracing::info!(url = %self.url, "Requesting account creation");
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "ownerKey": public_key, "activeKey": public_key }))
            .send()
            .await
            .map_err(|e| CreationError::Request(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let detail = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(CreationError::Rejected(detail));
        }

        account_name_from(&body).ok_or(CreationError::MissingAccountName)
    }
}

/// Accepts `{accountName}`, `{account_name}` or a bare JSON string.
fn account_name_from(body: &Value) -> Option<String> {
    let name = match body {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("accountName")
            .or_else(|| map.get("account_name"))
            .and_then(Value::as_str),
        _ => None,
    };
    name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}
