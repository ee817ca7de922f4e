//! Multi-endpoint, retrying key-to-account query.
//!
//! Endpoints are tried strictly in order. Each gets up to
//! `policy.max_attempts` attempts with backoff between them; the first
//! success short-circuits everything after it.

use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::chain::types::AccountsByAuthorizers;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

pub const ACCOUNTS_BY_AUTHORIZERS_PATH: &str = "/v1/chain/get_accounts_by_authorizers";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("invalid lookup input: {0}")]
    InvalidInput(String),

    #[error("all endpoints exhausted after {attempts} attempts: {last_error}")]
    AllEndpointsExhausted { attempts: u32, last_error: String },

    #[error("lookup response could not be parsed: {0}")]
    InvalidResponse(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Retrying lookup over a fixed request shape.
#[derive(Debug, Clone)]
pub struct RetryingLookup {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingLookup {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Accounts controlled by `public_key`, as reported by the first endpoint that answers.
    pub async fn accounts_for_key(&self, endpoints: &[String], public_key: &str) -> LookupResult<AccountsByAuthorizers> {
        let value = self.query(endpoints, public_key).await?;
        serde_json::from_value(value).map_err(|e| LookupError::InvalidResponse(e.to_string()))
    }

    /// Raw JSON body of the first successful `get_accounts_by_authorizers` call.
    pub async fn query(&self, endpoints: &[String], public_key: &str) -> LookupResult<Value> {
        if public_key.trim().is_empty() {
            return Err(LookupError::InvalidInput("public key is empty".to_string()));
        }
        if endpoints.is_empty() {
            return Err(LookupError::InvalidInput("no endpoints to query".to_string()));
        }

        let body = json!({ "accounts": [], "keys": [public_key] });
        let mut attempts = 0u32;
        let mut last_error = String::new();

        for endpoint in endpoints {
            let url = format!("{}{}", endpoint.trim_end_matches('/'), ACCOUNTS_BY_AUTHORIZERS_PATH);

            for attempt in 1..=self.policy.max_attempts {
                attempts += 1;
                let outcome = match timeout(self.policy.attempt_timeout, self.attempt(&url, &body)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(format!(
                        "timed out after {} ms",
                        self.policy.attempt_timeout.as_millis()
                    )),
                };

                match outcome {
                    Ok(value) => {
                        metrics::record_lookup_attempt(endpoint, "success");
                        tracing::debug!(endpoint = %endpoint, attempt, "Account lookup succeeded");
                        return Ok(value);
                    }
                    Err(e) => {
                        metrics::record_lookup_attempt(endpoint, "failure");
                        tracing::warn!(
                            endpoint = %endpoint,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            error = %e,
                            "Account lookup attempt failed"
                        );
                        last_error = e;
                    }
                }

                if let Some(delay) = self.policy.delay_after(attempt) {
                    sleep_backoff(delay).await;
                }
            }
        }

        tracing::error!(attempts, error = %last_error, "Account lookup exhausted every endpoint");
        Err(LookupError::AllEndpointsExhausted { attempts, last_error })
    }

    /// One request: 2xx with a non-null JSON body counts as success.
    async fn attempt(&self, url: &str, body: &Value) -> Result<Value, String> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let value: Value = response.json().await.map_err(|e| e.to_string())?;
        if value.is_null() {
            return Err("empty response body".to_string());
        }
        Ok(value)
    }
}

async fn sleep_backoff(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
