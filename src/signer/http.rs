//! Client for a signer bridge service.
//!
//! The bridge fronts the custodial signer SDK over HTTP:
//! - `POST {bridge}/login {appId}` → `{user: {email}, wallet: {...}}`
//! - `POST {bridge}/signTransaction {appId, transactionObject, reason}`
//!   → `{status, signature}` or `{status, details: [{message}]}`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::cache::Wallet;
use crate::chain::packer::Signature;
use crate::config::SignerConfig;
use crate::signer::{LoginResponse, RemoteSigner, SignOutcome, SignerError, SignerResult, SigningEnvelope};

const STATUS_SUCCESS: &str = "SUCCESS";
const STATUS_DENIED: &str = "USER_REQUEST_DENIED";

#[derive(Debug, Clone)]
pub struct HttpSigner {
    http: reqwest::Client,
    bridge_url: String,
    app_id: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    status: Option<String>,
    user: LoginUser,
    #[serde(default)]
    wallet: Wallet,
}

#[derive(Deserialize)]
struct LoginUser {
    email: String,
}

impl HttpSigner {
    pub fn new(config: &SignerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bridge_url: config.bridge_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}{}", self.bridge_url, path);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        // Denials arrive with 4xx statuses from some bridges; the body decides.
        if !status.is_success() && body.get("status").is_none() {
            return Err(error_detail(&body).unwrap_or_else(|| format!("HTTP {}", status)));
        }
        Ok(body)
    }
}

#[async_trait]
impl RemoteSigner for HttpSigner {
    async fn login(&self) -> SignerResult<LoginResponse> {
        let body = self
            .post("/login", &json!({ "appId": self.app_id }))
            .await
            .map_err(SignerError::Request)?;
        login_from(body)
    }

    async fn sign(&self, envelope: &SigningEnvelope, reason: &str) -> SignOutcome {
        let request = json!({
            "appId": self.app_id,
            "transactionObject": envelope,
            "reason": reason,
        });
        match self.post("/signTransaction", &request).await {
            Ok(body) => sign_outcome_from(&body),
            Err(detail) => SignOutcome::Failed(Some(detail)),
        }
    }
}

fn login_from(body: Value) -> SignerResult<LoginResponse> {
    match body.get("status").and_then(Value::as_str) {
        Some(STATUS_DENIED) => return Err(SignerError::Declined),
        Some(status) if status != STATUS_SUCCESS => {
            return Err(SignerError::Request(
                error_detail(&body).unwrap_or_else(|| status.to_string()),
            ))
        }
        _ => {}
    }
    let parsed: LoginBody =
        serde_json::from_value(body).map_err(|e| SignerError::InvalidResponse(e.to_string()))?;
    if parsed.user.email.is_empty() {
        return Err(SignerError::InvalidResponse("login returned no identity".to_string()));
    }
    tracing::debug!(status = parsed.status.as_deref().unwrap_or(""), "Signer login completed");
    Ok(LoginResponse {
        identity: parsed.user.email,
        wallet: parsed.wallet,
    })
}

fn sign_outcome_from(body: &Value) -> SignOutcome {
    match body.get("status").and_then(Value::as_str) {
        Some(STATUS_SUCCESS) => match body.get("signature").and_then(Value::as_str) {
            Some(signature) if !signature.is_empty() => SignOutcome::Success(Signature(signature.to_string())),
            _ => SignOutcome::Failed(Some("signer returned no signature".to_string())),
        },
        Some(STATUS_DENIED) => SignOutcome::Declined,
        _ => SignOutcome::Failed(error_detail(body)),
    }
}

/// `details[0].message`, then `message`, then `status`.
fn error_detail(body: &Value) -> Option<String> {
    body.get("details")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("message"))
        .or_else(|| body.get("message"))
        .or_else(|| body.get("status"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
