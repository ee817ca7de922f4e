//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and value ranges (timeouts > 0, attempts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use url::Url;

use crate::config::schema::PipelineConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e))),
    }
}

pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let chain = &config.chain;
    check_url("chain.rpc_url", &chain.rpc_url, &mut errors);
    for (i, url) in chain.failover_urls.iter().enumerate() {
        check_url(&format!("chain.failover_urls[{}]", i), url, &mut errors);
    }
    for (i, url) in chain.read_endpoints.iter().enumerate() {
        check_url(&format!("chain.read_endpoints[{}]", i), url, &mut errors);
    }
    if !chain.chain_id.is_empty()
        && (chain.chain_id.len() != 64 || !chain.chain_id.chars().all(|c| c.is_ascii_hexdigit()))
    {
        errors.push(ValidationError::new("chain.chain_id", "must be 64 hex characters"));
    }
    if chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be greater than 0"));
    }
    if chain.expiration_secs == 0 {
        errors.push(ValidationError::new("chain.expiration_secs", "must be greater than 0"));
    }

    let lookup = &config.lookup;
    if lookup.max_attempts == 0 {
        errors.push(ValidationError::new("lookup.max_attempts", "must be greater than 0"));
    }
    if lookup.attempt_timeout_ms == 0 {
        errors.push(ValidationError::new("lookup.attempt_timeout_ms", "must be greater than 0"));
    }
    if lookup.max_delay_ms < lookup.base_delay_ms {
        errors.push(ValidationError::new(
            "lookup.max_delay_ms",
            "must not be less than base_delay_ms",
        ));
    }

    if !config.signer.bridge_url.is_empty() {
        check_url("signer.bridge_url", &config.signer.bridge_url, &mut errors);
        if config.signer.timeout_secs == 0 {
            errors.push(ValidationError::new("signer.timeout_secs", "must be greater than 0"));
        }
    }
    if !config.account_creation.url.is_empty() {
        check_url("account_creation.url", &config.account_creation.url, &mut errors);
    }

    if config.cache.key_prefix.is_empty() {
        errors.push(ValidationError::new("cache.key_prefix", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
