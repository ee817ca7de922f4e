//! Chain-specific types and error definitions.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Chain ID (hex-encoded sha256 of the genesis state).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChainId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when talking to a chain node.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Transport failure or every endpoint failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node answered with an error payload.
    #[error("{0}")]
    Rejected(String),

    /// The node answered with something we could not interpret.
    #[error("Invalid node response: {0}")]
    InvalidResponse(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Seconds since the unix epoch, rendered as `YYYY-MM-DDTHH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePointSec(pub u32);

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl TimePointSec {
    /// Round a millisecond timestamp to the nearest second.
    pub fn from_millis(millis: i64) -> Self {
        let secs = (millis + 500).div_euclid(1000);
        Self(secs.clamp(0, u32::MAX as i64) as u32)
    }
}

/// Parse a node timestamp such as `2024-05-01T12:00:00.500` into epoch millis.
pub fn parse_timestamp_millis(text: &str) -> Option<i64> {
    let trimmed = text.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp(self.0 as i64, 0) {
            Some(dt) => write!(f, "{}", dt.format(TIME_FORMAT)),
            None => Err(fmt::Error),
        }
    }
}

impl FromStr for TimePointSec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let millis = parse_timestamp_millis(s).ok_or_else(|| format!("invalid time_point_sec '{}'", s))?;
        if !(0..=(u32::MAX as i64) * 1000).contains(&millis) {
            return Err(format!("time_point_sec '{}' out of range", s));
        }
        Ok(Self((millis / 1000) as u32))
    }
}

impl Serialize for TimePointSec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimePointSec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Raw bytes carried as a hex string in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for HexBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map(Self).map_err(serde::de::Error::custom)
    }
}

/// Replay-protection header derived from a chain info snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    pub expiration: TimePointSec,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
}

/// Subset of `/v1/chain/get_info` the pipeline relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: ChainId,
    pub head_block_num: u32,
    pub head_block_time: String,
    pub last_irreversible_block_num: u32,
    pub last_irreversible_block_id: String,
    #[serde(default)]
    pub head_block_id: String,
    #[serde(default)]
    pub server_version_string: Option<String>,
}

impl ChainInfo {
    /// Derive a transaction header expiring `expire_secs` after the head block.
    pub fn transaction_header(&self, expire_secs: u32) -> ChainResult<TransactionHeader> {
        let head_millis = parse_timestamp_millis(&self.head_block_time).ok_or_else(|| {
            ChainError::InvalidResponse(format!("bad head_block_time '{}'", self.head_block_time))
        })?;
        let expiration = TimePointSec::from_millis(head_millis + expire_secs as i64 * 1000);

        let id = hex::decode(&self.last_irreversible_block_id).map_err(|e| {
            ChainError::InvalidResponse(format!("bad last_irreversible_block_id: {}", e))
        })?;
        if id.len() < 12 {
            return Err(ChainError::InvalidResponse(
                "last_irreversible_block_id is too short".to_string(),
            ));
        }
        let ref_block_prefix = u32::from_le_bytes([id[8], id[9], id[10], id[11]]);

        Ok(TransactionHeader {
            expiration,
            ref_block_num: (self.last_irreversible_block_num & 0xffff) as u16,
            ref_block_prefix,
        })
    }
}

/// Response of `/v1/chain/get_abi`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetAbiResponse {
    pub account_name: String,
    #[serde(default)]
    pub abi: Option<crate::chain::abi::AbiDef>,
}

/// Response of `/v1/chain/push_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTransactionResponse {
    pub transaction_id: String,
    pub processed: ProcessedTransaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    #[serde(default)]
    pub receipt: Option<TransactionReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub status: String,
}

/// One row of `/v1/chain/get_accounts_by_authorizers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedAccount {
    pub account_name: String,
    #[serde(default)]
    pub permission_name: String,
    #[serde(default)]
    pub authorizing_key: Option<String>,
}

/// Response of `/v1/chain/get_accounts_by_authorizers`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountsByAuthorizers {
    #[serde(default)]
    pub accounts: Vec<AuthorizedAccount>,
}

impl AccountsByAuthorizers {
    /// Account names in response order, without duplicates.
    pub fn unique_account_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for account in &self.accounts {
            if !account.account_name.is_empty() && !names.contains(&account.account_name) {
                names.push(account.account_name.clone());
            }
        }
        names
    }
}

/// Pull the most specific message out of a node error body.
///
/// Nodes answer with `{code, message, error: {what, details: [{message}]}}`.
pub fn node_error_detail(body: &serde_json::Value) -> Option<String> {
    let error = body.get("error");
    let detail = error
        .and_then(|e| e.get("details"))
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("message"))
        .and_then(|m| m.as_str());
    let what = error.and_then(|e| e.get("what")).and_then(|w| w.as_str());
    let message = body.get("message").and_then(|m| m.as_str());

    detail
        .or(what)
        .or(message)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
