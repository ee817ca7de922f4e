//! Transaction assembly from a partial action list.
//!
//! # Responsibilities
//! - Fetch chain info and derive the replay-protection header
//! - Fetch every referenced contract ABI (concurrently)
//! - Encode structured action data against its ABI
//! - Fill every optional field with caller overrides or defaults

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::chain::abi::Abi;
use crate::chain::client::ChainApi;
use crate::chain::name::Name;
use crate::chain::types::{ChainError, HexBytes, TimePointSec};

/// Authorization of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

/// Action payload: either still structured or already ABI-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionData {
    Encoded(HexBytes),
    Structured(Value),
}

impl ActionData {
    pub fn encoded(&self) -> Option<&[u8]> {
        match self {
            ActionData::Encoded(bytes) => Some(bytes.as_slice()),
            ActionData::Structured(_) => None,
        }
    }
}

impl Default for ActionData {
    fn default() -> Self {
        ActionData::Encoded(HexBytes::default())
    }
}

/// A contract action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    #[serde(default)]
    pub authorization: Vec<PermissionLevel>,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionExtension {
    #[serde(rename = "type")]
    pub ext_type: u16,
    pub data: HexBytes,
}

/// A complete, unsigned transaction. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub expiration: TimePointSec,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub max_net_usage_words: u32,
    pub max_cpu_usage_ms: u8,
    pub delay_sec: u32,
    pub context_free_actions: Vec<Action>,
    pub actions: Vec<Action>,
    pub transaction_extensions: Vec<TransactionExtension>,
}

/// Caller-supplied values that replace derived or default fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOverrides {
    pub expiration: Option<TimePointSec>,
    pub ref_block_num: Option<u16>,
    pub ref_block_prefix: Option<u32>,
    pub max_net_usage_words: Option<u32>,
    pub max_cpu_usage_ms: Option<u8>,
    pub delay_sec: Option<u32>,
    pub context_free_actions: Option<Vec<Action>>,
    pub transaction_extensions: Option<Vec<TransactionExtension>>,
}

/// Errors raised while building a transaction. None leave partial output.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("transaction has no actions")]
    NoActions,

    #[error("chain info unavailable: {0}")]
    ChainInfoUnavailable(ChainError),

    #[error("failed to fetch ABI for '{contract}': {detail}")]
    AbiFetchFailed { contract: Name, detail: String },

    #[error("cannot encode '{contract}::{action}': {detail}")]
    Encoding {
        contract: Name,
        action: Name,
        detail: String,
    },
}

/// Builds complete transactions against live chain metadata.
#[derive(Clone)]
pub struct TransactionBuilder {
    chain: Arc<dyn ChainApi>,
    expiration_secs: u32,
}

impl TransactionBuilder {
    pub fn new(chain: Arc<dyn ChainApi>, expiration_secs: u32) -> Self {
        Self {
            chain,
            expiration_secs,
        }
    }

    pub fn expiration_secs(&self) -> u32 {
        self.expiration_secs
    }

    /// Build a complete transaction from `actions`, preserving their order.
    pub async fn build(
        &self,
        actions: Vec<Action>,
        overrides: TransactionOverrides,
    ) -> Result<RawTransaction, BuildError> {
        if actions.is_empty() {
            return Err(BuildError::NoActions);
        }

        let info = self
            .chain
            .get_info()
            .await
            .map_err(BuildError::ChainInfoUnavailable)?;
        let header = info
            .transaction_header(self.expiration_secs)
            .map_err(BuildError::ChainInfoUnavailable)?;

        let context_free_actions = overrides.context_free_actions.unwrap_or_default();
        let contracts: BTreeSet<Name> = actions
            .iter()
            .chain(context_free_actions.iter())
            .map(|a| a.account)
            .collect();
        let abis = self.fetch_abis(contracts).await?;

        let actions = encode_actions(actions, &abis)?;
        let context_free_actions = encode_actions(context_free_actions, &abis)?;

        tracing::debug!(
            actions = actions.len(),
            contracts = abis.len(),
            expiration = %header.expiration,
            ref_block_num = header.ref_block_num,
            "Transaction assembled"
        );

        Ok(RawTransaction {
            expiration: overrides.expiration.unwrap_or(header.expiration),
            ref_block_num: overrides.ref_block_num.unwrap_or(header.ref_block_num),
            ref_block_prefix: overrides.ref_block_prefix.unwrap_or(header.ref_block_prefix),
            max_net_usage_words: overrides.max_net_usage_words.unwrap_or(0),
            max_cpu_usage_ms: overrides.max_cpu_usage_ms.unwrap_or(0),
            delay_sec: overrides.delay_sec.unwrap_or(0),
            context_free_actions,
            actions,
            transaction_extensions: overrides.transaction_extensions.unwrap_or_default(),
        })
    }

    /// Fetch all ABIs concurrently; the first failure fails the whole set.
    async fn fetch_abis(&self, contracts: BTreeSet<Name>) -> Result<HashMap<Name, Abi>, BuildError> {
        let fetches = contracts.into_iter().map(|contract| {
            let chain = self.chain.clone();
            async move {
                match chain.get_abi(contract).await {
                    Ok(Some(def)) => Ok((contract, Abi::new(def))),
                    Ok(None) => Err(BuildError::AbiFetchFailed {
                        contract,
                        detail: "account has no ABI".to_string(),
                    }),
                    Err(e) => {
                        tracing::warn!(contract = %contract, error = %e, "ABI fetch failed");
                        Err(BuildError::AbiFetchFailed {
                            contract,
                            detail: e.to_string(),
                        })
                    }
                }
            }
        });
        Ok(try_join_all(fetches).await?.into_iter().collect())
    }
}

fn encode_actions(actions: Vec<Action>, abis: &HashMap<Name, Abi>) -> Result<Vec<Action>, BuildError> {
    actions
        .into_iter()
        .map(|action| encode_action(action, abis))
        .collect()
}

fn encode_action(mut action: Action, abis: &HashMap<Name, Abi>) -> Result<Action, BuildError> {
    let value = match &action.data {
        ActionData::Encoded(_) => return Ok(action),
        ActionData::Structured(value) => value,
    };
    let abi = abis.get(&action.account).ok_or_else(|| BuildError::AbiFetchFailed {
        contract: action.account,
        detail: "ABI missing from fetched set".to_string(),
    })?;
    let bytes = abi
        .encode_action_data(&action.name.to_string(), value)
        .map_err(|e| BuildError::Encoding {
            contract: action.account,
            action: action.name,
            detail: e.to_string(),
        })?;
    action.data = ActionData::Encoded(HexBytes(bytes));
    Ok(action)
}
