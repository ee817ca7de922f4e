//! Binary packing and broadcast of signed transactions.
//!
//! # Wire layout
//! ```text
//! expiration u32 | ref_block_num u16 | ref_block_prefix u32
//! max_net_usage_words varuint32 | max_cpu_usage_ms u8 | delay_sec varuint32
//! context_free_actions | actions | transaction_extensions
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::client::ChainApi;
use crate::chain::serializer::{ByteReader, ByteWriter, CodecError};
use crate::chain::transaction::{Action, ActionData, PermissionLevel, RawTransaction, TransactionExtension};
use crate::chain::types::{ChainResult, HexBytes, TimePointSec};
use crate::observability::metrics;

/// Signature string as produced by the remote signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("action '{contract}::{action}' has unencoded data")]
    UnencodedAction { contract: String, action: String },

    #[error("malformed packed transaction: {0}")]
    Malformed(#[from] CodecError),
}

/// Signed transaction in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedTransaction {
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub compression: u8,
    #[serde(default)]
    pub packed_context_free_data: HexBytes,
    pub packed_trx: HexBytes,
}

impl PackedTransaction {
    /// Pack `tx` together with its single signature.
    pub fn from_signed(tx: &RawTransaction, signature: Signature) -> Result<Self, PackError> {
        Ok(Self {
            signatures: vec![signature],
            compression: 0,
            packed_context_free_data: HexBytes::default(),
            packed_trx: HexBytes(pack_transaction(tx)?),
        })
    }

    pub fn unpack(&self) -> Result<RawTransaction, PackError> {
        unpack_transaction(self.packed_trx.as_slice())
    }
}

/// Normalized outcome of a sign-and-maybe-broadcast call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub was_broadcast: bool,
    pub transaction_id: String,
    pub status: String,
    pub transaction: PackedTransaction,
}

impl PushResult {
    pub fn unbroadcast(transaction: PackedTransaction) -> Self {
        Self {
            was_broadcast: false,
            transaction_id: String::new(),
            status: String::new(),
            transaction,
        }
    }
}

fn write_action(w: &mut ByteWriter, action: &Action) -> Result<(), PackError> {
    let data = action.data.encoded().ok_or_else(|| PackError::UnencodedAction {
        contract: action.account.to_string(),
        action: action.name.to_string(),
    })?;
    w.write_name(action.account);
    w.write_name(action.name);
    w.write_varuint32(action.authorization.len() as u32);
    for level in &action.authorization {
        w.write_name(level.actor);
        w.write_name(level.permission);
    }
    w.write_bytes(data);
    Ok(())
}

fn write_actions(w: &mut ByteWriter, actions: &[Action]) -> Result<(), PackError> {
    w.write_varuint32(actions.len() as u32);
    for action in actions {
        write_action(w, action)?;
    }
    Ok(())
}

fn read_action(r: &mut ByteReader<'_>) -> Result<Action, CodecError> {
    let account = r.read_name()?;
    let name = r.read_name()?;
    let count = r.read_varuint32()? as usize;
    let mut authorization = Vec::with_capacity(count.min(r.remaining() / 16));
    for _ in 0..count {
        authorization.push(PermissionLevel {
            actor: r.read_name()?,
            permission: r.read_name()?,
        });
    }
    let data = r.read_bytes()?.to_vec();
    Ok(Action {
        account,
        name,
        authorization,
        data: ActionData::Encoded(HexBytes(data)),
    })
}

fn read_actions(r: &mut ByteReader<'_>) -> Result<Vec<Action>, CodecError> {
    let count = r.read_varuint32()? as usize;
    let mut actions = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        actions.push(read_action(r)?);
    }
    Ok(actions)
}

/// Serialize a transaction in canonical field order.
pub fn pack_transaction(tx: &RawTransaction) -> Result<Vec<u8>, PackError> {
    let mut w = ByteWriter::new();
    w.write_u32(tx.expiration.0);
    w.write_u16(tx.ref_block_num);
    w.write_u32(tx.ref_block_prefix);
    w.write_varuint32(tx.max_net_usage_words);
    w.write_u8(tx.max_cpu_usage_ms);
    w.write_varuint32(tx.delay_sec);
    write_actions(&mut w, &tx.context_free_actions)?;
    write_actions(&mut w, &tx.actions)?;
    w.write_varuint32(tx.transaction_extensions.len() as u32);
    for ext in &tx.transaction_extensions {
        w.write_u16(ext.ext_type);
        w.write_bytes(ext.data.as_slice());
    }
    Ok(w.into_bytes())
}

/// Inverse of [`pack_transaction`].
pub fn unpack_transaction(bytes: &[u8]) -> Result<RawTransaction, PackError> {
    let mut r = ByteReader::new(bytes);
    let expiration = TimePointSec(r.read_u32()?);
    let ref_block_num = r.read_u16()?;
    let ref_block_prefix = r.read_u32()?;
    let max_net_usage_words = r.read_varuint32()?;
    let max_cpu_usage_ms = r.read_u8()?;
    let delay_sec = r.read_varuint32()?;
    let context_free_actions = read_actions(&mut r)?;
    let actions = read_actions(&mut r)?;
    let ext_count = r.read_varuint32()? as usize;
    let mut transaction_extensions = Vec::with_capacity(ext_count.min(r.remaining()));
    for _ in 0..ext_count {
        let ext_type = r.read_u16()?;
        let data = r.read_bytes()?.to_vec();
        transaction_extensions.push(TransactionExtension {
            ext_type,
            data: HexBytes(data),
        });
    }
    r.finish()?;

    Ok(RawTransaction {
        expiration,
        ref_block_num,
        ref_block_prefix,
        max_net_usage_words,
        max_cpu_usage_ms,
        delay_sec,
        context_free_actions,
        actions,
        transaction_extensions,
    })
}

/// Submits packed transactions, or hands them back untouched.
#[derive(Clone)]
pub struct Broadcaster {
    chain: Arc<dyn ChainApi>,
}

impl Broadcaster {
    pub fn new(chain: Arc<dyn ChainApi>) -> Self {
        Self { chain }
    }

    /// Submit once when `broadcast` is set. Node failures are returned as-is.
    pub async fn submit(&self, packed: PackedTransaction, broadcast: bool) -> ChainResult<PushResult> {
        if !broadcast {
            tracing::debug!("Broadcast disabled, returning packed transaction");
            return Ok(PushResult::unbroadcast(packed));
        }

        match self.chain.push_transaction(&packed).await {
            Ok(response) => {
                metrics::record_broadcast("accepted");
                let status = response
                    .processed
                    .receipt
                    .map(|r| r.status)
                    .unwrap_or_default();
                tracing::info!(
                    transaction_id = %response.transaction_id,
                    status = %status,
                    "Transaction accepted"
                );
                Ok(PushResult {
                    was_broadcast: true,
                    transaction_id: response.transaction_id,
                    status,
                    transaction: packed,
                })
            }
            Err(e) => {
                metrics::record_broadcast("rejected");
                tracing::warn!(error = %e, "Transaction push failed");
                Err(e)
            }
        }
    }
}
