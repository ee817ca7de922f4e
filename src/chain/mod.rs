//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! partial actions
//!     → transaction.rs (chain info header, ABI fetch, action encoding)
//!     → remote signer (outside this module)
//!     → packer.rs (binary packing, optional broadcast)
//!     → client.rs (node HTTP API with timeouts)
//! ```
//!
//! # Design Decisions
//! - Names are packed u64 values everywhere past the parsing boundary
//! - ABI encoding is driven by the contract's own ABI document, fetched per build
//! - Only read calls fail over; pushes go to the primary endpoint once

pub mod abi;
pub mod builtins;
pub mod client;
pub mod name;
pub mod packer;
pub mod serializer;
pub mod transaction;
pub mod types;

pub use abi::{Abi, AbiDef, AbiError};
pub use client::{ChainApi, ChainClient};
pub use name::Name;
pub use packer::{Broadcaster, PackedTransaction, PushResult, Signature};
pub use transaction::{
    Action, ActionData, BuildError, PermissionLevel, RawTransaction, TransactionBuilder,
    TransactionOverrides,
};
pub use types::{ChainError, ChainId, ChainInfo, ChainResult};
