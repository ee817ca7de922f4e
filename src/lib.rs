//! Custodial transaction signing for Antelope chains.
//!
//! Builds complete transactions from partial action lists, has a remote
//! custodial signer sign them, packs and optionally broadcasts the result,
//! and resolves a signed-in identity to its on-chain account.

pub mod accounts;
pub mod cache;
pub mod chain;
pub mod config;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod signer;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::schema::PipelineConfig;
pub use pipeline::{Pipeline, PipelineError, SessionUser, SignOptions};
