//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Lookup against a list of endpoints:
//!     → retries.rs (attempt budget per endpoint, per-attempt deadline)
//!     → backoff.rs (delay between attempts on the same endpoint)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Only idempotent reads are retried; signing and pushes never are
//! - Backoff sleeps never block the runtime

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::RetryPolicy;
