//! Account resolution subsystem.
//!
//! # Data Flow
//! ```text
//! identity
//!     → resolver.rs (cache check under the identity lock)
//!     → lookup.rs (key → accounts, retried across read endpoints)
//!     → creation.rs (only when the key controls no account)
//!     → credential cache (append + persist)
//! ```
//!
//! # Design Decisions
//! - "No accounts" and "lookup failed" are different outcomes; only the first creates
//! - Created names are validated before they reach the cache

pub mod creation;
pub mod lookup;
pub mod resolver;

pub use creation::{AccountCreator, CreationError, HttpAccountCreator};
pub use lookup::{LookupError, LookupResult, RetryingLookup};
pub use resolver::{AccountLookup, AccountResolver, EndpointLookup, Resolution, ResolveError};
