//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!     → spans.rs (per-request spans with correlation IDs)
//!
//! Consumers:
//!     → Log output (stderr)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every call made on behalf of one pipeline operation
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed
//! - Identities are never used as metric labels

pub mod logging;
pub mod metrics;
pub mod spans;
