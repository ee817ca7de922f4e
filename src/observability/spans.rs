//! Per-request spans.

use tracing::Span;
use uuid::Uuid;

/// Span for one pipeline operation, tagged with a fresh request id.
pub fn request_span(operation: &'static str) -> Span {
    let request_id = Uuid::new_v4();
    tracing::info_span!("pipeline", operation, request_id = %request_id)
}
