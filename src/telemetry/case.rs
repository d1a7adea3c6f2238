//! Case operation span helpers.

use tracing::Span;

use crate::model::{CaseId, WorkerId};

/// Start a span for an engine operation on a case.
///
/// `case.status` is declared empty and filled by [`record_transition`].
pub fn start_case_span(operation: &'static str, case_id: Option<CaseId>, actor: WorkerId) -> Span {
    let id = case_id.map(|id| id.0.to_string()).unwrap_or_default();
    tracing::info_span!(
        "case.operation",
        "case.operation" = operation,
        "case.id" = %id,
        "case.actor" = actor.0,
        "case.status" = tracing::field::Empty,
    )
}

/// Record a status transition on the span and emit an event inside it.
pub fn record_transition(span: &Span, from: &str, to: &str) {
    span.record("case.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
