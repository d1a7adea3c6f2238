//! Metric instrument factories for accountability-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"accountability-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("accountability-rs")
}

/// Counter: cases opened.
/// Labels: `priority`, `creator_level`.
pub fn cases_created() -> Counter<u64> {
    meter()
        .u64_counter("accountability.cases.created")
        .with_description("Number of accountability cases opened")
        .build()
}

/// Counter: case status transitions.
/// Labels: `from`, `to`.
pub fn case_transitions() -> Counter<u64> {
    meter()
        .u64_counter("accountability.case.transitions")
        .with_description("Number of case status transitions")
        .build()
}

/// Counter: successful escalations.
/// Labels: `to_level`.
pub fn escalations() -> Counter<u64> {
    meter()
        .u64_counter("accountability.case.escalations")
        .with_description("Number of case escalations")
        .build()
}

/// Counter: messages appended to case threads.
/// Labels: `message_type`.
pub fn messages_posted() -> Counter<u64> {
    meter()
        .u64_counter("accountability.messages.posted")
        .with_description("Number of case messages posted")
        .build()
}

/// Counter: transactions re-run after storage contention.
/// Labels: `operation`.
pub fn storage_retries() -> Counter<u64> {
    meter()
        .u64_counter("accountability.storage.retries")
        .with_description("Number of retried storage transactions")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("accountability.operation.duration_ms")
        .with_description("Engine operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
