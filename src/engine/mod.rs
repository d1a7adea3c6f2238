//! Core engine. The public API for cases, threads and visibility.
//!
//! The engine owns the database handle, the worker directory and the event
//! notifier. Every state change goes through here, inside one transaction,
//! and is re-run on storage contention by [`Db::retrying`].

pub mod aggregate;
pub mod hierarchy;
pub mod lifecycle;
pub mod visibility;

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::warn;

use crate::db::Db;
use crate::directory::WorkerDirectory;
use crate::event::CaseEvent;
use crate::notify::{Notifier, NullNotifier};
use crate::telemetry::metrics;

pub use aggregate::{CaseStatistics, DashboardCounts};
pub use hierarchy::resolve_level;
pub use lifecycle::{check_escalation, check_escalation_state};
pub use visibility::ViewerScope;

/// The accountability engine. Cheap to clone; clones share the pool.
pub struct Engine {
    db: Db,
    directory: Arc<dyn WorkerDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            directory: Arc::clone(&self.directory),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl Engine {
    pub fn new(db: Db, directory: Arc<dyn WorkerDirectory>) -> Self {
        Self {
            db,
            directory,
            notifier: Arc::new(NullNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn directory(&self) -> &dyn WorkerDirectory {
        self.directory.as_ref()
    }

    /// Hand a committed event to the notifier. Delivery failures are logged
    /// and dropped; the case change stands.
    fn publish(&self, event: CaseEvent) {
        if let Err(e) = self.notifier.notify(&event) {
            warn!(case = %event.case_id, error = %e, "event notification failed");
        }
    }
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
}
