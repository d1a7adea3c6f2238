//! Hierarchy level derivation and lazy materialization.

use std::time::Instant;

use sqlx::SqliteConnection;
use tracing::{Instrument, debug, info};

use crate::db::hierarchy::{self, NewHierarchy};
use crate::directory::WorkerDirectory;
use crate::error::{Error, Result};
use crate::model::{HierarchyLevel, HierarchyRecord, WorkerId};
use crate::telemetry::case::start_case_span;

/// Role keywords, checked in order. The first rule with a matching keyword wins.
const ROLE_RULES: &[(&[&str], HierarchyLevel)] = &[
    (
        &["pastor in charge", "senior pastor", "head pastor"],
        HierarchyLevel::PastorInCharge,
    ),
    (
        &["head of service", "service head", "service leader"],
        HierarchyLevel::HeadOfService,
    ),
    (
        &["head of directorate", "directorate head", "directorate leader"],
        HierarchyLevel::HeadOfDirectorate,
    ),
    (
        &["director", "leader", "coordinator"],
        HierarchyLevel::HeadOfDirectorate,
    ),
];

/// Derive a hierarchy level from a free-text role title.
///
/// Case-insensitive substring match against [`ROLE_RULES`]; anything
/// unrecognized (including an empty title) is an ordinary worker.
pub fn resolve_level(role: &str) -> HierarchyLevel {
    let role = role.to_lowercase();
    ROLE_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| role.contains(k)))
        .map(|(_, level)| *level)
        .unwrap_or(HierarchyLevel::Worker)
}

/// Return the worker's active record, materializing it from the directory on
/// first use.
///
/// Concurrent callers race on the one-active-record index; the loser's
/// insert is a no-op and it reads back the winner's row.
pub(crate) async fn get_or_create_on(
    conn: &mut SqliteConnection,
    directory: &dyn WorkerDirectory,
    worker: WorkerId,
) -> Result<HierarchyRecord> {
    if let Some(record) = hierarchy::find_active_on(conn, worker).await? {
        return Ok(record);
    }

    let record = directory.get_worker(worker).await?;
    let new = NewHierarchy {
        worker,
        level: resolve_level(&record.role),
        directorate: record.directorate,
        reports_to: record.supervisor,
    };
    let won = hierarchy::insert_if_absent_on(conn, &new).await?;
    debug!(worker = %worker, level = %new.level, won, "materialized hierarchy record");

    hierarchy::find_active_on(conn, worker)
        .await?
        .ok_or_else(|| Error::Other(format!("hierarchy record for {worker} vanished after insert")))
}

impl super::Engine {
    /// The worker's active hierarchy record, created on first use.
    pub async fn get_or_create(&self, worker: WorkerId) -> Result<HierarchyRecord> {
        let directory = self.directory.as_ref();
        self.db
            .retrying("hierarchy.get_or_create", move || async move {
                let mut conn = self.db.pool().acquire().await?;
                get_or_create_on(&mut conn, directory, worker).await
            })
            .await
    }

    pub async fn hierarchy_level(&self, worker: WorkerId) -> Result<HierarchyLevel> {
        Ok(self.get_or_create(worker).await?.level)
    }

    /// Re-derive a worker's record after a role or placement change.
    ///
    /// The old record is deactivated and the new one inserted in the same
    /// transaction, so readers always see exactly one active record.
    pub async fn refresh_hierarchy(&self, worker: WorkerId) -> Result<HierarchyRecord> {
        let span = start_case_span("hierarchy.refresh", None, worker);
        let started = Instant::now();
        let directory = self.directory.as_ref();

        let record = self
            .db
            .retrying("hierarchy.refresh", move || async move {
                let source = directory.get_worker(worker).await?;
                let mut tx = self.db.begin().await?;
                hierarchy::deactivate_on(&mut tx, worker).await?;
                hierarchy::insert_if_absent_on(
                    &mut tx,
                    &NewHierarchy {
                        worker,
                        level: resolve_level(&source.role),
                        directorate: source.directorate,
                        reports_to: source.supervisor,
                    },
                )
                .await?;
                let record = hierarchy::find_active_on(&mut tx, worker).await?.ok_or_else(|| {
                    Error::Other(format!("hierarchy record for {worker} missing after refresh"))
                })?;
                tx.commit().await?;
                Ok(record)
            })
            .instrument(span)
            .await?;

        super::record_duration("hierarchy.refresh", started);
        info!(worker = %worker, level = %record.level, "hierarchy refreshed");
        Ok(record)
    }
}
