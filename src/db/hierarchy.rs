//! Hierarchy record rows.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::model::*;

/// Fields of a record about to be materialized.
#[derive(Debug, Clone)]
pub(crate) struct NewHierarchy {
    pub worker: WorkerId,
    pub level: HierarchyLevel,
    pub directorate: Option<DirectorateId>,
    pub reports_to: Option<WorkerId>,
}

pub(crate) async fn find_active_on(
    conn: &mut SqliteConnection,
    worker: WorkerId,
) -> Result<Option<HierarchyRecord>> {
    let row: Option<HierarchyRow> = sqlx::query_as(
        "SELECT id, worker_id, level, directorate_id, reports_to, is_active, created_at, updated_at
         FROM worker_hierarchies WHERE worker_id = ? AND is_active = 1",
    )
    .bind(worker.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(HierarchyRow::try_into_record).transpose()
}

/// Insert an active record unless the worker already has one. Returns whether
/// this call won. The partial unique index settles concurrent inserts.
pub(crate) async fn insert_if_absent_on(
    conn: &mut SqliteConnection,
    new: &NewHierarchy,
) -> Result<bool> {
    let rows_affected = sqlx::query(
        "INSERT INTO worker_hierarchies (worker_id, level, directorate_id, reports_to, is_active, created_at)
         VALUES (?, ?, ?, ?, 1, ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(new.worker.0)
    .bind(i64::from(new.level.number()))
    .bind(new.directorate.map(|d| d.0))
    .bind(new.reports_to.map(|w| w.0))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(rows_affected == 1)
}

/// Soft-deactivate the worker's active record, if any.
pub(crate) async fn deactivate_on(conn: &mut SqliteConnection, worker: WorkerId) -> Result<()> {
    sqlx::query(
        "UPDATE worker_hierarchies SET is_active = 0, updated_at = ?
         WHERE worker_id = ? AND is_active = 1",
    )
    .bind(Utc::now())
    .bind(worker.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Every record ever materialized for a worker, oldest first.
pub(crate) async fn history_on(
    conn: &mut SqliteConnection,
    worker: WorkerId,
) -> Result<Vec<HierarchyRecord>> {
    let rows: Vec<HierarchyRow> = sqlx::query_as(
        "SELECT id, worker_id, level, directorate_id, reports_to, is_active, created_at, updated_at
         FROM worker_hierarchies WHERE worker_id = ? ORDER BY id",
    )
    .bind(worker.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(HierarchyRow::try_into_record).collect()
}

impl super::Db {
    /// All hierarchy records for a worker, active or not.
    pub async fn hierarchy_history(&self, worker: WorkerId) -> Result<Vec<HierarchyRecord>> {
        let mut conn = self.pool().acquire().await?;
        history_on(&mut conn, worker).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct HierarchyRow {
    id: i64,
    worker_id: i64,
    level: i64,
    directorate_id: Option<i64>,
    reports_to: Option<i64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl HierarchyRow {
    fn try_into_record(self) -> Result<HierarchyRecord> {
        Ok(HierarchyRecord {
            id: self.id,
            worker: WorkerId(self.worker_id),
            level: HierarchyLevel::try_from(self.level)?,
            directorate: self.directorate_id.map(DirectorateId),
            reports_to: self.reports_to.map(WorkerId),
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
