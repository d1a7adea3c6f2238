//! Case rows: insert, lookup, and optimistic updates.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::*;

const CASE_COLUMNS: &str = "id, code, title, description, subject_id, created_by, assigned_to, priority, status, escalation_level, category, occurrence_date, due_date, created_at, updated_at, resolved_at, is_confidential, is_active, version";

pub(crate) async fn insert_case_on(conn: &mut SqliteConnection, case: &Case) -> Result<()> {
    sqlx::query(
        "INSERT INTO cases (id, code, title, description, subject_id, created_by, assigned_to, priority, status, escalation_level, category, occurrence_date, due_date, created_at, updated_at, resolved_at, is_confidential, is_active, version)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(case.id.0)
    .bind(&case.code)
    .bind(&case.title)
    .bind(&case.description)
    .bind(case.subject.0)
    .bind(case.created_by.0)
    .bind(case.assigned_to.map(|w| w.0))
    .bind(case.priority.to_string())
    .bind(case.status.to_string())
    .bind(i64::from(case.escalation_level.number()))
    .bind(&case.category)
    .bind(case.occurrence_date)
    .bind(case.due_date)
    .bind(case.created_at)
    .bind(case.updated_at)
    .bind(case.resolved_at)
    .bind(case.is_confidential)
    .bind(case.is_active)
    .bind(case.version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch an active case.
pub(crate) async fn get_case_on(conn: &mut SqliteConnection, id: CaseId) -> Result<Case> {
    let row: Option<CaseRow> = sqlx::query_as(&format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE id = ? AND is_active = 1"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| Error::NotFound(format!("case {id}")))?
        .try_into_case()
}

pub(crate) async fn get_case_by_code_on(conn: &mut SqliteConnection, code: &str) -> Result<Case> {
    let row: Option<CaseRow> = sqlx::query_as(&format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE code = ? AND is_active = 1"
    ))
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| Error::NotFound(format!("case {code}")))?
        .try_into_case()
}

pub(crate) async fn list_active_on(conn: &mut SqliteConnection) -> Result<Vec<Case>> {
    let rows: Vec<CaseRow> = sqlx::query_as(&format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE is_active = 1 ORDER BY created_at DESC, code"
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(CaseRow::try_into_case).collect()
}

/// Write the mutable fields of `case`, guarded by its version token.
///
/// Fails with `Error::Conflict` if another writer got there first. On
/// success `case.version` is advanced to the stored value.
pub(crate) async fn update_case_on(conn: &mut SqliteConnection, case: &mut Case) -> Result<()> {
    let rows_affected = sqlx::query(
        "UPDATE cases SET assigned_to = ?, status = ?, escalation_level = ?, updated_at = ?, resolved_at = ?, is_confidential = ?, is_active = ?, version = version + 1
         WHERE id = ? AND version = ?",
    )
    .bind(case.assigned_to.map(|w| w.0))
    .bind(case.status.to_string())
    .bind(i64::from(case.escalation_level.number()))
    .bind(case.updated_at)
    .bind(case.resolved_at)
    .bind(case.is_confidential)
    .bind(case.is_active)
    .bind(case.id.0)
    .bind(case.version)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(Error::Conflict(case.id));
    }
    case.version += 1;
    Ok(())
}

impl super::Db {
    /// Get an active case by ID.
    pub async fn get_case(&self, id: CaseId) -> Result<Case> {
        let mut conn = self.pool().acquire().await?;
        get_case_on(&mut conn, id).await
    }

    /// Get an active case by its `AC-...` code.
    pub async fn get_case_by_code(&self, code: &str) -> Result<Case> {
        let mut conn = self.pool().acquire().await?;
        get_case_by_code_on(&mut conn, code).await
    }

    /// All active cases, newest first.
    pub async fn list_active_cases(&self) -> Result<Vec<Case>> {
        let mut conn = self.pool().acquire().await?;
        list_active_on(&mut conn).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct CaseRow {
    id: Uuid,
    code: String,
    title: String,
    description: String,
    subject_id: i64,
    created_by: i64,
    assigned_to: Option<i64>,
    priority: String,
    status: String,
    escalation_level: i64,
    category: String,
    occurrence_date: NaiveDate,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    is_confidential: bool,
    is_active: bool,
    version: i64,
}

impl CaseRow {
    fn try_into_case(self) -> Result<Case> {
        Ok(Case {
            id: CaseId(self.id),
            code: self.code,
            title: self.title,
            description: self.description,
            subject: WorkerId(self.subject_id),
            created_by: WorkerId(self.created_by),
            assigned_to: self.assigned_to.map(WorkerId),
            priority: self.priority.parse()?,
            status: self.status.parse()?,
            escalation_level: HierarchyLevel::try_from(self.escalation_level)?,
            category: self.category,
            occurrence_date: self.occurrence_date,
            due_date: self.due_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
            is_confidential: self.is_confidential,
            is_active: self.is_active,
            version: self.version,
        })
    }
}
