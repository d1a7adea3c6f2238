//! Audit trail rows. Append-only; the schema rejects updates and deletes.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::Result;
use crate::model::*;

pub(crate) async fn insert_action_on(
    conn: &mut SqliteConnection,
    action: &NewAction,
    at: DateTime<Utc>,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO case_actions (case_id, actor_id, action_type, description, old_value, new_value, acted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(action.case_id.0)
    .bind(action.actor.0)
    .bind(action.action_type.to_string())
    .bind(&action.description)
    .bind(&action.old_value)
    .bind(&action.new_value)
    .bind(at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

impl super::Db {
    /// Audit trail of a case, newest first.
    pub async fn case_actions(&self, case_id: CaseId) -> Result<Vec<CaseAction>> {
        let rows: Vec<ActionRow> = sqlx::query_as(
            "SELECT id, case_id, actor_id, action_type, description, old_value, new_value, acted_at
             FROM case_actions WHERE case_id = ?
             ORDER BY id DESC",
        )
        .bind(case_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ActionRow::try_into_action).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    case_id: Uuid,
    actor_id: i64,
    action_type: String,
    description: String,
    old_value: Option<String>,
    new_value: Option<String>,
    acted_at: DateTime<Utc>,
}

impl ActionRow {
    fn try_into_action(self) -> Result<CaseAction> {
        Ok(CaseAction {
            id: self.id,
            case_id: CaseId(self.case_id),
            actor: WorkerId(self.actor_id),
            action_type: self.action_type.parse()?,
            description: self.description,
            old_value: self.old_value,
            new_value: self.new_value,
            acted_at: self.acted_at,
        })
    }
}
