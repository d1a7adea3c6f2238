//! Materialized hierarchy records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::HierarchyLevel;
use super::worker::{DirectorateId, WorkerId};

/// A worker's derived authority level. At most one active record per worker;
/// superseded records are deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyRecord {
    pub id: i64,
    pub worker: WorkerId,
    pub level: HierarchyLevel,
    pub directorate: Option<DirectorateId>,
    /// Looked up by id when needed; no live back-reference is held.
    pub reports_to: Option<WorkerId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
