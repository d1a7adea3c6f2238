//! Accountability cases.
//!
//! A case holds one worker (the subject) accountable for a conduct or task
//! issue. Its escalation level only ever rises; its status follows the
//! lifecycle in [`Status::can_transition_to`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::level::HierarchyLevel;
use super::worker::WorkerId;
use crate::error::{Error, Result};

pub const MAX_TITLE_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,

    /// Human-facing code, e.g. `AC-20261019-3F2A9C1B`.
    pub code: String,

    pub title: String,
    pub description: String,

    /// Who is being held accountable.
    pub subject: WorkerId,
    pub created_by: WorkerId,
    /// Who should respond next.
    pub assigned_to: Option<WorkerId>,

    pub priority: Priority,
    pub status: Status,
    pub escalation_level: HierarchyLevel,
    pub category: String,

    pub occurrence_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,

    pub is_confidential: bool,
    pub is_active: bool,

    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl Case {
    /// Past its due date and still unsettled.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < today) && !self.status.is_settled()
    }
}

/// Newtype for case IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub Uuid);

impl CaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// `AC-<yyyymmdd>-<8 upper-case hex>`.
pub fn generate_case_code(id: CaseId, now: DateTime<Utc>) -> String {
    let hex = id.0.simple().to_string().to_uppercase();
    format!("AC-{}-{}", now.format("%Y%m%d"), &hex[..8])
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    InProgress,
    Escalated,
    Resolved,
    Closed,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Open, InProgress)
                | (Open, Escalated)
                | (Open, Resolved)
                | (InProgress, Escalated)
                | (InProgress, Resolved)
                | (Escalated, Resolved)
                | (Resolved, Closed)
                | (Resolved, Open)      // reopen
                | (Closed, Open) // reopen
        )
    }

    /// Resolved or closed: no further escalation.
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }

    /// Closed: the thread is frozen until the case is reopened.
    pub fn is_terminal(self) -> bool {
        self == Status::Closed
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Open => "Open",
            Status::InProgress => "InProgress",
            Status::Escalated => "Escalated",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "open" => Ok(Status::Open),
            "inprogress" => Ok(Status::InProgress),
            "escalated" => Ok(Status::Escalated),
            "resolved" => Ok(Status::Resolved),
            "closed" => Ok(Status::Closed),
            _ => Err(Error::Validation(format!("unknown case status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(Error::Validation(format!("unknown priority: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for opening a case. Passed to `Engine::create_case` with the creator.
#[derive(Debug, Clone)]
pub struct NewCase {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) subject: WorkerId,
    pub(crate) priority: Priority,
    pub(crate) category: String,
    pub(crate) occurrence_date: Option<NaiveDate>,
    pub(crate) due_date: Option<NaiveDate>,
    pub(crate) confidential: bool,
}

impl NewCase {
    pub fn new(title: impl Into<String>, description: impl Into<String>, subject: WorkerId) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            subject,
            priority: Priority::default(),
            category: "General".to_string(),
            occurrence_date: None,
            due_date: None,
            confidential: false,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Defaults to the creation date.
    pub fn occurred_on(mut self, date: NaiveDate) -> Self {
        self.occurrence_date = Some(date);
        self
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn confidential(mut self, confidential: bool) -> Self {
        self.confidential = confidential;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("case title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::Validation(format!(
                "case title cannot exceed {MAX_TITLE_LEN} characters"
            )));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation("case description is required".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation("case category is required".to_string()));
        }
        Ok(())
    }
}
