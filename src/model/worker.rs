//! Worker references into the external directory.

use serde::{Deserialize, Serialize};

/// Identity of a worker in the external directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub i64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectorateId(pub i64);

impl std::fmt::Display for DirectorateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "directorate {}", self.0)
    }
}

/// What the directory knows about a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,

    #[serde(default)]
    pub name: String,

    /// Free-text role, e.g. "Head of Directorate". Drives the hierarchy level.
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub directorate: Option<DirectorateId>,

    #[serde(default)]
    pub department: Option<i64>,

    /// Immediate supervisor, by id only.
    #[serde(default)]
    pub supervisor: Option<WorkerId>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

impl WorkerRecord {
    pub fn new(id: i64, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: WorkerId(id),
            name: name.into(),
            role: role.into(),
            directorate: None,
            department: None,
            supervisor: None,
            email: None,
            is_active: true,
        }
    }

    pub fn in_directorate(mut self, directorate: i64) -> Self {
        self.directorate = Some(DirectorateId(directorate));
        self
    }

    pub fn reports_to(mut self, supervisor: i64) -> Self {
        self.supervisor = Some(WorkerId(supervisor));
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
