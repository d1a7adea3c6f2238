//! Error types for accountability-rs.

use thiserror::Error;

use crate::model::{CaseId, HierarchyLevel, WorkerId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// The actor's hierarchy level is too low for the requested transition.
    #[error(
        "worker {worker} ({level}) lacks authority to {action} case {case}: requires {required} or above"
    )]
    Authorization {
        case: CaseId,
        worker: WorkerId,
        level: HierarchyLevel,
        required: HierarchyLevel,
        action: &'static str,
    },

    /// The operation is illegal for the case's current status or escalation level.
    #[error("case {case}: {reason}")]
    InvalidState { case: CaseId, reason: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage contention on {operation} persisted after {attempts} attempts")]
    TransientStorage {
        operation: &'static str,
        attempts: u32,
    },

    /// Optimistic concurrency token mismatch on a case row. Retried by `Db::retrying`.
    #[error("case {0} was modified concurrently")]
    Conflict(CaseId),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether re-running the whole transaction could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Storage(sqlx::Error::PoolTimedOut) => true,
            Error::Storage(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                matches!(primary, Some(5) | Some(6)) || db.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
