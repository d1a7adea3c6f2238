//! Structured events emitted by the engine after each committed transition.
//!
//! Notifiers (email, dashboards) subscribe to these. Events are published
//! only once the transaction has committed, and a failed delivery never
//! undoes the case change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CaseId, HierarchyLevel, MessageId, MessageType, Status, WorkerId};

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub case_id: CaseId,
    pub case_code: String,
    /// Who caused it.
    pub actor: WorkerId,
    pub timestamp: DateTime<Utc>,
    pub kind: CaseEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseEventKind {
    CaseCreated {
        subject: WorkerId,
        assigned_to: Option<WorkerId>,
        escalation_level: HierarchyLevel,
    },
    MessagePosted {
        message_id: MessageId,
        message_type: MessageType,
    },
    CaseEscalated {
        from: HierarchyLevel,
        to: HierarchyLevel,
        assigned_to: Option<WorkerId>,
        reason: String,
    },
    CaseAssigned {
        from: Option<WorkerId>,
        to: WorkerId,
    },
    StatusChanged {
        from: Status,
        to: Status,
    },
    ConfidentialityChanged {
        confidential: bool,
    },
}

impl CaseEvent {
    pub fn now(case_id: CaseId, case_code: &str, actor: WorkerId, kind: CaseEventKind) -> Self {
        Self {
            case_id,
            case_code: case_code.to_string(),
            actor,
            timestamp: Utc::now(),
            kind,
        }
    }
}
