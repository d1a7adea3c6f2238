//! Audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::case::CaseId;
use super::worker::WorkerId;
use crate::error::{Error, Result};

/// One recorded lifecycle transition. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseAction {
    pub id: i64,
    pub case_id: CaseId,
    pub actor: WorkerId,
    pub action_type: ActionType,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub acted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Create,
    Message,
    Escalate,
    Assign,
    Resolve,
    Close,
    Reopen,
    Update,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Create => "Create",
            ActionType::Message => "Message",
            ActionType::Escalate => "Escalate",
            ActionType::Assign => "Assign",
            ActionType::Resolve => "Resolve",
            ActionType::Close => "Close",
            ActionType::Reopen => "Reopen",
            ActionType::Update => "Update",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Create" => Ok(ActionType::Create),
            "Message" => Ok(ActionType::Message),
            "Escalate" => Ok(ActionType::Escalate),
            "Assign" => Ok(ActionType::Assign),
            "Resolve" => Ok(ActionType::Resolve),
            "Close" => Ok(ActionType::Close),
            "Reopen" => Ok(ActionType::Reopen),
            "Update" => Ok(ActionType::Update),
            _ => Err(Error::Other(format!("unknown action type in store: {s}"))),
        }
    }
}

/// An action about to be appended.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub case_id: CaseId,
    pub actor: WorkerId,
    pub action_type: ActionType,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NewAction {
    pub fn new(
        case_id: CaseId,
        actor: WorkerId,
        action_type: ActionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            case_id,
            actor,
            action_type,
            description: description.into(),
            old_value: None,
            new_value: None,
        }
    }

    pub fn change(mut self, old: impl ToString, new: impl ToString) -> Self {
        self.old_value = Some(old.to_string());
        self.new_value = Some(new.to_string());
        self
    }
}
