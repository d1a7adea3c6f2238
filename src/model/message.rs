//! Case thread messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::case::CaseId;
use super::level::LevelSet;
use super::worker::WorkerId;
use crate::error::{Error, Result};

/// One entry in a case's thread. Content is immutable once written; only the
/// read-tracking fields change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Insertion sequence. Breaks ties between equal `sent_at` values.
    pub id: MessageId,
    pub case_id: CaseId,
    pub sender: WorkerId,
    pub message_type: MessageType,
    pub content: String,
    pub visible_to: LevelSet,
    /// Always a message in the same case.
    pub reply_to: Option<MessageId>,
    pub attachment: Option<Attachment>,
    pub is_confidential: bool,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to bytes held by the external attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Question,
    Response,
    Guidance,
    /// Moves the case to `Escalated`.
    Warning,
    /// System-generated on escalation.
    Escalation,
    /// Moves the case to `Resolved`.
    Resolution,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Question => "Question",
            MessageType::Response => "Response",
            MessageType::Guidance => "Guidance",
            MessageType::Warning => "Warning",
            MessageType::Escalation => "Escalation",
            MessageType::Resolution => "Resolution",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "question" => Ok(MessageType::Question),
            "response" => Ok(MessageType::Response),
            "guidance" => Ok(MessageType::Guidance),
            "warning" => Ok(MessageType::Warning),
            "escalation" => Ok(MessageType::Escalation),
            "resolution" => Ok(MessageType::Resolution),
            _ => Err(Error::Validation(format!("unknown message type: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// A reply with a caller-chosen audience. Passed to `Engine::respond`.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub(crate) message_type: MessageType,
    pub(crate) content: String,
    pub(crate) visible_to: LevelSet,
    pub(crate) reply_to: Option<MessageId>,
    pub(crate) attachment: Option<Attachment>,
    pub(crate) confidential: bool,
}

impl NewResponse {
    pub fn new(message_type: MessageType, content: impl Into<String>, visible_to: LevelSet) -> Self {
        Self {
            message_type,
            content: content.into(),
            visible_to,
            reply_to: None,
            attachment: None,
            confidential: false,
        }
    }

    pub fn reply_to(mut self, message: MessageId) -> Self {
        self.reply_to = Some(message);
        self
    }

    pub fn attachment(mut self, path: impl Into<String>, name: impl Into<String>) -> Self {
        self.attachment = Some(Attachment {
            path: path.into(),
            name: name.into(),
        });
        self
    }

    pub fn confidential(mut self, confidential: bool) -> Self {
        self.confidential = confidential;
        self
    }
}
