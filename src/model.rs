//! Core data model.
//!
//! Cases, their message threads and audit trail, and the hierarchy records
//! that decide who sees what. Worker identities are foreign references into
//! the external directory; this crate never owns worker data.

pub mod action;
pub mod case;
pub mod hierarchy;
pub mod level;
pub mod message;
pub mod worker;

pub use action::{ActionType, CaseAction, NewAction};
pub use case::{Case, CaseId, NewCase, Priority, Status};
pub use hierarchy::HierarchyRecord;
pub use level::{HierarchyLevel, LevelSet};
pub use message::{Attachment, Message, MessageId, MessageType, NewResponse};
pub use worker::{DirectorateId, WorkerId, WorkerRecord};
