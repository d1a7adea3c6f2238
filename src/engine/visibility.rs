//! Who may see which cases and which messages.
//!
//! The rules are pure functions over a [`ViewerScope`], resolved once per
//! call from the viewer's hierarchy record and directorate. The engine
//! methods below only gather inputs and apply them.

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;

use crate::db::{cases, messages};
use crate::error::{Error, Result};
use crate::model::{Case, CaseId, HierarchyLevel, Message, MessageId, WorkerId};

/// A viewer's identity, level and (for heads of directorate) the workers in
/// their directorate.
#[derive(Debug, Clone)]
pub struct ViewerScope {
    pub worker: WorkerId,
    pub level: HierarchyLevel,
    pub directorate_members: HashSet<WorkerId>,
}

impl ViewerScope {
    pub fn new(worker: WorkerId, level: HierarchyLevel) -> Self {
        Self {
            worker,
            level,
            directorate_members: HashSet::new(),
        }
    }

    pub fn with_directorate_members(mut self, members: impl IntoIterator<Item = WorkerId>) -> Self {
        self.directorate_members = members.into_iter().collect();
        self
    }

    pub fn can_see_case(&self, case: &Case) -> bool {
        if !case.is_active {
            return false;
        }
        let me = self.worker;
        match self.level {
            HierarchyLevel::PastorInCharge => true,
            HierarchyLevel::HeadOfService => {
                (case.escalation_level >= HierarchyLevel::HeadOfService && !case.is_confidential)
                    || case.subject == me
                    || case.created_by == me
            }
            HierarchyLevel::HeadOfDirectorate => {
                (!case.is_confidential
                    && (case.subject == me || self.directorate_members.contains(&case.subject)))
                    || case.created_by == me
            }
            HierarchyLevel::Worker => {
                case.subject == me
                    || (case.escalation_level == HierarchyLevel::Worker
                        && case.assigned_to == Some(me))
            }
        }
    }

    /// Per-message rule. `case` must be the message's own case.
    pub fn can_see_message(&self, message: &Message, case: &Case) -> bool {
        if message.sender == self.worker {
            return true;
        }
        let audience = message.visible_to;
        if case.subject == self.worker
            && !message.is_confidential
            && audience.contains(HierarchyLevel::Worker)
        {
            return true;
        }
        if !message.is_confidential
            && audience.min().is_some_and(|narrowest| self.level > narrowest)
        {
            return true;
        }
        audience.contains(self.level)
    }
}

impl super::Engine {
    /// Resolve the viewer's scope. Directorate membership is only looked up
    /// for heads of directorate, the one level whose rule needs it.
    pub async fn viewer_scope(&self, viewer: WorkerId) -> Result<ViewerScope> {
        let record = self.get_or_create(viewer).await?;
        let scope = ViewerScope::new(viewer, record.level);
        match (record.level, record.directorate) {
            (HierarchyLevel::HeadOfDirectorate, Some(directorate)) => Ok(scope
                .with_directorate_members(self.directory.directorate_members(directorate).await?)),
            _ => Ok(scope),
        }
    }

    /// Active cases the viewer may see, newest first.
    pub async fn visible_cases(&self, viewer: WorkerId) -> Result<Vec<Case>> {
        let scope = self.viewer_scope(viewer).await?;
        let mut conn = self.db.pool().acquire().await?;
        let all = cases::list_active_on(&mut conn).await?;
        Ok(all.into_iter().filter(|c| scope.can_see_case(c)).collect())
    }

    /// Whether `case_id` is among the viewer's visible cases. A missing case
    /// is simply not visible.
    pub async fn can_view_case(&self, case_id: CaseId, viewer: WorkerId) -> Result<bool> {
        let scope = self.viewer_scope(viewer).await?;
        let mut conn = self.db.pool().acquire().await?;
        match cases::get_case_on(&mut conn, case_id).await {
            Ok(case) => Ok(scope.can_see_case(&case)),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The slice of a case's thread the viewer may see, in thread order.
    ///
    /// Messages returned to someone other than their sender are marked read.
    pub async fn visible_messages(&self, case_id: CaseId, viewer: WorkerId) -> Result<Vec<Message>> {
        let scope = self.viewer_scope(viewer).await?;
        let case = self.db.get_case(case_id).await?;
        let mut visible: Vec<Message> = self
            .db
            .thread(case_id)
            .await?
            .into_iter()
            .filter(|m| scope.can_see_message(m, &case))
            .collect();

        let unread: Vec<MessageId> = visible
            .iter()
            .filter(|m| m.sender != viewer && !m.is_read)
            .map(|m| m.id)
            .collect();
        if unread.is_empty() {
            return Ok(visible);
        }

        let read_at = Utc::now();
        let unread_ref = unread.as_slice();
        let marked = self
            .db
            .retrying("messages.mark_read", move || async move {
                let mut conn = self.db.pool().acquire().await?;
                messages::mark_read_on(&mut conn, unread_ref, read_at).await
            })
            .await?;
        debug!(case = %case_id, viewer = %viewer, marked, "marked messages read");

        for message in visible.iter_mut().filter(|m| unread.contains(&m.id)) {
            message.is_read = true;
            message.read_at = Some(read_at);
        }
        Ok(visible)
    }
}
