//! Read-side counts over a viewer's visible cases. Recomputed on every call.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::{Case, Status, WorkerId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaseStatistics {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub escalated: usize,
    pub resolved: usize,
    pub closed: usize,
    pub overdue: usize,
    pub created_by_me: usize,
    pub assigned_to_me: usize,
    pub subject_is_me: usize,
}

/// The four dashboard counters. Settled cases are left out of all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub total: usize,
    pub assigned_to_me: usize,
    /// Cases the viewer raised or is the subject of.
    pub my_feedback: usize,
    pub overdue: usize,
}

pub fn statistics(cases: &[Case], viewer: WorkerId, today: NaiveDate) -> CaseStatistics {
    let mut stats = CaseStatistics {
        total: cases.len(),
        ..Default::default()
    };
    for case in cases {
        match case.status {
            Status::Open => stats.open += 1,
            Status::InProgress => stats.in_progress += 1,
            Status::Escalated => stats.escalated += 1,
            Status::Resolved => stats.resolved += 1,
            Status::Closed => stats.closed += 1,
        }
        stats.overdue += usize::from(case.is_overdue(today));
        stats.created_by_me += usize::from(case.created_by == viewer);
        stats.assigned_to_me += usize::from(case.assigned_to == Some(viewer));
        stats.subject_is_me += usize::from(case.subject == viewer);
    }
    stats
}

pub fn dashboard_counts(cases: &[Case], viewer: WorkerId, today: NaiveDate) -> DashboardCounts {
    let unsettled = || cases.iter().filter(|c| !c.status.is_settled());
    DashboardCounts {
        total: unsettled().count(),
        assigned_to_me: unsettled().filter(|c| c.assigned_to == Some(viewer)).count(),
        my_feedback: unsettled()
            .filter(|c| c.subject == viewer || c.created_by == viewer)
            .count(),
        overdue: unsettled().filter(|c| c.is_overdue(today)).count(),
    }
}

impl super::Engine {
    pub async fn statistics(&self, viewer: WorkerId) -> Result<CaseStatistics> {
        let cases = self.visible_cases(viewer).await?;
        Ok(statistics(&cases, viewer, Utc::now().date_naive()))
    }

    pub async fn dashboard_counts(&self, viewer: WorkerId) -> Result<DashboardCounts> {
        let cases = self.visible_cases(viewer).await?;
        Ok(dashboard_counts(&cases, viewer, Utc::now().date_naive()))
    }
}
