//! Statistics and dashboard counters.

use std::sync::Arc;

use accountability_rs::db::Db;
use accountability_rs::directory::InMemoryDirectory;
use accountability_rs::engine::Engine;
use accountability_rs::engine::aggregate::{dashboard_counts, statistics};
use accountability_rs::model::*;
use chrono::{Duration, NaiveDate, Utc};

const ME: WorkerId = WorkerId(7);
const OTHER: WorkerId = WorkerId(8);

fn case_with(status: Status, due: Option<NaiveDate>) -> Case {
    let now = Utc::now();
    let id = CaseId::new();
    Case {
        id,
        code: format!("AC-TEST-{id}"),
        title: "t".to_string(),
        description: "d".to_string(),
        subject: OTHER,
        created_by: OTHER,
        assigned_to: None,
        priority: Priority::Low,
        status,
        escalation_level: HierarchyLevel::Worker,
        category: "General".to_string(),
        occurrence_date: now.date_naive(),
        due_date: due,
        created_at: now,
        updated_at: now,
        resolved_at: None,
        is_confidential: false,
        is_active: true,
        version: 1,
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[test]
fn statistics_count_statuses_and_roles() {
    let yesterday = today() - Duration::days(1);
    let mut cases = vec![
        case_with(Status::Open, Some(yesterday)),
        case_with(Status::InProgress, Some(today())),
        case_with(Status::Escalated, None),
        case_with(Status::Resolved, Some(yesterday)),
        case_with(Status::Closed, None),
    ];
    cases[0].created_by = ME;
    cases[1].assigned_to = Some(ME);
    cases[2].subject = ME;
    cases[2].created_by = ME;

    let stats = statistics(&cases, ME, today());
    assert_eq!(stats.total, 5);
    assert_eq!(
        (stats.open, stats.in_progress, stats.escalated, stats.resolved, stats.closed),
        (1, 1, 1, 1, 1)
    );
    // Due today is not overdue; resolved cases never are.
    assert_eq!(stats.overdue, 1);
    assert_eq!(stats.created_by_me, 2);
    assert_eq!(stats.assigned_to_me, 1);
    assert_eq!(stats.subject_is_me, 1);
}

#[test]
fn statistics_of_nothing_is_zero() {
    let stats = statistics(&[], ME, today());
    assert_eq!(stats, Default::default());
}

#[test]
fn dashboard_ignores_settled_cases() {
    let yesterday = today() - Duration::days(1);
    let mut cases = vec![
        case_with(Status::Open, Some(yesterday)),
        case_with(Status::Resolved, Some(yesterday)),
        case_with(Status::Escalated, None),
    ];
    cases[0].assigned_to = Some(ME);
    cases[1].assigned_to = Some(ME);
    cases[1].subject = ME;
    cases[2].subject = ME;

    let counts = dashboard_counts(&cases, ME, today());
    assert_eq!(counts.total, 2);
    assert_eq!(counts.assigned_to_me, 1);
    assert_eq!(counts.my_feedback, 1);
    assert_eq!(counts.overdue, 1);
}

#[tokio::test]
async fn engine_statistics_follow_visibility() {
    let directory = InMemoryDirectory::with_workers([
        WorkerRecord::new(1, "Grace", "Pastor in Charge"),
        WorkerRecord::new(10, "Ama", "Head of Directorate").in_directorate(100),
        WorkerRecord::new(11, "Kofi", "Usher").in_directorate(100),
        WorkerRecord::new(12, "Efua", "Chorister").in_directorate(100),
    ]);
    let engine = Engine::new(Db::in_memory().await.unwrap(), Arc::new(directory));

    let case = engine
        .create_case(
            WorkerId(11),
            NewCase::new("Late", "Late again", WorkerId(12))
                .due(Utc::now().date_naive() - Duration::days(30)),
        )
        .await
        .unwrap();
    engine
        .create_case(WorkerId(10), NewCase::new("Absent", "No notice", WorkerId(11)))
        .await
        .unwrap();
    engine.escalate(case.id, WorkerId(10), "overdue").await.unwrap();

    let pastor = engine.statistics(WorkerId(1)).await.unwrap();
    assert_eq!(pastor.total, 2);
    assert_eq!(pastor.open, 1);
    assert_eq!(pastor.escalated, 1);
    assert_eq!(pastor.overdue, 1);

    let subject = engine.statistics(WorkerId(12)).await.unwrap();
    assert_eq!(subject.total, 1);
    assert_eq!(subject.subject_is_me, 1);

    let head = engine.dashboard_counts(WorkerId(10)).await.unwrap();
    assert_eq!(head.total, 2);
    assert_eq!(head.assigned_to_me, 1);
    assert_eq!(head.my_feedback, 1);
    assert_eq!(head.overdue, 1);
}
