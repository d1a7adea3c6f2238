//! Integration tests for the case lifecycle: create, thread, escalate and
//! the management transitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use accountability_rs::db::{Db, RetryPolicy};
use accountability_rs::directory::InMemoryDirectory;
use accountability_rs::engine::Engine;
use accountability_rs::error::{Error, Result};
use accountability_rs::event::{CaseEvent, CaseEventKind};
use accountability_rs::model::*;
use accountability_rs::notify::{BroadcastNotifier, Notifier};

const PASTOR: WorkerId = WorkerId(1);
const HEAD_OF_SERVICE: WorkerId = WorkerId(2);
const HEAD_100: WorkerId = WorkerId(10);
const WORKER_A: WorkerId = WorkerId(11);
const WORKER_B: WorkerId = WorkerId(12);
const HEAD_200: WorkerId = WorkerId(20);

fn directory() -> InMemoryDirectory {
    InMemoryDirectory::with_workers([
        WorkerRecord::new(1, "Grace", "Pastor in Charge"),
        WorkerRecord::new(2, "Samuel", "Head of Service"),
        WorkerRecord::new(10, "Ama", "Head of Directorate").in_directorate(100),
        WorkerRecord::new(11, "Kofi", "Usher").in_directorate(100).reports_to(10),
        WorkerRecord::new(12, "Efua", "Chorister").in_directorate(100).reports_to(10),
        WorkerRecord::new(20, "Yaw", "Head of Directorate").in_directorate(200),
    ])
}

async fn test_engine() -> Engine {
    let db = Db::in_memory().await.expect("in-memory db");
    Engine::new(db, Arc::new(directory()))
}

fn about(subject: WorkerId) -> NewCase {
    NewCase::new("Missed rehearsal", "Absent without notice twice", subject)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_case_is_assigned_to_head_of_directorate() {
    let engine = test_engine().await;

    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    assert_eq!(case.status, Status::Open);
    assert_eq!(case.escalation_level, HierarchyLevel::Worker);
    assert_eq!(case.assigned_to, Some(HEAD_100));
    assert_eq!(case.created_by, WORKER_A);
    assert_eq!(case.category, "General");
    assert_eq!(case.priority, Priority::Medium);
    assert!(case.code.starts_with("AC-"));

    let stored = engine.get_case(case.id).await.unwrap();
    assert_eq!(stored.code, case.code);
    assert_eq!(engine.get_case_by_code(&case.code).await.unwrap().id, case.id);
}

#[tokio::test]
async fn head_of_directorate_case_is_assigned_to_subject() {
    let engine = test_engine().await;

    let case = engine
        .create_case(HEAD_100, about(WORKER_A).priority(Priority::High))
        .await
        .unwrap();
    assert_eq!(case.escalation_level, HierarchyLevel::HeadOfDirectorate);
    assert_eq!(case.assigned_to, Some(WORKER_A));
    assert_eq!(case.priority, Priority::High);
}

#[tokio::test]
async fn senior_creator_leaves_case_unassigned() {
    let engine = test_engine().await;

    let case = engine.create_case(HEAD_OF_SERVICE, about(WORKER_A)).await.unwrap();
    assert_eq!(case.escalation_level, HierarchyLevel::HeadOfService);
    assert_eq!(case.assigned_to, None);
}

#[tokio::test]
async fn create_records_create_action() {
    let engine = test_engine().await;

    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    let actions = engine.case_actions(case.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::Create);
    assert_eq!(actions[0].actor, WORKER_A);
    assert_eq!(actions[0].new_value.as_deref(), Some("Open"));
}

#[tokio::test]
async fn create_rejects_bad_input_without_writing() {
    let engine = test_engine().await;

    let err = engine
        .create_case(WORKER_A, NewCase::new("   ", "desc", WORKER_B))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let err = engine
        .create_case(WORKER_A, NewCase::new("t".repeat(201), "desc", WORKER_B))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let err = engine
        .create_case(WORKER_A, NewCase::new("Title", "", WORKER_B))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let err = engine
        .create_case(WORKER_A, about(WorkerId(999)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let err = engine
        .create_case(WorkerId(999), about(WORKER_B))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    assert!(engine.db().list_active_cases().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_post_message_moves_open_to_in_progress() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let message = engine
        .post_message(case.id, WORKER_A, "Can we talk about Sunday?", MessageType::Question)
        .await
        .unwrap();
    assert_eq!(message.visible_to, LevelSet::single(HierarchyLevel::Worker));
    assert!(!message.is_read);

    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.status, Status::InProgress);
}

#[tokio::test]
async fn post_message_narrows_audience_to_sender_and_subject() {
    let engine = test_engine().await;
    let case = engine.create_case(HEAD_100, about(WORKER_A)).await.unwrap();

    let message = engine
        .post_message(case.id, HEAD_100, "Please explain", MessageType::Question)
        .await
        .unwrap();
    assert_eq!(
        message.visible_to,
        LevelSet::of(&[HierarchyLevel::Worker, HierarchyLevel::HeadOfDirectorate])
    );

    let reply = engine
        .post_message(case.id, WORKER_A, "I was ill", MessageType::Response)
        .await
        .unwrap();
    assert_eq!(reply.visible_to, LevelSet::single(HierarchyLevel::Worker));
}

#[tokio::test]
async fn post_message_leaves_escalated_status_alone() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine.escalate(case.id, HEAD_100, "No response").await.unwrap();

    engine
        .post_message(case.id, WORKER_B, "Sorry", MessageType::Response)
        .await
        .unwrap();
    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.status, Status::Escalated);
}

#[tokio::test]
async fn post_message_validates_content_and_case() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let err = engine
        .post_message(case.id, WORKER_A, "  ", MessageType::Question)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let err = engine
        .post_message(CaseId::new(), WORKER_A, "hello", MessageType::Question)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let err = engine
        .post_message(case.id, WORKER_A, "hello", MessageType::Escalation)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn respond_records_reply_and_attachment() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    let question = engine
        .post_message(case.id, WORKER_A, "Why?", MessageType::Question)
        .await
        .unwrap();

    let reply = engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Guidance, "See the rota", LevelSet::ALL)
                .reply_to(question.id)
                .attachment("store/rota-2026.pdf", "rota.pdf"),
        )
        .await
        .unwrap();
    assert_eq!(reply.reply_to, Some(question.id));
    assert_eq!(reply.visible_to, LevelSet::ALL);
    let attachment = reply.attachment.expect("attachment recorded");
    assert_eq!(attachment.path, "store/rota-2026.pdf");
    assert_eq!(attachment.name, "rota.pdf");

    let actions = engine.case_actions(case.id).await.unwrap();
    assert_eq!(actions[0].action_type, ActionType::Message);
}

#[tokio::test]
async fn respond_rejects_reply_into_another_case() {
    let engine = test_engine().await;
    let first = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    let second = engine.create_case(WORKER_B, about(WORKER_A)).await.unwrap();
    let foreign = engine
        .post_message(first.id, WORKER_A, "first thread", MessageType::Question)
        .await
        .unwrap();

    let err = engine
        .respond(
            second.id,
            WORKER_B,
            NewResponse::new(MessageType::Response, "wrong thread", LevelSet::ALL)
                .reply_to(foreign.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    assert!(engine.db().thread(second.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn respond_requires_audience_unless_confidential() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let err = engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Response, "nobody", LevelSet::EMPTY),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let note = engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Guidance, "private note", LevelSet::EMPTY)
                .confidential(true),
        )
        .await
        .unwrap();
    assert!(note.is_confidential);
    assert!(note.visible_to.is_empty());
}

#[tokio::test]
async fn warning_marks_case_escalated_without_raising_level() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Warning, "Final warning", LevelSet::ALL),
        )
        .await
        .unwrap();

    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.status, Status::Escalated);
    assert_eq!(case.escalation_level, HierarchyLevel::Worker);
}

#[tokio::test]
async fn scenario_d_resolution_blocks_escalation() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    engine
        .respond(
            case.id,
            PASTOR,
            NewResponse::new(MessageType::Resolution, "Settled in person", LevelSet::ALL),
        )
        .await
        .unwrap();
    let resolved = engine.get_case(case.id).await.unwrap();
    assert_eq!(resolved.status, Status::Resolved);
    assert!(resolved.resolved_at.is_some());

    for who in [WORKER_A, HEAD_100, HEAD_OF_SERVICE, PASTOR] {
        let err = engine.escalate(case.id, who, "again").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
        assert!(!engine.can_escalate(case.id, who).await.unwrap());
    }

    let actions = engine.case_actions(case.id).await.unwrap();
    assert_eq!(actions[0].action_type, ActionType::Resolve);
    assert_eq!(actions[0].old_value.as_deref(), Some("Open"));
    assert_eq!(actions[0].new_value.as_deref(), Some("Resolved"));
}

#[tokio::test]
async fn resolved_case_accepts_messages_but_not_warnings() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine
        .respond(
            case.id,
            PASTOR,
            NewResponse::new(MessageType::Resolution, "Done", LevelSet::ALL),
        )
        .await
        .unwrap();

    engine
        .post_message(case.id, WORKER_B, "Thank you", MessageType::Response)
        .await
        .unwrap();
    engine
        .respond(
            case.id,
            PASTOR,
            NewResponse::new(MessageType::Resolution, "Confirmed", LevelSet::ALL),
        )
        .await
        .unwrap();
    assert_eq!(engine.get_case(case.id).await.unwrap().status, Status::Resolved);

    let err = engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Warning, "Not so fast", LevelSet::ALL),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_head_of_directorate_escalates() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    assert!(engine.can_escalate(case.id, HEAD_100).await.unwrap());
    assert_eq!(
        engine
            .next_escalation_level_name(case.id, HEAD_100)
            .await
            .unwrap(),
        Some("Head of Directorate")
    );

    let escalated = engine
        .escalate(case.id, HEAD_100, "Repeated absence")
        .await
        .unwrap();
    assert_eq!(escalated.escalation_level, HierarchyLevel::HeadOfDirectorate);
    assert_eq!(escalated.status, Status::Escalated);
    assert_eq!(escalated.assigned_to, Some(HEAD_100));

    let thread = engine.db().thread(case.id).await.unwrap();
    let notice = thread
        .iter()
        .find(|m| m.message_type == MessageType::Escalation)
        .expect("escalation message posted");
    assert_eq!(notice.visible_to.to_string(), "1,2,3");
    assert!(notice.content.contains("Repeated absence"));

    let actions = engine.case_actions(case.id).await.unwrap();
    assert_eq!(actions[0].action_type, ActionType::Escalate);
    assert_eq!(actions[0].old_value.as_deref(), Some("1"));
    assert_eq!(actions[0].new_value.as_deref(), Some("2"));
}

#[tokio::test]
async fn scenario_c_worker_cannot_escalate_above_own_level() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine.escalate(case.id, HEAD_100, "first").await.unwrap();

    assert!(!engine.can_escalate(case.id, WORKER_A).await.unwrap());
    let err = engine.escalate(case.id, WORKER_A, "me too").await.unwrap_err();
    match err {
        Error::Authorization {
            worker,
            level,
            required,
            ..
        } => {
            assert_eq!(worker, WORKER_A);
            assert_eq!(level, HierarchyLevel::Worker);
            assert_eq!(required, HierarchyLevel::HeadOfService);
        }
        other => panic!("expected Authorization, got {other:?}"),
    }

    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.escalation_level, HierarchyLevel::HeadOfDirectorate);
}

#[tokio::test]
async fn escalation_rises_one_level_per_call() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let mut observed = vec![case.escalation_level];
    for escalator in [HEAD_100, HEAD_OF_SERVICE, PASTOR] {
        let case = engine.escalate(case.id, escalator, "still open").await.unwrap();
        observed.push(case.escalation_level);
    }
    assert_eq!(observed, HierarchyLevel::ALL.to_vec());

    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.assigned_to, Some(PASTOR));

    let audiences: Vec<String> = engine
        .db()
        .thread(case.id)
        .await
        .unwrap()
        .iter()
        .filter(|m| m.message_type == MessageType::Escalation)
        .map(|m| m.visible_to.to_string())
        .collect();
    assert_eq!(audiences, ["1,2,3", "1,2,3,4", "1,2,3,4"]);
}

#[tokio::test]
async fn escalation_to_head_of_service_assigns_holder_of_level() {
    let engine = test_engine().await;
    let case = engine.create_case(HEAD_100, about(WORKER_A)).await.unwrap();

    let case = engine
        .escalate(case.id, HEAD_OF_SERVICE, "needs service review")
        .await
        .unwrap();
    assert_eq!(case.escalation_level, HierarchyLevel::HeadOfService);
    assert_eq!(case.assigned_to, Some(HEAD_OF_SERVICE));
}

#[tokio::test]
async fn escalation_ceiling_is_invalid_state_for_everyone() {
    let engine = test_engine().await;
    let case = engine.create_case(PASTOR, about(WORKER_A)).await.unwrap();
    assert_eq!(case.escalation_level, HierarchyLevel::PastorInCharge);

    for who in [WORKER_A, HEAD_100, PASTOR] {
        let err = engine.escalate(case.id, who, "higher").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
        assert!(!engine.can_escalate(case.id, who).await.unwrap());
        assert_eq!(
            engine.next_escalation_level_name(case.id, who).await.unwrap(),
            None
        );
    }
}

#[tokio::test]
async fn escalate_requires_reason() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let err = engine.escalate(case.id, HEAD_100, " ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    assert_eq!(
        engine.get_case(case.id).await.unwrap().escalation_level,
        HierarchyLevel::Worker
    );
}

#[tokio::test]
async fn unresolvable_escalator_gets_invalid_state_on_dead_end_cases() {
    let engine = test_engine().await;
    let stranger = WorkerId(999);

    let ceiling = engine.create_case(PASTOR, about(WORKER_A)).await.unwrap();
    let err = engine.escalate(ceiling.id, stranger, "higher").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
    assert!(!engine.can_escalate(ceiling.id, stranger).await.unwrap());

    let resolved = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine
        .respond(
            resolved.id,
            HEAD_100,
            NewResponse::new(MessageType::Resolution, "Sorted", LevelSet::ALL),
        )
        .await
        .unwrap();
    let err = engine.escalate(resolved.id, stranger, "again").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
    assert!(!engine.can_escalate(resolved.id, stranger).await.unwrap());

    // On a live case the escalator still has to exist.
    let open = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    let err = engine.escalate(open.id, stranger, "up").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn can_escalate_on_missing_case_is_false() {
    let engine = test_engine().await;
    assert!(!engine.can_escalate(CaseId::new(), PASTOR).await.unwrap());
}

#[tokio::test]
async fn concurrent_escalations_each_raise_exactly_one_level() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let mut handles = Vec::new();
    for escalator in [HEAD_100, HEAD_200, HEAD_OF_SERVICE, PASTOR] {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.escalate(case.id, escalator, "race").await
        }));
    }

    let mut successes = 0u8;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::Authorization { .. } | Error::InvalidState { .. }) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    let case = engine.get_case(case.id).await.unwrap();
    assert_eq!(case.escalation_level.number(), 1 + successes);
    let notices = engine
        .db()
        .thread(case.id)
        .await
        .unwrap()
        .iter()
        .filter(|m| m.message_type == MessageType::Escalation)
        .count();
    assert_eq!(notices, usize::from(successes));
}

/// A file-backed engine with a pool of real connections, so concurrent
/// transactions contend on SQLite locks and version tokens.
async fn file_engine(directory: InMemoryDirectory) -> (Engine, PathBuf) {
    let path = std::env::temp_dir().join(format!("accountability-{}.db", CaseId::new().0));
    let db = Db::connect(&format!("sqlite://{}", path.display()))
        .await
        .expect("file db")
        .with_retry_policy(RetryPolicy {
            max_attempts: 50,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(50),
        });
    db.migrate().await.unwrap();
    (Engine::new(db, Arc::new(directory)), path)
}

fn remove_db_files(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_peers_on_file_database_escalate_once() {
    let heads: Vec<i64> = (30..36).collect();
    let directory = directory();
    for (i, &id) in heads.iter().enumerate() {
        directory.upsert(
            WorkerRecord::new(id, format!("Head {id}"), "Head of Directorate")
                .in_directorate(300 + i as i64),
        );
    }
    let (engine, path) = file_engine(directory).await;

    for round in 0..5 {
        let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

        let mut handles = Vec::new();
        for &id in &heads {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.escalate(case.id, WorkerId(id), "race").await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::Authorization { .. }) => {}
                Err(e) => panic!("round {round}: unexpected error: {e:?}"),
            }
        }
        assert_eq!(successes, 1, "round {round}");

        let case = engine.get_case(case.id).await.unwrap();
        assert_eq!(case.escalation_level, HierarchyLevel::HeadOfDirectorate);
        assert_eq!(case.status, Status::Escalated);
        let notices = engine
            .db()
            .thread(case.id)
            .await
            .unwrap()
            .iter()
            .filter(|m| m.message_type == MessageType::Escalation)
            .count();
        assert_eq!(notices, 1, "round {round}");
        let escalations = engine
            .case_actions(case.id)
            .await
            .unwrap()
            .iter()
            .filter(|a| a.action_type == ActionType::Escalate)
            .count();
        assert_eq!(escalations, 1, "round {round}");
    }

    drop(engine);
    remove_db_files(&path);
}

// ---------------------------------------------------------------------------
// Management
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assign_records_old_and_new() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let case = engine.assign(case.id, HEAD_100, WORKER_B).await.unwrap();
    assert_eq!(case.assigned_to, Some(WORKER_B));

    let actions = engine.case_actions(case.id).await.unwrap();
    assert_eq!(actions[0].action_type, ActionType::Assign);
    assert_eq!(actions[0].old_value.as_deref(), Some("#10"));
    assert_eq!(actions[0].new_value.as_deref(), Some("#12"));

    let err = engine.assign(case.id, HEAD_100, WorkerId(999)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn assign_requires_authority() {
    let engine = test_engine().await;
    let case = engine.create_case(HEAD_100, about(WORKER_A)).await.unwrap();

    let err = engine.assign(case.id, WORKER_B, WORKER_B).await.unwrap_err();
    assert!(matches!(err, Error::Authorization { .. }), "got {err:?}");
}

#[tokio::test]
async fn close_then_reopen() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine.escalate(case.id, HEAD_100, "no progress").await.unwrap();

    let err = engine.close(case.id, HEAD_100).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");

    engine
        .respond(
            case.id,
            HEAD_100,
            NewResponse::new(MessageType::Resolution, "Agreed a plan", LevelSet::ALL),
        )
        .await
        .unwrap();

    // Subject at level 1 on a level-2 case, not the creator.
    let err = engine.close(case.id, WORKER_B).await.unwrap_err();
    assert!(matches!(err, Error::Authorization { .. }), "got {err:?}");

    let closed = engine.close(case.id, WORKER_A).await.unwrap();
    assert_eq!(closed.status, Status::Closed);

    let err = engine
        .post_message(case.id, WORKER_B, "hello?", MessageType::Question)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");

    let err = engine.reopen(case.id, HEAD_100, "").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let reopened = engine
        .reopen(case.id, HEAD_100, "Plan not followed")
        .await
        .unwrap();
    assert_eq!(reopened.status, Status::Open);
    assert_eq!(reopened.escalation_level, HierarchyLevel::HeadOfDirectorate);
    assert!(reopened.resolved_at.is_none());

    let kinds: Vec<ActionType> = engine
        .case_actions(case.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.action_type)
        .take(2)
        .collect();
    assert_eq!(kinds, [ActionType::Reopen, ActionType::Close]);
}

#[tokio::test]
async fn reopen_requires_settled_case() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();

    let err = engine.reopen(case.id, WORKER_A, "why not").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");
}

#[tokio::test]
async fn confidentiality_toggle_records_update_once() {
    let engine = test_engine().await;
    let case = engine.create_case(HEAD_100, about(WORKER_A)).await.unwrap();

    let case = engine.set_confidentiality(case.id, HEAD_100, true).await.unwrap();
    assert!(case.is_confidential);
    let again = engine.set_confidentiality(case.id, HEAD_100, true).await.unwrap();
    assert_eq!(again.version, case.version);

    let updates = engine
        .case_actions(case.id)
        .await
        .unwrap()
        .iter()
        .filter(|a| a.action_type == ActionType::Update)
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn audit_trail_is_newest_first() {
    let engine = test_engine().await;
    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine
        .post_message(case.id, WORKER_A, "hello", MessageType::Question)
        .await
        .unwrap();
    engine.escalate(case.id, HEAD_100, "no reply").await.unwrap();

    let kinds: Vec<ActionType> = engine
        .case_actions(case.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.action_type)
        .collect();
    assert_eq!(
        kinds,
        [ActionType::Escalate, ActionType::Message, ActionType::Create]
    );
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _event: &CaseEvent) -> Result<()> {
        Err(Error::Other("mail server down".to_string()))
    }
}

#[tokio::test]
async fn events_follow_committed_changes() {
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let mut events = notifier.subscribe();
    let engine = test_engine().await.with_notifier(notifier);

    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    engine.escalate(case.id, HEAD_100, "slow").await.unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.case_id, case.id);
    assert!(matches!(
        created.kind,
        CaseEventKind::CaseCreated {
            assigned_to: Some(HEAD_100),
            ..
        }
    ));

    let escalated = events.recv().await.unwrap();
    match escalated.kind {
        CaseEventKind::CaseEscalated { from, to, reason, .. } => {
            assert_eq!(from, HierarchyLevel::Worker);
            assert_eq!(to, HierarchyLevel::HeadOfDirectorate);
            assert_eq!(reason, "slow");
        }
        other => panic!("expected CaseEscalated, got {other:?}"),
    }

    let status = events.recv().await.unwrap();
    assert!(matches!(
        status.kind,
        CaseEventKind::StatusChanged {
            from: Status::Open,
            to: Status::Escalated
        }
    ));
}

#[tokio::test]
async fn refused_escalation_emits_nothing() {
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let engine = test_engine().await.with_notifier(notifier.clone());
    let case = engine.create_case(PASTOR, about(WORKER_A)).await.unwrap();

    let mut events = notifier.subscribe();
    engine.escalate(case.id, PASTOR, "ceiling").await.unwrap_err();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn notifier_failure_does_not_undo_case() {
    let engine = test_engine().await.with_notifier(Arc::new(FailingNotifier));

    let case = engine.create_case(WORKER_A, about(WORKER_B)).await.unwrap();
    let escalated = engine.escalate(case.id, HEAD_100, "still").await.unwrap();

    let stored = engine.get_case(case.id).await.unwrap();
    assert_eq!(stored.escalation_level, escalated.escalation_level);
    assert_eq!(engine.case_actions(case.id).await.unwrap().len(), 2);
}
