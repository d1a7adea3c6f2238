//! Case lifecycle: creation, thread messages, escalation and the
//! management transitions (assign, close, reopen, confidentiality).
//!
//! Every mutating operation runs as one transaction inside
//! [`Db::retrying`](crate::db::Db::retrying): read the case, check the
//! preconditions, write case + message + action, commit. The case row's
//! version token turns a lost race into `Error::Conflict`, which is retried
//! against fresh state. Events are published only after commit.

use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use sqlx::SqliteConnection;
use tracing::{Instrument, info, warn};

use super::Engine;
use super::hierarchy::get_or_create_on;
use crate::db::messages::NewMessage;
use crate::db::{actions, cases, messages};
use crate::error::{Error, Result};
use crate::event::{CaseEvent, CaseEventKind};
use crate::model::case::generate_case_code;
use crate::model::*;
use crate::telemetry::case::{record_transition, start_case_span};
use crate::telemetry::metrics;

/// Whether `case` can be raised at all, whoever asks. Returns the target
/// level. Settled cases and cases at the ceiling are `InvalidState`.
pub fn check_escalation_state(case: &Case) -> Result<HierarchyLevel> {
    if case.status.is_settled() {
        return Err(Error::InvalidState {
            case: case.id,
            reason: format!("a {} case cannot be escalated", case.status),
        });
    }
    case.escalation_level.next().ok_or_else(|| Error::InvalidState {
        case: case.id,
        reason: format!("already escalated to {}", case.escalation_level.name()),
    })
}

/// Check that `escalator`, at `level`, may raise `case` one step. Returns the
/// target level.
///
/// State problems are reported before authority problems. Both
/// `Engine::escalate` and `Engine::can_escalate` go through here.
pub fn check_escalation(
    case: &Case,
    escalator: WorkerId,
    level: HierarchyLevel,
) -> Result<HierarchyLevel> {
    let target = check_escalation_state(case)?;
    if level <= case.escalation_level {
        return Err(Error::Authorization {
            case: case.id,
            worker: escalator,
            level,
            required: target,
            action: "escalate",
        });
    }
    Ok(target)
}

/// The creator, or anyone at or above the case's escalation level, may
/// manage it.
fn check_management(
    case: &Case,
    actor: WorkerId,
    level: HierarchyLevel,
    action: &'static str,
) -> Result<()> {
    if actor == case.created_by || level >= case.escalation_level {
        return Ok(());
    }
    Err(Error::Authorization {
        case: case.id,
        worker: actor,
        level,
        required: case.escalation_level,
        action,
    })
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{what} must not be blank")));
    }
    Ok(())
}

fn reject_closed(case: &Case) -> Result<()> {
    if case.status.is_terminal() {
        return Err(Error::InvalidState {
            case: case.id,
            reason: "case is closed; reopen it first".to_string(),
        });
    }
    Ok(())
}

/// A committed case change.
struct CaseChange {
    before: Case,
    after: Case,
}

impl CaseChange {
    fn is_noop(&self) -> bool {
        self.before.version == self.after.version
    }
}

/// A committed message append.
struct Posted {
    case: Case,
    previous_status: Status,
    message: Message,
}

impl Engine {
    pub async fn get_case(&self, id: CaseId) -> Result<Case> {
        self.db.get_case(id).await
    }

    pub async fn get_case_by_code(&self, code: &str) -> Result<Case> {
        self.db.get_case_by_code(code).await
    }

    /// Audit trail, newest first.
    pub async fn case_actions(&self, case_id: CaseId) -> Result<Vec<CaseAction>> {
        self.db.case_actions(case_id).await
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Open a case about `new.subject`. The escalation level starts at the
    /// creator's level; assignment follows from it.
    pub async fn create_case(&self, creator: WorkerId, new: NewCase) -> Result<Case> {
        new.validate()?;
        let span = start_case_span("create", None, creator);
        let started = Instant::now();

        let new = &new;
        let case = self
            .db
            .retrying("case.create", move || self.create_case_once(creator, new))
            .instrument(span.clone())
            .await?;

        record_transition(&span, "", &case.status.to_string());
        metrics::cases_created().add(
            1,
            &[
                KeyValue::new("priority", case.priority.to_string()),
                KeyValue::new("creator_level", i64::from(case.escalation_level.number())),
            ],
        );
        super::record_duration("case.create", started);
        info!(
            case = %case.id,
            code = %case.code,
            subject = %case.subject,
            level = %case.escalation_level,
            "case created"
        );

        self.publish(CaseEvent::now(
            case.id,
            &case.code,
            creator,
            CaseEventKind::CaseCreated {
                subject: case.subject,
                assigned_to: case.assigned_to,
                escalation_level: case.escalation_level,
            },
        ));
        Ok(case)
    }

    async fn create_case_once(&self, creator: WorkerId, new: &NewCase) -> Result<Case> {
        let subject = self.directory.get_worker(new.subject).await?;
        let mut tx = self.db.begin().await?;
        let creator_record = get_or_create_on(&mut tx, self.directory.as_ref(), creator).await?;

        let assigned_to = match creator_record.level {
            HierarchyLevel::HeadOfDirectorate => Some(new.subject),
            HierarchyLevel::Worker => self.head_of_directorate(&subject).await?,
            _ => None,
        };

        let now = Utc::now();
        let id = CaseId::new();
        let case = Case {
            id,
            code: generate_case_code(id, now),
            title: new.title.trim().to_string(),
            description: new.description.clone(),
            subject: new.subject,
            created_by: creator,
            assigned_to,
            priority: new.priority,
            status: Status::Open,
            escalation_level: creator_record.level,
            category: new.category.clone(),
            occurrence_date: new.occurrence_date.unwrap_or_else(|| now.date_naive()),
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            is_confidential: new.confidential,
            is_active: true,
            version: 0,
        };
        cases::insert_case_on(&mut tx, &case).await?;
        actions::insert_action_on(
            &mut tx,
            &NewAction::new(
                id,
                creator,
                ActionType::Create,
                format!("Case created: {}", case.title),
            )
            .change("", Status::Open),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(case)
    }

    async fn head_of_directorate(&self, worker: &WorkerRecord) -> Result<Option<WorkerId>> {
        match worker.directorate {
            Some(directorate) => {
                self.directory
                    .find_worker_at_level(HierarchyLevel::HeadOfDirectorate, Some(directorate))
                    .await
            }
            None => Ok(None),
        }
    }

    /// Who holds a case about `subject` once it sits at `level`.
    async fn assignee_at_level(
        &self,
        level: HierarchyLevel,
        subject: WorkerId,
    ) -> Result<Option<WorkerId>> {
        match level {
            HierarchyLevel::Worker => Ok(Some(subject)),
            HierarchyLevel::HeadOfDirectorate => match self.directory.get_worker(subject).await {
                Ok(record) => self.head_of_directorate(&record).await,
                Err(Error::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            _ => self.directory.find_worker_at_level(level, None).await,
        }
    }

    // -----------------------------------------------------------------------
    // Thread
    // -----------------------------------------------------------------------

    /// Append a message addressed to the narrowest audience that still
    /// reaches the subject. Moves an `Open` case to `InProgress`.
    pub async fn post_message(
        &self,
        case_id: CaseId,
        sender: WorkerId,
        content: &str,
        message_type: MessageType,
    ) -> Result<Message> {
        require_text(content, "message content")?;
        if message_type == MessageType::Escalation {
            return Err(Error::Validation(
                "escalation messages are generated by escalate".to_string(),
            ));
        }
        let span = start_case_span("post_message", Some(case_id), sender);
        let started = Instant::now();

        let posted = self
            .db
            .retrying("case.post_message", move || {
                self.post_message_once(case_id, sender, content, message_type)
            })
            .instrument(span.clone())
            .await?;

        super::record_duration("case.post_message", started);
        self.after_post(&span, sender, posted)
    }

    async fn post_message_once(
        &self,
        case_id: CaseId,
        sender: WorkerId,
        content: &str,
        message_type: MessageType,
    ) -> Result<Posted> {
        let mut tx = self.db.begin().await?;
        let mut case = cases::get_case_on(&mut tx, case_id).await?;
        reject_closed(&case)?;

        let sender_level = get_or_create_on(&mut tx, self.directory.as_ref(), sender)
            .await?
            .level;
        let subject_level = self.subject_level_on(&mut tx, case.subject).await?;

        let previous_status = case.status;
        if case.status == Status::Open {
            case.status = Status::InProgress;
        }
        let now = Utc::now();
        case.updated_at = now;
        cases::update_case_on(&mut tx, &mut case).await?;

        let message = messages::insert_message_on(
            &mut tx,
            NewMessage {
                case_id,
                sender,
                message_type,
                content: content.to_string(),
                visible_to: LevelSet::initial_audience(sender_level, subject_level),
                reply_to: None,
                attachment: None,
                is_confidential: false,
                sent_at: now,
            },
        )
        .await?;
        actions::insert_action_on(
            &mut tx,
            &NewAction::new(
                case_id,
                sender,
                ActionType::Message,
                format!("{message_type} sent"),
            ),
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(Posted {
            case,
            previous_status,
            message,
        })
    }

    /// A subject who has left the directory keeps the lowest level, so their
    /// open cases can still be discussed.
    async fn subject_level_on(
        &self,
        conn: &mut SqliteConnection,
        subject: WorkerId,
    ) -> Result<HierarchyLevel> {
        match get_or_create_on(conn, self.directory.as_ref(), subject).await {
            Ok(record) => Ok(record.level),
            Err(Error::NotFound(_)) => Ok(HierarchyLevel::Worker),
            Err(e) => Err(e),
        }
    }

    /// Append a message with a caller-chosen audience. `Resolution` resolves
    /// the case and `Warning` marks it `Escalated`.
    pub async fn respond(
        &self,
        case_id: CaseId,
        sender: WorkerId,
        response: NewResponse,
    ) -> Result<Message> {
        require_text(&response.content, "message content")?;
        if response.message_type == MessageType::Escalation {
            return Err(Error::Validation(
                "escalation messages are generated by escalate".to_string(),
            ));
        }
        if response.visible_to.is_empty() && !response.confidential {
            return Err(Error::Validation(
                "a non-confidential message needs at least one audience level".to_string(),
            ));
        }
        let span = start_case_span("respond", Some(case_id), sender);
        let started = Instant::now();

        let response = &response;
        let posted = self
            .db
            .retrying("case.respond", move || {
                self.respond_once(case_id, sender, response)
            })
            .instrument(span.clone())
            .await?;

        super::record_duration("case.respond", started);
        self.after_post(&span, sender, posted)
    }

    async fn respond_once(
        &self,
        case_id: CaseId,
        sender: WorkerId,
        response: &NewResponse,
    ) -> Result<Posted> {
        let mut tx = self.db.begin().await?;
        let mut case = cases::get_case_on(&mut tx, case_id).await?;
        reject_closed(&case)?;
        get_or_create_on(&mut tx, self.directory.as_ref(), sender).await?;

        if let Some(target) = response.reply_to {
            if !messages::belongs_to_case_on(&mut tx, case_id, target).await? {
                return Err(Error::Validation(format!(
                    "message {target} is not part of case {case_id}"
                )));
            }
        }

        let now = Utc::now();
        let previous_status = case.status;
        match response.message_type {
            MessageType::Resolution if case.status != Status::Resolved => {
                case.status = Status::Resolved;
                case.resolved_at = Some(now);
            }
            MessageType::Warning if case.status.is_settled() => {
                return Err(Error::InvalidState {
                    case: case.id,
                    reason: format!("a {} case cannot be escalated", case.status),
                });
            }
            MessageType::Warning => case.status = Status::Escalated,
            _ => {}
        }
        case.updated_at = now;
        cases::update_case_on(&mut tx, &mut case).await?;

        let message = messages::insert_message_on(
            &mut tx,
            NewMessage {
                case_id,
                sender,
                message_type: response.message_type,
                content: response.content.clone(),
                visible_to: response.visible_to,
                reply_to: response.reply_to,
                attachment: response.attachment.clone(),
                is_confidential: response.confidential,
                sent_at: now,
            },
        )
        .await?;
        actions::insert_action_on(
            &mut tx,
            &NewAction::new(
                case_id,
                sender,
                ActionType::Message,
                format!("{} sent", response.message_type),
            ),
            now,
        )
        .await?;
        if case.status != previous_status {
            let action_type = match case.status {
                Status::Resolved => ActionType::Resolve,
                _ => ActionType::Update,
            };
            actions::insert_action_on(
                &mut tx,
                &NewAction::new(
                    case_id,
                    sender,
                    action_type,
                    format!("Status changed by {}", response.message_type),
                )
                .change(previous_status, case.status),
                now,
            )
            .await?;
        }
        tx.commit().await?;

        Ok(Posted {
            case,
            previous_status,
            message,
        })
    }

    fn after_post(&self, span: &tracing::Span, sender: WorkerId, posted: Posted) -> Result<Message> {
        let Posted {
            case,
            previous_status,
            message,
        } = posted;

        metrics::messages_posted().add(
            1,
            &[KeyValue::new("message_type", message.message_type.to_string())],
        );
        info!(
            case = %case.id,
            message = %message.id,
            message_type = %message.message_type,
            audience = %message.visible_to,
            "message posted"
        );
        self.publish(CaseEvent::now(
            case.id,
            &case.code,
            sender,
            CaseEventKind::MessagePosted {
                message_id: message.id,
                message_type: message.message_type,
            },
        ));
        if case.status != previous_status {
            self.status_changed(span, &case, sender, previous_status);
        }
        Ok(message)
    }

    fn status_changed(&self, span: &tracing::Span, case: &Case, actor: WorkerId, from: Status) {
        let (from_s, to_s) = (from.to_string(), case.status.to_string());
        record_transition(span, &from_s, &to_s);
        metrics::case_transitions().add(
            1,
            &[KeyValue::new("from", from_s), KeyValue::new("to", to_s)],
        );
        self.publish(CaseEvent::now(
            case.id,
            &case.code,
            actor,
            CaseEventKind::StatusChanged {
                from,
                to: case.status,
            },
        ));
    }

    // -----------------------------------------------------------------------
    // Escalation
    // -----------------------------------------------------------------------

    /// Raise a case exactly one level, reassign it, and post the system
    /// escalation message, all in one transaction.
    pub async fn escalate(&self, case_id: CaseId, escalator: WorkerId, reason: &str) -> Result<Case> {
        require_text(reason, "escalation reason")?;
        let span = start_case_span("escalate", Some(case_id), escalator);
        let started = Instant::now();

        let change = self
            .db
            .retrying("case.escalate", move || {
                self.escalate_once(case_id, escalator, reason)
            })
            .instrument(span.clone())
            .await;
        let CaseChange { before, after } = match change {
            Ok(change) => change,
            Err(e) => {
                span.in_scope(|| warn!(case = %case_id, escalator = %escalator, error = %e, "escalation refused"));
                return Err(e);
            }
        };

        metrics::escalations().add(
            1,
            &[KeyValue::new("to_level", i64::from(after.escalation_level.number()))],
        );
        super::record_duration("case.escalate", started);
        info!(
            case = %after.id,
            from = %before.escalation_level,
            to = %after.escalation_level,
            assigned_to = ?after.assigned_to,
            "case escalated"
        );

        self.publish(CaseEvent::now(
            after.id,
            &after.code,
            escalator,
            CaseEventKind::CaseEscalated {
                from: before.escalation_level,
                to: after.escalation_level,
                assigned_to: after.assigned_to,
                reason: reason.to_string(),
            },
        ));
        if before.status != after.status {
            self.status_changed(&span, &after, escalator, before.status);
        }
        Ok(after)
    }

    async fn escalate_once(
        &self,
        case_id: CaseId,
        escalator: WorkerId,
        reason: &str,
    ) -> Result<CaseChange> {
        let mut tx = self.db.begin().await?;
        let before = cases::get_case_on(&mut tx, case_id).await?;
        // Ceiling and settled cases fail before the escalator is resolved.
        check_escalation_state(&before)?;
        let level = get_or_create_on(&mut tx, self.directory.as_ref(), escalator)
            .await?
            .level;
        let target = check_escalation(&before, escalator, level)?;

        let now = Utc::now();
        let mut case = before.clone();
        case.escalation_level = target;
        case.status = Status::Escalated;
        case.assigned_to = self.assignee_at_level(target, case.subject).await?;
        case.updated_at = now;
        cases::update_case_on(&mut tx, &mut case).await?;

        messages::insert_message_on(
            &mut tx,
            NewMessage {
                case_id,
                sender: escalator,
                message_type: MessageType::Escalation,
                content: format!(
                    "Case escalated to level {} ({}). Reason: {}",
                    target.number(),
                    target.name(),
                    reason.trim()
                ),
                visible_to: LevelSet::escalation_audience(target),
                reply_to: None,
                attachment: None,
                is_confidential: false,
                sent_at: now,
            },
        )
        .await?;
        actions::insert_action_on(
            &mut tx,
            &NewAction::new(
                case_id,
                escalator,
                ActionType::Escalate,
                format!("Escalated to {}: {}", target.name(), reason.trim()),
            )
            .change(before.escalation_level.number(), target.number()),
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(CaseChange {
            before,
            after: case,
        })
    }

    /// Whether `escalate` would currently succeed for this viewer. A missing
    /// case cannot be escalated.
    pub async fn can_escalate(&self, case_id: CaseId, viewer: WorkerId) -> Result<bool> {
        let case = match self.db.get_case(case_id).await {
            Ok(case) => case,
            Err(Error::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if check_escalation_state(&case).is_err() {
            return Ok(false);
        }
        let level = self.hierarchy_level(viewer).await?;
        match check_escalation(&case, viewer, level) {
            Ok(_) => Ok(true),
            Err(Error::Authorization { .. } | Error::InvalidState { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Display name of the level `escalate` would raise the case to, when
    /// the viewer may escalate it.
    ///
    /// This is the case's level plus one, the level `escalate` moves to,
    /// and not a level derived from the viewer's own.
    pub async fn next_escalation_level_name(
        &self,
        case_id: CaseId,
        viewer: WorkerId,
    ) -> Result<Option<&'static str>> {
        if !self.can_escalate(case_id, viewer).await? {
            return Ok(None);
        }
        let case = self.db.get_case(case_id).await?;
        Ok(case.escalation_level.next().map(HierarchyLevel::name))
    }

    // -----------------------------------------------------------------------
    // Management
    // -----------------------------------------------------------------------

    pub async fn assign(&self, case_id: CaseId, actor: WorkerId, assignee: WorkerId) -> Result<Case> {
        self.directory.get_worker(assignee).await?;
        let change = self
            .mutate_case("case.assign", case_id, actor, |case, level| {
                reject_closed(case)?;
                check_management(case, actor, level, "assign")?;
                if case.assigned_to == Some(assignee) {
                    return Ok(None);
                }
                let old = case
                    .assigned_to
                    .map_or_else(|| "unassigned".to_string(), |w| w.to_string());
                case.assigned_to = Some(assignee);
                Ok(Some(
                    NewAction::new(
                        case.id,
                        actor,
                        ActionType::Assign,
                        format!("Assigned to {assignee}"),
                    )
                    .change(old, assignee),
                ))
            })
            .await?;

        if !change.is_noop() {
            self.publish(CaseEvent::now(
                change.after.id,
                &change.after.code,
                actor,
                CaseEventKind::CaseAssigned {
                    from: change.before.assigned_to,
                    to: assignee,
                },
            ));
        }
        Ok(change.after)
    }

    /// Resolved -> Closed.
    pub async fn close(&self, case_id: CaseId, actor: WorkerId) -> Result<Case> {
        let change = self
            .mutate_case("case.close", case_id, actor, |case, level| {
                if !case.status.can_transition_to(Status::Closed) {
                    return Err(Error::InvalidState {
                        case: case.id,
                        reason: format!("only resolved cases can be closed; case is {}", case.status),
                    });
                }
                check_management(case, actor, level, "close")?;
                let from = case.status;
                case.status = Status::Closed;
                Ok(Some(
                    NewAction::new(case.id, actor, ActionType::Close, "Case closed")
                        .change(from, Status::Closed),
                ))
            })
            .await?;
        Ok(change.after)
    }

    /// Resolved or Closed -> Open. The escalation level stays where it was.
    pub async fn reopen(&self, case_id: CaseId, actor: WorkerId, reason: &str) -> Result<Case> {
        require_text(reason, "reopen reason")?;
        let change = self
            .mutate_case("case.reopen", case_id, actor, |case, level| {
                if !case.status.can_transition_to(Status::Open) {
                    return Err(Error::InvalidState {
                        case: case.id,
                        reason: format!("only settled cases can be reopened; case is {}", case.status),
                    });
                }
                check_management(case, actor, level, "reopen")?;
                let from = case.status;
                case.status = Status::Open;
                case.resolved_at = None;
                Ok(Some(
                    NewAction::new(
                        case.id,
                        actor,
                        ActionType::Reopen,
                        format!("Case reopened: {}", reason.trim()),
                    )
                    .change(from, Status::Open),
                ))
            })
            .await?;
        Ok(change.after)
    }

    pub async fn set_confidentiality(
        &self,
        case_id: CaseId,
        actor: WorkerId,
        confidential: bool,
    ) -> Result<Case> {
        let change = self
            .mutate_case("case.confidentiality", case_id, actor, |case, level| {
                check_management(case, actor, level, "change confidentiality of")?;
                if case.is_confidential == confidential {
                    return Ok(None);
                }
                case.is_confidential = confidential;
                Ok(Some(
                    NewAction::new(
                        case.id,
                        actor,
                        ActionType::Update,
                        "Confidentiality changed",
                    )
                    .change(!confidential, confidential),
                ))
            })
            .await?;

        if !change.is_noop() {
            self.publish(CaseEvent::now(
                change.after.id,
                &change.after.code,
                actor,
                CaseEventKind::ConfidentialityChanged { confidential },
            ));
        }
        Ok(change.after)
    }

    /// Shared shape of the management transitions. `mutate` edits the case in
    /// place and returns the action to record, or `None` when there is
    /// nothing to change (nothing is written then).
    async fn mutate_case<F>(
        &self,
        operation: &'static str,
        case_id: CaseId,
        actor: WorkerId,
        mutate: F,
    ) -> Result<CaseChange>
    where
        F: Fn(&mut Case, HierarchyLevel) -> Result<Option<NewAction>> + Sync,
    {
        let span = start_case_span(operation, Some(case_id), actor);
        let started = Instant::now();
        let mutate = &mutate;

        let change = self
            .db
            .retrying(operation, move || async move {
                let mut tx = self.db.begin().await?;
                let before = cases::get_case_on(&mut tx, case_id).await?;
                let level = get_or_create_on(&mut tx, self.directory.as_ref(), actor)
                    .await?
                    .level;

                let mut case = before.clone();
                let Some(action) = mutate(&mut case, level)? else {
                    return Ok(CaseChange {
                        before,
                        after: case,
                    });
                };
                let now = Utc::now();
                case.updated_at = now;
                cases::update_case_on(&mut tx, &mut case).await?;
                actions::insert_action_on(&mut tx, &action, now).await?;
                tx.commit().await?;
                Ok(CaseChange {
                    before,
                    after: case,
                })
            })
            .instrument(span.clone())
            .await?;

        super::record_duration(operation, started);
        if change.before.status != change.after.status {
            self.status_changed(&span, &change.after, actor, change.before.status);
        }
        if !change.is_noop() {
            info!(case = %case_id, actor = %actor, operation, "case updated");
        }
        Ok(change)
    }
}
