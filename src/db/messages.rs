//! Case thread rows.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::Result;
use crate::model::*;

/// Fields of a message about to be appended.
#[derive(Debug, Clone)]
pub(crate) struct NewMessage {
    pub case_id: CaseId,
    pub sender: WorkerId,
    pub message_type: MessageType,
    pub content: String,
    pub visible_to: LevelSet,
    pub reply_to: Option<MessageId>,
    pub attachment: Option<Attachment>,
    pub is_confidential: bool,
    pub sent_at: DateTime<Utc>,
}

/// Append a message and return it with its assigned sequence id.
pub(crate) async fn insert_message_on(
    conn: &mut SqliteConnection,
    new: NewMessage,
) -> Result<Message> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO case_messages (case_id, sender_id, message_type, content, visible_to, reply_to, attachment_path, attachment_name, is_confidential, sent_at, is_read)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
         RETURNING id",
    )
    .bind(new.case_id.0)
    .bind(new.sender.0)
    .bind(new.message_type.to_string())
    .bind(&new.content)
    .bind(i64::from(new.visible_to.bits()))
    .bind(new.reply_to.map(|m| m.0))
    .bind(new.attachment.as_ref().map(|a| a.path.as_str()))
    .bind(new.attachment.as_ref().map(|a| a.name.as_str()))
    .bind(new.is_confidential)
    .bind(new.sent_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Message {
        id: MessageId(id),
        case_id: new.case_id,
        sender: new.sender,
        message_type: new.message_type,
        content: new.content,
        visible_to: new.visible_to,
        reply_to: new.reply_to,
        attachment: new.attachment,
        is_confidential: new.is_confidential,
        sent_at: new.sent_at,
        is_read: false,
        read_at: None,
    })
}

/// Whether `message` exists and belongs to `case_id`.
pub(crate) async fn belongs_to_case_on(
    conn: &mut SqliteConnection,
    case_id: CaseId,
    message: MessageId,
) -> Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM case_messages WHERE id = ? AND case_id = ?")
            .bind(message.0)
            .bind(case_id.0)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// The whole thread in canonical order: `sent_at`, then insertion sequence.
pub(crate) async fn thread_on(conn: &mut SqliteConnection, case_id: CaseId) -> Result<Vec<Message>> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id, case_id, sender_id, message_type, content, visible_to, reply_to, attachment_path, attachment_name, is_confidential, sent_at, is_read, read_at
         FROM case_messages WHERE case_id = ?
         ORDER BY sent_at, id",
    )
    .bind(case_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut messages = rows
        .into_iter()
        .map(MessageRow::try_into_message)
        .collect::<Result<Vec<_>>>()?;
    // Stored text timestamps can vary in precision; order on the parsed values.
    messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)));
    Ok(messages)
}

/// Mark messages read. Already-read messages keep their first read time.
pub(crate) async fn mark_read_on(
    conn: &mut SqliteConnection,
    ids: &[MessageId],
    at: DateTime<Utc>,
) -> Result<u64> {
    let mut marked = 0;
    for id in ids {
        marked += sqlx::query(
            "UPDATE case_messages SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(at)
        .bind(id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(marked)
}

impl super::Db {
    /// Full thread of a case, unfiltered. Callers showing messages to a
    /// worker go through `Engine::visible_messages` instead.
    pub async fn thread(&self, case_id: CaseId) -> Result<Vec<Message>> {
        let mut conn = self.pool().acquire().await?;
        thread_on(&mut conn, case_id).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    case_id: Uuid,
    sender_id: i64,
    message_type: String,
    content: String,
    visible_to: i64,
    reply_to: Option<i64>,
    attachment_path: Option<String>,
    attachment_name: Option<String>,
    is_confidential: bool,
    sent_at: DateTime<Utc>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn try_into_message(self) -> Result<Message> {
        let attachment = match (self.attachment_path, self.attachment_name) {
            (Some(path), Some(name)) => Some(Attachment { path, name }),
            _ => None,
        };

        Ok(Message {
            id: MessageId(self.id),
            case_id: CaseId(self.case_id),
            sender: WorkerId(self.sender_id),
            message_type: self.message_type.parse()?,
            content: self.content,
            visible_to: LevelSet::from_bits(self.visible_to)?,
            reply_to: self.reply_to.map(MessageId),
            attachment,
            is_confidential: self.is_confidential,
            sent_at: self.sent_at,
            is_read: self.is_read,
            read_at: self.read_at,
        })
    }
}
