//! Message repository.
//!
//! Message ids and timestamps are assigned here, never by the caller:
//! the store is the authoritative clock, so provisional client entries
//! always reconcile against server-ordered rows.

use super::{ChangeEvent, ChangeFeed, DbError, now_millis};
use crate::types::{Attachment, MessageKind, MessageRecord};
use sqlx::SqlitePool;
use uuid::Uuid;

type MessageRow = (String, String, String, Option<String>, String, String, i64);

fn message_from_row(row: MessageRow) -> Result<MessageRecord, DbError> {
    let (id, room_id, sender_id, content, attachments, kind, created_at) = row;
    let kind = MessageKind::parse(&kind)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown message kind: {kind}")))?;
    let attachments: Vec<Attachment> = serde_json::from_str(&attachments)
        .map_err(|e| DbError::CorruptRow(format!("bad attachments payload: {e}")))?;
    Ok(MessageRecord {
        id,
        room_id,
        sender_id,
        content,
        attachments,
        kind,
        created_at,
    })
}

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, content, attachments, kind, created_at";

/// Fields for a message about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub kind: MessageKind,
}

/// Repository for message rows.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
    feed: &'a ChangeFeed,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool, feed: &'a ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Insert a message, assigning its id and timestamp. The stored
    /// record is published on the change feed and returned.
    pub async fn insert(&self, message: NewMessage) -> Result<MessageRecord, DbError> {
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content,
            attachments: message.attachments,
            kind: message.kind,
            created_at: now_millis(),
        };

        let attachments = serde_json::to_string(&record.attachments)
            .map_err(|e| DbError::Internal(format!("attachment encode failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, attachments, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.room_id)
        .bind(&record.sender_id)
        .bind(&record.content)
        .bind(&attachments)
        .bind(record.kind.as_str())
        .bind(record.created_at)
        .execute(self.pool)
        .await?;

        self.feed.publish(ChangeEvent::MessageInserted(record.clone()));
        Ok(record)
    }

    /// Find a message by id.
    pub async fn find(&self, message_id: &str) -> Result<Option<MessageRecord>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(message_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    /// Full room history, oldest first.
    pub async fn list(&self, room_id: &str) -> Result<Vec<MessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(room_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    /// The newest message in a room, if any.
    pub async fn last_for_room(&self, room_id: &str) -> Result<Option<MessageRecord>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = ? ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(room_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    /// Messages from other senders newer than the read marker.
    pub async fn unread_count(
        &self,
        room_id: &str,
        user_id: &str,
        since: i64,
    ) -> Result<u32, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE room_id = ? AND created_at > ? AND sender_id != ?",
        )
        .bind(room_id)
        .bind(since)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count as u32)
    }

    /// One page of attachment-bearing messages, newest first. `before`
    /// is a keyset cursor on `created_at`; pass `None` for the first page.
    pub async fn media_page(
        &self,
        room_id: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let cursor = before.unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE room_id = ? AND created_at < ? AND attachments != '[]'
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(room_id)
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    /// Rewrite a message's attachment list (media deletion keeps the
    /// message row when other attachments remain).
    pub async fn update_attachments(
        &self,
        message_id: &str,
        attachments: &[Attachment],
    ) -> Result<(), DbError> {
        let payload = serde_json::to_string(attachments)
            .map_err(|e| DbError::Internal(format!("attachment encode failed: {e}")))?;

        sqlx::query("UPDATE messages SET attachments = ? WHERE id = ?")
            .bind(&payload)
            .bind(message_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete a message by id. Returns whether a row was removed.
    pub async fn delete(&self, room_id: &str, message_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ? AND room_id = ?")
            .bind(message_id)
            .bind(room_id)
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.feed.publish(ChangeEvent::MessageDeleted {
                room_id: room_id.to_string(),
                message_id: message_id.to_string(),
            });
        }
        Ok(deleted)
    }
}
