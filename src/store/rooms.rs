//! Room repository.

use super::{ChangeEvent, ChangeFeed, DbError, now_millis};
use crate::types::{MessageKind, MessageRecord, Role, Room, RoomKind};
use sqlx::SqlitePool;
use uuid::Uuid;

type RoomRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

fn room_from_row(row: RoomRow) -> Result<Room, DbError> {
    let (id, kind, title, created_by, project_id, collaboration_id, notice_message_id, image_url, created_at) =
        row;
    let kind = RoomKind::parse(&kind)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown room kind: {kind}")))?;
    Ok(Room {
        id,
        kind,
        title,
        created_by,
        project_id,
        collaboration_id,
        notice_message_id,
        image_url,
        created_at,
    })
}

const ROOM_COLUMNS: &str =
    "id, kind, title, created_by, project_id, collaboration_id, notice_message_id, image_url, created_at";

/// Fields for a room about to be created.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub kind: RoomKind,
    pub title: String,
    pub created_by: String,
    pub project_id: Option<String>,
    pub collaboration_id: Option<String>,
    pub image_url: Option<String>,
}

/// Repository for room rows.
pub struct RoomRepository<'a> {
    pool: &'a SqlitePool,
    feed: &'a ChangeFeed,
}

impl<'a> RoomRepository<'a> {
    pub fn new(pool: &'a SqlitePool, feed: &'a ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Create a room together with its initial participant set and an
    /// optional opening system message, in one transaction.
    ///
    /// A room is never visible without at least one participant.
    pub async fn create_with_participants(
        &self,
        room: NewRoom,
        participants: &[(String, Role)],
        initial_message: Option<&str>,
    ) -> Result<Room, DbError> {
        if participants.is_empty() {
            return Err(DbError::Internal(
                "room created without participants".to_string(),
            ));
        }

        let now = now_millis();
        let room_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, kind, title, created_by, project_id, collaboration_id, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room_id)
        .bind(room.kind.as_str())
        .bind(&room.title)
        .bind(&room.created_by)
        .bind(&room.project_id)
        .bind(&room.collaboration_id)
        .bind(&room.image_url)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (user_id, role) in participants {
            sqlx::query(
                r#"
                INSERT INTO participants (room_id, user_id, role, joined_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&room_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let opening = if let Some(content) = initial_message {
            let message_id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO messages (id, room_id, sender_id, content, kind, created_at)
                VALUES (?, ?, ?, ?, 'system', ?)
                "#,
            )
            .bind(&message_id)
            .bind(&room_id)
            .bind(&room.created_by)
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            Some(MessageRecord {
                id: message_id,
                room_id: room_id.clone(),
                sender_id: room.created_by.clone(),
                content: Some(content.to_string()),
                attachments: Vec::new(),
                kind: MessageKind::System,
                created_at: now,
            })
        } else {
            None
        };

        tx.commit().await?;

        self.feed.publish(ChangeEvent::RoomUpdated {
            room_id: room_id.clone(),
        });
        for (user_id, _) in participants {
            self.feed.publish(ChangeEvent::ParticipantUpdated {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            });
        }
        if let Some(record) = opening {
            self.feed.publish(ChangeEvent::MessageInserted(record));
        }

        Ok(Room {
            id: room_id,
            kind: room.kind,
            title: room.title,
            created_by: room.created_by,
            project_id: room.project_id,
            collaboration_id: room.collaboration_id,
            notice_message_id: None,
            image_url: room.image_url,
            created_at: now,
        })
    }

    /// Find a room by id.
    pub async fn find(&self, room_id: &str) -> Result<Option<Room>, DbError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"
        ))
        .bind(room_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(room_from_row).transpose()
    }

    /// The most recent room linked to a project, if any.
    pub async fn find_by_project(&self, project_id: &str) -> Result<Option<Room>, DbError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE project_id = ? ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(room_from_row).transpose()
    }

    /// The room linked to a collaboration, if any.
    pub async fn find_by_collaboration(
        &self,
        collaboration_id: &str,
    ) -> Result<Option<Room>, DbError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE collaboration_id = ? ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(collaboration_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(room_from_row).transpose()
    }

    /// Rename the room.
    pub async fn update_title(&self, room_id: &str, title: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE rooms SET title = ? WHERE id = ?")
            .bind(title)
            .bind(room_id)
            .execute(self.pool)
            .await?;

        self.feed.publish(ChangeEvent::RoomUpdated {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Point the creator reference at a new owner (ownership handover).
    pub async fn update_created_by(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE rooms SET created_by = ? WHERE id = ?")
            .bind(user_id)
            .bind(room_id)
            .execute(self.pool)
            .await?;

        self.feed.publish(ChangeEvent::RoomUpdated {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Set or clear the pinned notice reference. The message itself is
    /// untouched; the notice is a room-level pointer.
    pub async fn set_notice(
        &self,
        room_id: &str,
        message_id: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE rooms SET notice_message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(room_id)
            .execute(self.pool)
            .await?;

        self.feed.publish(ChangeEvent::RoomUpdated {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Set or clear the room image URL.
    pub async fn set_image(&self, room_id: &str, image_url: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE rooms SET image_url = ? WHERE id = ?")
            .bind(image_url)
            .bind(room_id)
            .execute(self.pool)
            .await?;

        self.feed.publish(ChangeEvent::RoomUpdated {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Delete a room, cascading to its messages, participants, and
    /// invitations.
    pub async fn delete(&self, room_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id)
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.feed.publish(ChangeEvent::RoomUpdated {
                room_id: room_id.to_string(),
            });
        }
        Ok(deleted)
    }
}
