//! Participant repository: membership rows, roles, and per-user room
//! settings (pin, notifications, read marker).

use super::{ChangeEvent, ChangeFeed, DbError, now_millis};
use crate::types::{ParticipantRecord, Role};
use sqlx::SqlitePool;

type ParticipantRow = (String, String, String, i64, i64, Option<i64>, i64, i64);

fn participant_from_row(row: ParticipantRow) -> Result<ParticipantRecord, DbError> {
    let (room_id, user_id, role, joined_at, pinned, pinned_at, notifications_enabled, last_read_at) =
        row;
    let role = Role::parse(&role)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown role: {role}")))?;
    Ok(ParticipantRecord {
        room_id,
        user_id,
        role,
        joined_at,
        pinned: pinned != 0,
        pinned_at,
        notifications_enabled: notifications_enabled != 0,
        last_read_at,
    })
}

const PARTICIPANT_COLUMNS: &str =
    "room_id, user_id, role, joined_at, pinned, pinned_at, notifications_enabled, last_read_at";

/// Repository for participant rows.
pub struct ParticipantRepository<'a> {
    pool: &'a SqlitePool,
    feed: &'a ChangeFeed,
}

impl<'a> ParticipantRepository<'a> {
    pub fn new(pool: &'a SqlitePool, feed: &'a ChangeFeed) -> Self {
        Self { pool, feed }
    }

    fn touch(&self, room_id: &str, user_id: &str) {
        self.feed.publish(ChangeEvent::ParticipantUpdated {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    /// Add a user to a room. Fails on the primary key if already present.
    pub async fn insert(&self, room_id: &str, user_id: &str, role: Role) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO participants (room_id, user_id, role, joined_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(now_millis())
        .execute(self.pool)
        .await?;

        self.touch(room_id, user_id);
        Ok(())
    }

    /// Look up one membership row.
    pub async fn get(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRecord>, DbError> {
        let row = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE room_id = ? AND user_id = ?"
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(participant_from_row).transpose()
    }

    /// All participants of a room, oldest membership first.
    pub async fn list(&self, room_id: &str) -> Result<Vec<ParticipantRecord>, DbError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE room_id = ? ORDER BY joined_at ASC"
        ))
        .bind(room_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(participant_from_row).collect()
    }

    /// All memberships of a user across rooms.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<ParticipantRecord>, DbError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(participant_from_row).collect()
    }

    /// Owners and admins of a room other than `user_id`. Used by the
    /// leave path to decide whether a handover nominee is required.
    pub async fn moderators_excluding(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Vec<ParticipantRecord>, DbError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            r#"
            SELECT {PARTICIPANT_COLUMNS} FROM participants
            WHERE room_id = ? AND user_id != ? AND role IN ('owner', 'admin')
            "#
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(participant_from_row).collect()
    }

    /// Number of participants in a room.
    pub async fn count(&self, room_id: &str) -> Result<u32, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM participants WHERE room_id = ?")
                .bind(room_id)
                .fetch_one(self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Remove a membership row. Returns whether a row was removed.
    pub async fn delete(&self, room_id: &str, user_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM participants WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.touch(room_id, user_id);
        }
        Ok(deleted)
    }

    /// Change a participant's role.
    pub async fn update_role(
        &self,
        room_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE participants SET role = ? WHERE room_id = ? AND user_id = ?")
            .bind(role.as_str())
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        self.touch(room_id, user_id);
        Ok(())
    }

    /// Pin or unpin the room in this user's list. `pinned_at` keeps the
    /// pin order stable across later pins.
    pub async fn set_pinned(
        &self,
        room_id: &str,
        user_id: &str,
        pinned: bool,
    ) -> Result<(), DbError> {
        let pinned_at = pinned.then(now_millis);
        sqlx::query(
            "UPDATE participants SET pinned = ?, pinned_at = ? WHERE room_id = ? AND user_id = ?",
        )
        .bind(pinned as i64)
        .bind(pinned_at)
        .bind(room_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        self.touch(room_id, user_id);
        Ok(())
    }

    /// Toggle notifications for this user's membership.
    pub async fn set_notifications(
        &self,
        room_id: &str,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE participants SET notifications_enabled = ? WHERE room_id = ? AND user_id = ?",
        )
        .bind(enabled as i64)
        .bind(room_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        self.touch(room_id, user_id);
        Ok(())
    }

    /// Advance the read marker to now.
    pub async fn set_last_read(&self, room_id: &str, user_id: &str) -> Result<i64, DbError> {
        let now = now_millis();
        sqlx::query("UPDATE participants SET last_read_at = ? WHERE room_id = ? AND user_id = ?")
            .bind(now)
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        self.touch(room_id, user_id);
        Ok(now)
    }
}
