//! Invitation repository.
//!
//! Status rows are never flipped back to life once resolved; a fresh
//! invite deletes the stale row and inserts a new pending one, so each
//! invitation id maps to exactly one lifecycle.

use super::{ChangeEvent, ChangeFeed, DbError, now_millis};
use crate::types::{InvitationRecord, InvitationStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

type InvitationRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    Option<i64>,
    i64,
);

fn invitation_from_row(row: InvitationRow) -> Result<InvitationRecord, DbError> {
    let (id, room_id, inviter_id, invitee_id, status, message, sent_at, responded_at, expires_at) =
        row;
    let status = InvitationStatus::parse(&status)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown invitation status: {status}")))?;
    Ok(InvitationRecord {
        id,
        room_id,
        inviter_id,
        invitee_id,
        status,
        message,
        sent_at,
        responded_at,
        expires_at,
    })
}

const INVITATION_COLUMNS: &str =
    "id, room_id, inviter_id, invitee_id, status, message, sent_at, responded_at, expires_at";

/// Repository for invitation rows.
pub struct InvitationRepository<'a> {
    pool: &'a SqlitePool,
    feed: &'a ChangeFeed,
}

impl<'a> InvitationRepository<'a> {
    pub fn new(pool: &'a SqlitePool, feed: &'a ChangeFeed) -> Self {
        Self { pool, feed }
    }

    fn touch(&self, room_id: &str, invitee_id: &str) {
        self.feed.publish(ChangeEvent::InvitationChanged {
            room_id: room_id.to_string(),
            invitee_id: invitee_id.to_string(),
        });
    }

    /// Insert a fresh pending invitation.
    pub async fn insert(
        &self,
        room_id: &str,
        inviter_id: &str,
        invitee_id: &str,
        message: Option<&str>,
        expires_at: i64,
    ) -> Result<InvitationRecord, DbError> {
        let record = InvitationRecord {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            inviter_id: inviter_id.to_string(),
            invitee_id: invitee_id.to_string(),
            status: InvitationStatus::Pending,
            message: message.map(str::to_string),
            sent_at: now_millis(),
            responded_at: None,
            expires_at,
        };

        sqlx::query(
            r#"
            INSERT INTO invitations (id, room_id, inviter_id, invitee_id, status, message, sent_at, expires_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(room_id)
        .bind(inviter_id)
        .bind(invitee_id)
        .bind(&record.message)
        .bind(record.sent_at)
        .bind(record.expires_at)
        .execute(self.pool)
        .await?;

        self.touch(room_id, invitee_id);
        Ok(record)
    }

    /// Find an invitation by id.
    pub async fn find(&self, invitation_id: &str) -> Result<Option<InvitationRecord>, DbError> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?"
        ))
        .bind(invitation_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(invitation_from_row).transpose()
    }

    /// Among `invitee_ids`, the subset that already holds a pending
    /// invitation to this room.
    pub async fn pending_invitees_among(
        &self,
        room_id: &str,
        invitee_ids: &[String],
    ) -> Result<Vec<String>, DbError> {
        if invitee_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; invitee_ids.len()].join(", ");
        let sql = format!(
            "SELECT invitee_id FROM invitations WHERE room_id = ? AND status = 'pending' AND invitee_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, (String,)>(&sql).bind(room_id);
        for id in invitee_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Drop any stale (non-pending) rows for these invitees in this room,
    /// clearing the way for fresh inserts.
    pub async fn delete_for_invitees(
        &self,
        room_id: &str,
        invitee_ids: &[String],
    ) -> Result<(), DbError> {
        if invitee_ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; invitee_ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM invitations WHERE room_id = ? AND invitee_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(room_id);
        for id in invitee_ids {
            query = query.bind(id);
        }
        query.execute(self.pool).await?;
        Ok(())
    }

    /// Remove all of a user's invitations to a room, in any status. Used
    /// when the user is kicked.
    pub async fn delete_for_user(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM invitations WHERE room_id = ? AND invitee_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        self.touch(room_id, user_id);
        Ok(())
    }

    /// Move an invitation to a resolved status, stamping the response time.
    pub async fn update_status(
        &self,
        invitation: &InvitationRecord,
        status: InvitationStatus,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE invitations SET status = ?, responded_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_millis())
            .bind(&invitation.id)
            .execute(self.pool)
            .await?;

        self.touch(&invitation.room_id, &invitation.invitee_id);
        Ok(())
    }

    /// Compensating rollback: put an invitation back to pending after a
    /// failed participant insert, clearing the response stamp.
    pub async fn rollback_to_pending(&self, invitation: &InvitationRecord) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE invitations SET status = 'pending', responded_at = NULL WHERE id = ?",
        )
        .bind(&invitation.id)
        .execute(self.pool)
        .await?;

        self.touch(&invitation.room_id, &invitation.invitee_id);
        Ok(())
    }

    /// Pending invitations received by a user that have not yet expired,
    /// newest first.
    pub async fn received_pending(
        &self,
        invitee_id: &str,
        now: i64,
    ) -> Result<Vec<InvitationRecord>, DbError> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM invitations
            WHERE invitee_id = ? AND status = 'pending' AND expires_at > ?
            ORDER BY sent_at DESC
            "#
        ))
        .bind(invitee_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(invitation_from_row).collect()
    }

    /// Count of live pending invitations for a user (badge count).
    pub async fn received_pending_count(&self, invitee_id: &str, now: i64) -> Result<u32, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM invitations WHERE invitee_id = ? AND status = 'pending' AND expires_at > ?",
        )
        .bind(invitee_id)
        .bind(now)
        .fetch_one(self.pool)
        .await?;
        Ok(count as u32)
    }

    /// Pending invitations outstanding for a room, newest first.
    pub async fn sent_pending(&self, room_id: &str) -> Result<Vec<InvitationRecord>, DbError> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM invitations
            WHERE room_id = ? AND status = 'pending'
            ORDER BY sent_at DESC
            "#
        ))
        .bind(room_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(invitation_from_row).collect()
    }

    /// Whether a user already accepted an invitation to this room. Backs
    /// the idempotent double-accept short circuit.
    pub async fn accepted_exists(&self, room_id: &str, invitee_id: &str) -> Result<bool, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM invitations WHERE room_id = ? AND invitee_id = ? AND status = 'accepted'",
        )
        .bind(room_id)
        .bind(invitee_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }
}
