//! Invitation lifecycle: batch invites, accept/reject/withdraw, and the
//! pending inbox.
//!
//! Resolved invitations are terminal. Accepting runs a compensating
//! rollback if the membership insert fails, so an invitation is never
//! left consumed without a participant row to show for it.

use crate::config::InvitationConfig;
use crate::directory::{UserDirectory, display_name};
use crate::error::{ChatError, ChatResult};
use crate::messages::post_system;
use crate::perm::RoomAction;
use crate::session::SessionState;
use crate::store::{Database, now_millis};
use crate::types::{InvitationRecord, InvitationStatus, InvitationView, InviteOutcome, Role};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct InvitationService {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    session: Arc<SessionState>,
    config: InvitationConfig,
}

impl InvitationService {
    pub fn new(
        db: Database,
        directory: Arc<dyn UserDirectory>,
        session: Arc<SessionState>,
        config: InvitationConfig,
    ) -> Self {
        Self {
            db,
            directory,
            session,
            config,
        }
    }

    /// Invite a batch of users to a room.
    ///
    /// Each invitee falls into one bucket: already a participant, already
    /// holding a pending invitation, or freshly invited. Partial success
    /// is reported through the outcome, never raised as an error.
    pub async fn invite(
        &self,
        room_id: &str,
        invitee_ids: &[String],
        message: Option<&str>,
    ) -> ChatResult<InviteOutcome> {
        let me = &self.session.user_id;
        let actor = self
            .db
            .participants()
            .get(room_id, me)
            .await?
            .ok_or_else(|| ChatError::Permission("not a participant of this room".to_string()))?;
        if !actor.role.permits(RoomAction::Invite) {
            return Err(ChatError::Permission(
                "only the owner and admins can invite".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let candidates: Vec<String> = invitee_ids
            .iter()
            .filter(|id| !id.is_empty() && *id != me && seen.insert((*id).clone()))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(ChatError::Validation("no invitees given".to_string()));
        }

        let members: HashSet<String> = self
            .db
            .participants()
            .list(room_id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        let pending: HashSet<String> = self
            .db
            .invitations()
            .pending_invitees_among(room_id, &candidates)
            .await?
            .into_iter()
            .collect();

        let mut outcome = InviteOutcome::default();
        let mut fresh = Vec::new();
        for id in candidates {
            if members.contains(&id) {
                outcome.already_in_room += 1;
            } else if pending.contains(&id) {
                outcome.already_invited += 1;
            } else {
                fresh.push(id);
            }
        }

        if fresh.is_empty() {
            return Ok(outcome);
        }

        // Stale resolved rows for these invitees are cleared first so each
        // invitation id maps to one lifecycle.
        self.db
            .invitations()
            .delete_for_invitees(room_id, &fresh)
            .await?;

        let expires_at = now_millis() + self.config.expiry_days as i64 * DAY_MS;
        let inviter_name = display_name(&self.directory, me).await;
        for invitee_id in &fresh {
            self.db
                .invitations()
                .insert(room_id, me, invitee_id, message, expires_at)
                .await?;
            outcome.sent += 1;

            let invitee_name = display_name(&self.directory, invitee_id).await;
            post_system(
                &self.db,
                room_id,
                me,
                format!("{inviter_name} invited {invitee_name}."),
            )
            .await;
        }

        info!(
            room_id = %room_id,
            sent = outcome.sent,
            already_in_room = outcome.already_in_room,
            already_invited = outcome.already_invited,
            "Invitations processed"
        );
        Ok(outcome)
    }

    async fn find_invitation(&self, invitation_id: &str) -> ChatResult<InvitationRecord> {
        self.db
            .invitations()
            .find(invitation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("invitation {invitation_id}")))
    }

    /// Accept an invitation, joining the room as a member. Returns the
    /// room id. A second accept of the same invitation short-circuits to
    /// the same room id instead of failing.
    pub async fn accept(&self, invitation_id: &str) -> ChatResult<String> {
        let invitation = self.find_invitation(invitation_id).await?;
        let me = &self.session.user_id;
        if invitation.invitee_id != *me {
            return Err(ChatError::Authorization(
                "this invitation is addressed to someone else".to_string(),
            ));
        }

        match invitation.status {
            InvitationStatus::Pending => {}
            InvitationStatus::Accepted => {
                // Double accept (two tabs, a retried request) lands here.
                if self
                    .db
                    .participants()
                    .get(&invitation.room_id, me)
                    .await?
                    .is_some()
                {
                    return Ok(invitation.room_id);
                }
                return Err(ChatError::State(
                    "invitation already accepted".to_string(),
                ));
            }
            _ => {
                return Err(ChatError::State(format!(
                    "invitation already {}",
                    invitation.status.as_str()
                )));
            }
        }

        if now_millis() >= invitation.expires_at {
            self.db
                .invitations()
                .update_status(&invitation, InvitationStatus::Expired)
                .await?;
            return Err(ChatError::Expired);
        }

        self.db
            .invitations()
            .update_status(&invitation, InvitationStatus::Accepted)
            .await?;

        if let Err(e) = self
            .db
            .participants()
            .insert(&invitation.room_id, me, Role::Member)
            .await
        {
            // Compensating rollback: the invitation must not stay consumed
            // without a membership row.
            warn!(invitation_id = %invitation.id, error = %e, "Join failed, rolling invitation back");
            self.db.invitations().rollback_to_pending(&invitation).await?;
            return Err(e.into());
        }

        info!(room_id = %invitation.room_id, user = %me, "Invitation accepted");

        let name = display_name(&self.directory, me).await;
        post_system(
            &self.db,
            &invitation.room_id,
            me,
            format!("{name} joined the room."),
        )
        .await;

        Ok(invitation.room_id)
    }

    /// Decline an invitation. Invitee only; pending only.
    pub async fn reject(&self, invitation_id: &str) -> ChatResult<()> {
        let invitation = self.find_invitation(invitation_id).await?;
        if invitation.invitee_id != self.session.user_id {
            return Err(ChatError::Authorization(
                "this invitation is addressed to someone else".to_string(),
            ));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(ChatError::State(format!(
                "invitation already {}",
                invitation.status.as_str()
            )));
        }
        if now_millis() >= invitation.expires_at {
            self.db
                .invitations()
                .update_status(&invitation, InvitationStatus::Expired)
                .await?;
            return Err(ChatError::Expired);
        }

        self.db
            .invitations()
            .update_status(&invitation, InvitationStatus::Rejected)
            .await?;
        info!(invitation_id = %invitation.id, "Invitation rejected");
        Ok(())
    }

    /// Take back an invitation before it is answered. Inviter only.
    pub async fn withdraw(&self, invitation_id: &str) -> ChatResult<()> {
        let invitation = self.find_invitation(invitation_id).await?;
        if invitation.inviter_id != self.session.user_id {
            return Err(ChatError::Authorization(
                "only the inviter can withdraw an invitation".to_string(),
            ));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(ChatError::State(format!(
                "invitation already {}",
                invitation.status.as_str()
            )));
        }

        self.db
            .invitations()
            .update_status(&invitation, InvitationStatus::Withdrawn)
            .await?;
        info!(invitation_id = %invitation.id, "Invitation withdrawn");
        Ok(())
    }

    /// The session user's live pending invitations, newest first. Rows
    /// past expiry are filtered here; their status flips lazily when
    /// someone touches them.
    pub async fn received(&self) -> ChatResult<Vec<InvitationView>> {
        let records = self
            .db
            .invitations()
            .received_pending(&self.session.user_id, now_millis())
            .await?;
        self.resolve_views(records).await
    }

    /// Badge count of live pending invitations.
    pub async fn received_count(&self) -> ChatResult<u32> {
        Ok(self
            .db
            .invitations()
            .received_pending_count(&self.session.user_id, now_millis())
            .await?)
    }

    /// Pending invitations outstanding for a room the session user is in.
    pub async fn sent_pending(&self, room_id: &str) -> ChatResult<Vec<InvitationView>> {
        if self
            .db
            .participants()
            .get(room_id, &self.session.user_id)
            .await?
            .is_none()
        {
            return Err(ChatError::Permission(
                "not a participant of this room".to_string(),
            ));
        }

        let records = self.db.invitations().sent_pending(room_id).await?;
        self.resolve_views(records).await
    }

    async fn resolve_views(
        &self,
        records: Vec<InvitationRecord>,
    ) -> ChatResult<Vec<InvitationView>> {
        let user_ids: Vec<String> = records
            .iter()
            .flat_map(|r| [r.inviter_id.clone(), r.invitee_id.clone()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let details = self.directory.batch_details(&user_ids).await;
        let name_of = |id: &str| {
            details
                .get(id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "Unknown".to_string())
        };
        let avatar_of = |id: &str| details.get(id).and_then(|d| d.avatar.clone());

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let room_title = self
                .db
                .rooms()
                .find(&record.room_id)
                .await?
                .map(|r| r.title)
                .unwrap_or_default();
            views.push(InvitationView {
                room_title,
                inviter_name: name_of(&record.inviter_id),
                inviter_avatar: avatar_of(&record.inviter_id),
                invitee_name: name_of(&record.invitee_id),
                invitee_avatar: avatar_of(&record.invitee_id),
                id: record.id,
                room_id: record.room_id,
                inviter_id: record.inviter_id,
                invitee_id: record.invitee_id,
                status: record.status,
                message: record.message,
                sent_at: record.sent_at,
                responded_at: record.responded_at,
                expires_at: record.expires_at,
            });
        }
        Ok(views)
    }
}
