//! Participant management: rosters, roles, kicks, and per-user room
//! settings.

use crate::directory::{UserDirectory, display_name};
use crate::error::{ChatError, ChatResult};
use crate::messages::post_system;
use crate::perm::RoomAction;
use crate::session::SessionState;
use crate::store::Database;
use crate::types::{ParticipantRecord, ParticipantView, Role};
use std::sync::Arc;
use tracing::info;

pub struct ParticipantService {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    session: Arc<SessionState>,
}

impl ParticipantService {
    pub fn new(
        db: Database,
        directory: Arc<dyn UserDirectory>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            db,
            directory,
            session,
        }
    }

    async fn require_membership(&self, room_id: &str) -> ChatResult<ParticipantRecord> {
        self.db
            .participants()
            .get(room_id, &self.session.user_id)
            .await?
            .ok_or_else(|| ChatError::Permission("not a participant of this room".to_string()))
    }

    /// Roster with directory details, sorted owner first, then admins,
    /// then members by join time.
    pub async fn participants(&self, room_id: &str) -> ChatResult<Vec<ParticipantView>> {
        self.require_membership(room_id).await?;

        let mut records = self.db.participants().list(room_id).await?;
        records.sort_by_key(|p| (p.role.rank(), p.joined_at));

        let ids: Vec<String> = records.iter().map(|p| p.user_id.clone()).collect();
        let details = self.directory.batch_details(&ids).await;

        Ok(records
            .into_iter()
            .map(|p| {
                let (name, avatar) = match details.get(&p.user_id) {
                    Some(d) => (d.name.clone(), d.avatar.clone()),
                    None => ("Unknown".to_string(), None),
                };
                ParticipantView {
                    user_id: p.user_id,
                    name,
                    avatar,
                    role: p.role,
                    joined_at: p.joined_at,
                }
            })
            .collect())
    }

    /// The session user's role in a room, if a participant.
    pub async fn my_role(&self, room_id: &str) -> ChatResult<Option<Role>> {
        Ok(self
            .db
            .participants()
            .get(room_id, &self.session.user_id)
            .await?
            .map(|p| p.role))
    }

    /// Grant or revoke the admin role. Owner only; the owner role itself
    /// moves through ownership transfer, never through here.
    pub async fn update_role(
        &self,
        room_id: &str,
        target_id: &str,
        new_role: Role,
    ) -> ChatResult<()> {
        if new_role == Role::Owner {
            return Err(ChatError::Validation(
                "ownership is transferred, not assigned".to_string(),
            ));
        }

        let actor = self.require_membership(room_id).await?;
        if !actor.role.permits(RoomAction::ManageRoles) {
            return Err(ChatError::Permission(
                "only the owner can manage roles".to_string(),
            ));
        }
        if target_id == actor.user_id {
            return Err(ChatError::State(
                "the owner cannot change their own role".to_string(),
            ));
        }

        let target = self
            .db
            .participants()
            .get(room_id, target_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("participant {target_id}")))?;
        if target.role == new_role {
            return Ok(());
        }

        self.db
            .participants()
            .update_role(room_id, target_id, new_role)
            .await?;
        info!(room_id = %room_id, target = %target_id, role = %new_role, "Participant role updated");

        let actor_name = display_name(&self.directory, &actor.user_id).await;
        let target_name = display_name(&self.directory, target_id).await;
        let line = match new_role {
            Role::Admin => format!("{actor_name} granted admin to {target_name}."),
            _ => format!("{actor_name} revoked admin from {target_name}."),
        };
        post_system(&self.db, room_id, &actor.user_id, line).await;

        Ok(())
    }

    /// Remove a participant. Owner and admins may kick; the owner is
    /// never a valid target. Pending invitations for the target are
    /// purged so they cannot walk straight back in.
    pub async fn kick(&self, room_id: &str, target_id: &str) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        let target = self
            .db
            .participants()
            .get(room_id, target_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("participant {target_id}")))?;

        if !actor.role.can_kick(target.role) {
            return Err(ChatError::Permission(
                "not allowed to remove this participant".to_string(),
            ));
        }

        self.db.participants().delete(room_id, target_id).await?;
        self.db
            .invitations()
            .delete_for_user(room_id, target_id)
            .await?;
        info!(room_id = %room_id, target = %target_id, "Participant removed");

        let actor_name = display_name(&self.directory, &actor.user_id).await;
        let target_name = display_name(&self.directory, target_id).await;
        post_system(
            &self.db,
            room_id,
            &actor.user_id,
            format!("{actor_name} removed {target_name}."),
        )
        .await;

        Ok(())
    }

    /// Pin or unpin the room in the session user's list.
    pub async fn set_pinned(&self, room_id: &str, pinned: bool) -> ChatResult<()> {
        self.require_membership(room_id).await?;
        self.db
            .participants()
            .set_pinned(room_id, &self.session.user_id, pinned)
            .await?;
        Ok(())
    }

    /// Toggle notifications for the session user's membership.
    pub async fn set_notifications(&self, room_id: &str, enabled: bool) -> ChatResult<()> {
        self.require_membership(room_id).await?;
        self.db
            .participants()
            .set_notifications(room_id, &self.session.user_id, enabled)
            .await?;
        Ok(())
    }

    /// Advance the read marker to now and zero the in-memory counter.
    pub async fn mark_read(&self, room_id: &str) -> ChatResult<()> {
        self.require_membership(room_id).await?;
        self.db
            .participants()
            .set_last_read(room_id, &self.session.user_id)
            .await?;
        self.session.unread.reset(room_id);
        Ok(())
    }
}
