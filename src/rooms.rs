//! Room lifecycle: creation, listing, rename, leave with ownership
//! handover, notices, and the media gallery.

use crate::directory::{BlockService, UserDirectory, display_name};
use crate::error::{ChatError, ChatResult};
use crate::messages::post_system;
use crate::perm::RoomAction;
use crate::session::SessionState;
use crate::store::{Database, NewRoom};
use crate::types::{
    MediaFilter, MediaItem, NoticeView, Role, Room, RoomFilter, RoomKind, RoomSummary,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Request to create a room. The owner defaults to the session user but
/// can be overridden (rooms opened on someone's behalf); everyone in
/// `member_ids` joins as a member.
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub kind: RoomKind,
    pub title: String,
    pub member_ids: Vec<String>,
    pub owner_id: Option<String>,
    pub project_id: Option<String>,
    pub collaboration_id: Option<String>,
    pub image_url: Option<String>,
}

/// Default media gallery page size.
pub const MEDIA_PAGE_SIZE: u32 = 30;

pub struct RoomService {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    blocks: Arc<dyn BlockService>,
    session: Arc<SessionState>,
}

impl RoomService {
    pub fn new(
        db: Database,
        directory: Arc<dyn UserDirectory>,
        blocks: Arc<dyn BlockService>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            db,
            directory,
            blocks,
            session,
        }
    }

    async fn require_membership(&self, room_id: &str) -> ChatResult<crate::types::ParticipantRecord> {
        self.db
            .participants()
            .get(room_id, &self.session.user_id)
            .await?
            .ok_or_else(|| ChatError::Permission("not a participant of this room".to_string()))
    }

    /// Create a room. The session user owns it unless `owner_id` says
    /// otherwise.
    pub async fn create_room(&self, req: CreateRoom) -> ChatResult<Room> {
        let owner = req
            .owner_id
            .clone()
            .unwrap_or_else(|| self.session.user_id.clone());
        let title = req.title.trim();
        // Partner rooms are untitled; the list renders the counterpart's
        // name instead.
        if title.is_empty() && req.kind != RoomKind::Partner {
            return Err(ChatError::Validation("room title is empty".to_string()));
        }

        let mut seen = HashSet::new();
        let members: Vec<String> = req
            .member_ids
            .iter()
            .filter(|id| !id.is_empty() && **id != owner && seen.insert((*id).clone()))
            .cloned()
            .collect();

        if req.kind == RoomKind::Partner {
            if members.len() != 1 {
                return Err(ChatError::Validation(
                    "a partner room has exactly one counterpart".to_string(),
                ));
            }
            if self
                .blocks
                .is_blocked_bidirectional(&owner, &members[0])
                .await
            {
                return Err(ChatError::Permission(
                    "messaging is blocked between these users".to_string(),
                ));
            }
        }

        let mut participants = vec![(owner.clone(), Role::Owner)];
        participants.extend(members.into_iter().map(|id| (id, Role::Member)));

        let room = self
            .db
            .rooms()
            .create_with_participants(
                NewRoom {
                    kind: req.kind,
                    title: title.to_string(),
                    created_by: owner,
                    project_id: req.project_id,
                    collaboration_id: req.collaboration_id,
                    image_url: req.image_url,
                },
                &participants,
                Some("Conversation started."),
            )
            .await?;

        info!(room_id = %room.id, kind = %room.kind, "Room created");
        Ok(room)
    }

    /// Build the room list for the session user.
    ///
    /// Pinned rooms sort first (most recently pinned on top), the rest by
    /// last activity. Partner rooms with a blocked counterpart are
    /// dropped. Authoritative unread counts are pushed into the session
    /// tracker as a side effect.
    pub async fn list_rooms(&self, filter: RoomFilter) -> ChatResult<Vec<RoomSummary>> {
        let me = &self.session.user_id;
        let memberships = self.db.participants().for_user(me).await?;
        let blocked = self.blocks.blocked_ids(me).await;

        // One directory round trip for every name the list needs.
        let mut rosters: HashMap<String, Vec<String>> = HashMap::new();
        let mut all_ids: HashSet<String> = HashSet::new();
        for membership in &memberships {
            let ids: Vec<String> = self
                .db
                .participants()
                .list(&membership.room_id)
                .await?
                .into_iter()
                .map(|p| p.user_id)
                .collect();
            all_ids.extend(ids.iter().cloned());
            rosters.insert(membership.room_id.clone(), ids);
        }
        let id_list: Vec<String> = all_ids.into_iter().collect();
        let details = self.directory.batch_details(&id_list).await;
        let name_of = |id: &str| {
            details
                .get(id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "Unknown".to_string())
        };

        let mut summaries = Vec::new();
        for membership in memberships {
            let Some(room) = self.db.rooms().find(&membership.room_id).await? else {
                continue;
            };
            if !filter.matches(room.kind) {
                continue;
            }

            let participant_ids = rosters.remove(&room.id).unwrap_or_default();
            let others: Vec<&String> =
                participant_ids.iter().filter(|id| *id != me).collect();

            if room.kind == RoomKind::Partner
                && others.iter().any(|id| blocked.contains(id.as_str()))
            {
                continue;
            }

            let last = self.db.messages().last_for_room(&room.id).await?;
            let (last_message, last_message_at) = match &last {
                Some(m) => (preview(m), Some(m.created_at)),
                None => (String::new(), None),
            };

            let unread = self
                .db
                .messages()
                .unread_count(&room.id, me, membership.last_read_at)
                .await?;
            self.session.unread.set(&room.id, unread);

            // Untitled rooms render the counterpart names instead.
            let title = if room.title.is_empty() {
                others
                    .iter()
                    .map(|id| name_of(id))
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                room.title.clone()
            };

            let participant_names = participant_ids.iter().map(|id| name_of(id)).collect();
            summaries.push(RoomSummary {
                id: room.id,
                kind: room.kind,
                title,
                created_by: room.created_by,
                last_message,
                last_message_at,
                unread,
                participant_ids,
                participant_names,
                image_url: room.image_url,
                pinned: membership.pinned,
                pinned_at: membership.pinned_at,
                notifications_enabled: membership.notifications_enabled,
                my_role: membership.role,
                notice_message_id: room.notice_message_id,
                project_id: room.project_id,
                collaboration_id: room.collaboration_id,
            });
        }

        summaries.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.pinned_at.cmp(&a.pinned_at))
                .then(b.last_message_at.cmp(&a.last_message_at))
        });
        Ok(summaries)
    }

    /// Rename a room. Owner only.
    pub async fn rename(&self, room_id: &str, title: &str) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        if !actor.role.permits(RoomAction::RenameRoom) {
            return Err(ChatError::Permission(
                "only the owner can rename the room".to_string(),
            ));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("room title is empty".to_string()));
        }

        self.db.rooms().update_title(room_id, title).await?;
        info!(room_id = %room_id, "Room renamed");
        Ok(())
    }

    /// Change or clear the room image.
    pub async fn set_image(&self, room_id: &str, image_url: Option<&str>) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        if !actor.role.permits(RoomAction::ManageMedia) {
            return Err(ChatError::Permission(
                "only the owner and admins can change the room image".to_string(),
            ));
        }
        self.db.rooms().set_image(room_id, image_url).await?;
        Ok(())
    }

    /// Delete a room and everything in it. Restricted to the creator.
    pub async fn delete_room(&self, room_id: &str) -> ChatResult<()> {
        let room = self
            .db
            .rooms()
            .find(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;
        if room.created_by != self.session.user_id {
            return Err(ChatError::Authorization(
                "only the room creator can delete the room".to_string(),
            ));
        }

        self.db.rooms().delete(room_id).await?;
        self.session.drop_cache(room_id);
        info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    /// Leave a room.
    ///
    /// A departing owner must hand ownership over first: an explicit
    /// nominee wins, otherwise the longest-serving admin is promoted, and
    /// with neither available the leave is refused. The last participant
    /// leaving deletes the room. The departure system message carries a
    /// re-invite token so remaining participants can ask the user back.
    pub async fn leave(&self, room_id: &str, nominee: Option<&str>) -> ChatResult<()> {
        let me = self.session.user_id.clone();
        let membership = self.require_membership(room_id).await?;

        let count = self.db.participants().count(room_id).await?;
        if count <= 1 {
            self.db.rooms().delete(room_id).await?;
            self.session.drop_cache(room_id);
            info!(room_id = %room_id, "Last participant left, room deleted");
            return Ok(());
        }

        if membership.role == Role::Owner {
            let successor_id = match nominee {
                Some(id) if id == me => {
                    return Err(ChatError::Validation(
                        "cannot nominate yourself".to_string(),
                    ));
                }
                Some(id) => {
                    self.db
                        .participants()
                        .get(room_id, id)
                        .await?
                        .ok_or_else(|| ChatError::NotFound(format!("participant {id}")))?;
                    id.to_string()
                }
                None => {
                    let mut moderators = self
                        .db
                        .participants()
                        .moderators_excluding(room_id, &me)
                        .await?;
                    moderators.sort_by_key(|p| p.joined_at);
                    match moderators.first() {
                        Some(admin) => admin.user_id.clone(),
                        None => return Err(ChatError::HandoverRequired),
                    }
                }
            };

            // Promote before removing the departing row so the room never
            // exists without an owner.
            self.db
                .participants()
                .update_role(room_id, &successor_id, Role::Owner)
                .await?;
            self.db.rooms().update_created_by(room_id, &successor_id).await?;
            info!(room_id = %room_id, successor = %successor_id, "Ownership handed over");
        }

        self.db.participants().delete(room_id, &me).await?;
        // Outstanding invitations sent to the departing user are stale.
        self.db.invitations().delete_for_user(room_id, &me).await?;

        let name = display_name(&self.directory, &me).await;
        post_system(
            &self.db,
            room_id,
            &me,
            format!("{name} left the room.|invitee={me}"),
        )
        .await;

        self.session.drop_cache(room_id);
        info!(room_id = %room_id, user = %me, "Left room");
        Ok(())
    }

    /// Transfer ownership to another participant. The previous owner
    /// stays in the room as an admin.
    pub async fn set_owner(&self, room_id: &str, target_id: &str) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        if actor.role != Role::Owner {
            return Err(ChatError::Permission(
                "only the owner can transfer ownership".to_string(),
            ));
        }
        if target_id == actor.user_id {
            return Err(ChatError::State("already the owner".to_string()));
        }
        self.db
            .participants()
            .get(room_id, target_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("participant {target_id}")))?;

        self.db
            .participants()
            .update_role(room_id, target_id, Role::Owner)
            .await?;
        self.db
            .participants()
            .update_role(room_id, &actor.user_id, Role::Admin)
            .await?;
        self.db.rooms().update_created_by(room_id, target_id).await?;
        info!(room_id = %room_id, target = %target_id, "Ownership transferred");

        let actor_name = display_name(&self.directory, &actor.user_id).await;
        let target_name = display_name(&self.directory, target_id).await;
        post_system(
            &self.db,
            room_id,
            &actor.user_id,
            format!("{actor_name} transferred ownership to {target_name}."),
        )
        .await;
        Ok(())
    }

    /// The pinned notice, resolved to its message, or `None` when unset.
    pub async fn notice(&self, room_id: &str) -> ChatResult<Option<NoticeView>> {
        self.require_membership(room_id).await?;
        let room = self
            .db
            .rooms()
            .find(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;
        let Some(message_id) = room.notice_message_id else {
            return Ok(None);
        };

        let Some(message) = self.db.messages().find(&message_id).await? else {
            // Dangling pointer after a message delete; treat as unset.
            return Ok(None);
        };

        let sender_name = display_name(&self.directory, &message.sender_id).await;
        Ok(Some(NoticeView {
            message_id: message.id,
            content: message.content.unwrap_or_default(),
            sender_id: message.sender_id,
            sender_name,
            created_at: message.created_at,
        }))
    }

    /// Pin a message as the room notice.
    pub async fn set_notice(&self, room_id: &str, message_id: &str) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        if !actor.role.permits(RoomAction::SetNotice) {
            return Err(ChatError::Permission(
                "only the owner and admins can pin a notice".to_string(),
            ));
        }
        self.db
            .messages()
            .find(message_id)
            .await?
            .filter(|m| m.room_id == room_id)
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;

        self.db.rooms().set_notice(room_id, Some(message_id)).await?;
        Ok(())
    }

    /// Clear the room notice.
    pub async fn clear_notice(&self, room_id: &str) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        if !actor.role.permits(RoomAction::SetNotice) {
            return Err(ChatError::Permission(
                "only the owner and admins can clear the notice".to_string(),
            ));
        }
        self.db.rooms().set_notice(room_id, None).await?;
        Ok(())
    }

    /// One page of the media gallery, newest first. `before` is the
    /// `created_at` of the last item of the previous page.
    pub async fn media(
        &self,
        room_id: &str,
        filter: MediaFilter,
        before: Option<i64>,
        limit: Option<u32>,
    ) -> ChatResult<Vec<MediaItem>> {
        self.require_membership(room_id).await?;

        let limit = limit.unwrap_or(MEDIA_PAGE_SIZE);
        let records = self.db.messages().media_page(room_id, before, limit).await?;

        let sender_ids: Vec<String> = records
            .iter()
            .map(|r| r.sender_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let details = self.directory.batch_details(&sender_ids).await;

        let mut items = Vec::new();
        for record in records {
            let sender_name = details
                .get(&record.sender_id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            for attachment in &record.attachments {
                if filter.matches(attachment.kind) {
                    items.push(MediaItem {
                        message_id: record.id.clone(),
                        kind: attachment.kind,
                        url: attachment.url.clone(),
                        name: attachment.name.clone(),
                        size: attachment.size,
                        created_at: record.created_at,
                        sender_id: record.sender_id.clone(),
                        sender_name: sender_name.clone(),
                    });
                }
            }
        }
        Ok(items)
    }

    /// Delete one attachment from the gallery. Senders delete their own;
    /// the owner and admins delete anyone's. A message left with no
    /// attachments and no text is removed entirely.
    pub async fn delete_media(
        &self,
        room_id: &str,
        message_id: &str,
        url: &str,
    ) -> ChatResult<()> {
        let actor = self.require_membership(room_id).await?;
        let message = self
            .db
            .messages()
            .find(message_id)
            .await?
            .filter(|m| m.room_id == room_id)
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;

        let own = message.sender_id == self.session.user_id;
        if !own && !actor.role.permits(RoomAction::ManageMedia) {
            return Err(ChatError::Permission(
                "not allowed to delete this attachment".to_string(),
            ));
        }

        let remaining: Vec<_> = message
            .attachments
            .iter()
            .filter(|a| a.url != url)
            .cloned()
            .collect();
        if remaining.len() == message.attachments.len() {
            return Err(ChatError::NotFound(format!("attachment {url}")));
        }

        if remaining.is_empty() && message.content.as_deref().unwrap_or("").is_empty() {
            self.db.messages().delete(room_id, message_id).await?;
            self.session.cache(room_id).remove(message_id);
        } else {
            self.db
                .messages()
                .update_attachments(message_id, &remaining)
                .await?;
        }
        Ok(())
    }

    /// The room linked to a project, if the session user belongs to it.
    pub async fn room_by_project(&self, project_id: &str) -> ChatResult<Option<Room>> {
        let room = self.db.rooms().find_by_project(project_id).await?;
        self.visible_to_me(room).await
    }

    /// The room linked to a collaboration, if the session user belongs
    /// to it.
    pub async fn room_by_collaboration(
        &self,
        collaboration_id: &str,
    ) -> ChatResult<Option<Room>> {
        let room = self.db.rooms().find_by_collaboration(collaboration_id).await?;
        self.visible_to_me(room).await
    }

    async fn visible_to_me(&self, room: Option<Room>) -> ChatResult<Option<Room>> {
        let Some(room) = room else { return Ok(None) };
        let membership = self
            .db
            .participants()
            .get(&room.id, &self.session.user_id)
            .await?;
        Ok(membership.map(|_| room))
    }
}

/// Room-list preview line for a message.
fn preview(message: &crate::types::MessageRecord) -> String {
    if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
        return content.to_string();
    }
    match message.attachments.first().map(|a| a.kind) {
        Some(crate::types::AttachmentKind::Image) => "Sent a photo".to_string(),
        Some(crate::types::AttachmentKind::File) => "Sent a file".to_string(),
        None => String::new(),
    }
}
