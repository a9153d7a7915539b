//! Message history and moderation.

use crate::directory::UserDirectory;
use crate::error::{ChatError, ChatResult};
use crate::session::SessionState;
use crate::store::{Database, NewMessage};
use crate::types::{DeliveryState, MessageKind, MessageView, Role};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Record a system message. System messages are an activity trail, not
/// user content; a failure to write one is logged and swallowed so it
/// never aborts the operation it annotates.
pub(crate) async fn post_system(db: &Database, room_id: &str, sender_id: &str, content: String) {
    let result = db
        .messages()
        .insert(NewMessage {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: Some(content),
            attachments: Vec::new(),
            kind: MessageKind::System,
        })
        .await;

    if let Err(e) = result {
        warn!(room_id = %room_id, error = %e, "Failed to record system message");
    }
}

pub struct MessageService {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    session: Arc<SessionState>,
}

impl MessageService {
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

    /// Load the room timeline and reseed the cache with it. In-flight
    /// provisional entries survive the reseed at the tail.
    pub async fn get_messages(&self, room_id: &str) -> ChatResult<Vec<MessageView>> {
        let me = &self.session.user_id;
        if self.db.participants().get(room_id, me).await?.is_none() {
            return Err(ChatError::Permission(
                "only participants can read a room".to_string(),
            ));
        }

        let records = self.db.messages().list(room_id).await?;

        let foreign_senders: Vec<String> = records
            .iter()
            .filter(|r| r.sender_id != *me)
            .map(|r| r.sender_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let details = self.directory.batch_details(&foreign_senders).await;

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let is_me = record.sender_id == *me;
            let (sender_name, sender_avatar) = if is_me {
                (None, None)
            } else {
                match details.get(&record.sender_id) {
                    Some(d) => (Some(d.name.clone()), d.avatar.clone()),
                    None => (Some("Unknown".to_string()), None),
                }
            };
            views.push(MessageView {
                id: record.id,
                sender_id: record.sender_id,
                sender_name,
                sender_avatar,
                content: record.content,
                attachments: record.attachments,
                kind: record.kind,
                created_at: record.created_at,
                is_me,
                state: DeliveryState::Durable,
            });
        }

        let cache = self.session.cache(room_id);
        let snapshot = cache.with_entries(|entries| {
            let durable_ids: HashSet<&str> = views.iter().map(|v| v.id.as_str()).collect();
            let pending: Vec<MessageView> = entries
                .iter()
                .filter(|m| m.is_provisional() && !durable_ids.contains(m.id.as_str()))
                .cloned()
                .collect();
            *entries = views;
            entries.extend(pending);
            entries.clone()
        });

        Ok(snapshot)
    }

    /// Delete a durable message.
    ///
    /// Anyone may delete their own message. Beyond that, the owner may
    /// delete any message, admins any non-owner message, members none.
    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> ChatResult<()> {
        let me = &self.session.user_id;
        let actor = self
            .db
            .participants()
            .get(room_id, me)
            .await?
            .ok_or_else(|| {
                ChatError::Permission("only participants can delete messages".to_string())
            })?;

        let message = self
            .db
            .messages()
            .find(message_id)
            .await?
            .filter(|m| m.room_id == room_id)
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;

        let own = message.sender_id == *me;
        // A sender who already left the room counts as a plain member.
        let sender_role = self
            .db
            .participants()
            .get(room_id, &message.sender_id)
            .await?
            .map(|p| p.role)
            .unwrap_or(Role::Member);

        if !actor.role.can_delete_message(own, sender_role) {
            return Err(ChatError::Permission(
                "not allowed to delete this message".to_string(),
            ));
        }

        self.db.messages().delete(room_id, message_id).await?;
        self.session.cache(room_id).remove(message_id);
        Ok(())
    }
}
