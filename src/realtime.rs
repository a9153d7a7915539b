//! Realtime reconciliation.
//!
//! Per-room pumps consume the change feed and fold durable rows into the
//! room caches: own messages replace their provisional entries, foreign
//! messages append with directory details resolved, and cancelled
//! messages that still landed are deleted. A singular room-list pump
//! watches every event to keep the list and unread counters fresh.

use crate::directory::UserDirectory;
use crate::session::SessionState;
use crate::store::{ChangeEvent, Database};
use crate::types::{DeliveryState, MessageRecord, MessageView};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub struct RealtimeSync {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    session: Arc<SessionState>,
    /// Live per-room pumps; the key set doubles as the idempotency guard.
    registry: DashMap<String, JoinHandle<()>>,
    room_list_task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeSync {
    pub fn new(
        db: Database,
        directory: Arc<dyn UserDirectory>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            db,
            directory,
            session,
            registry: DashMap::new(),
            room_list_task: Mutex::new(None),
        }
    }

    /// Start the pump for a room. Subscribing twice is a no-op.
    pub fn subscribe(self: &Arc<Self>, room_id: &str) {
        if self.registry.contains_key(room_id) {
            trace!(room_id = %room_id, "Already subscribed");
            return;
        }

        let mut rx = self.db.feed().subscribe();
        let sync = self.clone();
        let room = room_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ChangeEvent::MessageInserted(record)) if record.room_id == room => {
                        sync.handle_insert(record).await;
                    }
                    Ok(ChangeEvent::MessageDeleted {
                        room_id,
                        message_id,
                    }) if room_id == room => {
                        sync.session.cache(&room_id).remove(&message_id);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(room_id = %room, skipped, "Change feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.registry.insert(room_id.to_string(), handle);
        debug!(room_id = %room_id, "Subscribed to room");
    }

    /// Stop the pump for a room.
    pub fn unsubscribe(&self, room_id: &str) {
        if let Some((_, handle)) = self.registry.remove(room_id) {
            handle.abort();
            debug!(room_id = %room_id, "Unsubscribed from room");
        }
    }

    pub fn is_subscribed(&self, room_id: &str) -> bool {
        self.registry.contains_key(room_id)
    }

    /// Start the singular pump that keeps the room list and unread
    /// counters current. Restarting replaces the previous pump.
    pub fn subscribe_room_list(self: &Arc<Self>) {
        let mut rx = self.db.feed().subscribe();
        let session = self.session.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ChangeEvent::MessageInserted(record)) => {
                        session.mark_room_list_stale();
                        if record.sender_id != session.user_id
                            && !session.is_current_room(&record.room_id)
                        {
                            session.unread.increment(&record.room_id);
                        }
                    }
                    Ok(
                        ChangeEvent::MessageDeleted { .. }
                        | ChangeEvent::ParticipantUpdated { .. }
                        | ChangeEvent::RoomUpdated { .. }
                        | ChangeEvent::InvitationChanged { .. },
                    ) => {
                        session.mark_room_list_stale();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Room list feed lagged");
                        session.mark_room_list_stale();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(old) = self.room_list_task.lock().replace(handle) {
            old.abort();
        }
    }

    /// Fold one durable row into the room cache.
    async fn handle_insert(&self, record: MessageRecord) {
        let cache = self.session.cache(&record.room_id);

        // The feed is at-least-once; a row already rendered is skipped.
        if cache.contains(&record.id) {
            return;
        }

        let me = &self.session.user_id;
        if record.sender_id == *me {
            // A cancelled message that still reached the store is removed
            // rather than rendered.
            if let Some(content) = &record.content
                && self.session.take_cancelled(content)
            {
                debug!(message_id = %record.id, "Deleting durable row for cancelled message");
                if let Err(e) = self
                    .db
                    .messages()
                    .delete(&record.room_id, &record.id)
                    .await
                {
                    warn!(message_id = %record.id, error = %e, "Cancelled message cleanup failed");
                }
                return;
            }

            let view = MessageView {
                id: record.id,
                sender_id: record.sender_id,
                sender_name: None,
                sender_avatar: None,
                content: record.content,
                attachments: record.attachments,
                kind: record.kind,
                created_at: record.created_at,
                is_me: true,
                state: DeliveryState::Durable,
            };

            // Reconcile against the most recent provisional entry of ours;
            // with none left (e.g. another device sent it), append.
            let reconciled = cache.with_entries(|entries| {
                if let Some(pos) = entries
                    .iter()
                    .rposition(|m| m.is_me && m.id.starts_with("temp-"))
                {
                    entries[pos] = view.clone();
                    true
                } else {
                    entries.push(view.clone());
                    false
                }
            });
            trace!(message_id = %view.id, reconciled, "Own message landed");
        } else {
            let details = self.directory.details(&record.sender_id).await;
            let view = MessageView {
                id: record.id,
                sender_id: record.sender_id,
                sender_name: Some(
                    details
                        .as_ref()
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                ),
                sender_avatar: details.and_then(|d| d.avatar),
                content: record.content,
                attachments: record.attachments,
                kind: record.kind,
                created_at: record.created_at,
                is_me: false,
                state: DeliveryState::Durable,
            };
            cache.push(view);
        }
    }

    /// Abort every pump. Called on session shutdown.
    pub fn shutdown(&self) {
        for entry in self.registry.iter() {
            entry.value().abort();
        }
        self.registry.clear();
        if let Some(handle) = self.room_list_task.lock().take() {
            handle.abort();
        }
    }
}
