//! Per-user session state.
//!
//! Holds the in-memory message caches that back open room views, the
//! soft-cancel record, the currently open room, and unread counters.
//! Everything here is client-local; the store remains authoritative.

use crate::types::MessageView;
use crate::unread::UnreadTracker;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cached message timeline for one room.
#[derive(Default)]
pub struct RoomCache {
    entries: Mutex<Vec<MessageView>>,
}

impl RoomCache {
    /// Snapshot of the timeline in display order.
    pub fn snapshot(&self) -> Vec<MessageView> {
        self.entries.lock().clone()
    }

    /// Replace the whole timeline (room open / reseed).
    pub fn replace(&self, views: Vec<MessageView>) {
        *self.entries.lock() = views;
    }

    /// Append an entry to the tail.
    pub fn push(&self, view: MessageView) {
        self.entries.lock().push(view);
    }

    /// Remove an entry by id, returning it if present.
    pub fn remove(&self, id: &str) -> Option<MessageView> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|m| m.id == id)?;
        Some(entries.remove(pos))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().iter().any(|m| m.id == id)
    }

    /// Run `f` against the timeline under the lock.
    pub fn with_entries<R>(&self, f: impl FnOnce(&mut Vec<MessageView>) -> R) -> R {
        f(&mut self.entries.lock())
    }
}

/// Session-wide client state for one signed-in user.
pub struct SessionState {
    pub user_id: String,
    caches: DashMap<String, Arc<RoomCache>>,
    /// Content of messages the user cancelled while provisional. When the
    /// durable row later arrives, it is deleted instead of rendered.
    cancelled: Mutex<HashSet<String>>,
    current_room: Mutex<Option<String>>,
    pub unread: UnreadTracker,
    room_list_stale: AtomicBool,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            caches: DashMap::new(),
            cancelled: Mutex::new(HashSet::new()),
            current_room: Mutex::new(None),
            unread: UnreadTracker::new(),
            room_list_stale: AtomicBool::new(false),
        }
    }

    /// The cache for a room, created empty on first touch.
    pub fn cache(&self, room_id: &str) -> Arc<RoomCache> {
        self.caches
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    pub fn drop_cache(&self, room_id: &str) {
        self.caches.remove(room_id);
    }

    /// Visit every live room cache (delay monitor sweep).
    pub fn each_cache(&self, mut f: impl FnMut(&str, &RoomCache)) {
        for entry in self.caches.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Record a soft-cancelled message body.
    pub fn record_cancelled(&self, content: &str) {
        self.cancelled.lock().insert(content.to_string());
    }

    /// Consume a cancellation record if one matches this content.
    pub fn take_cancelled(&self, content: &str) -> bool {
        self.cancelled.lock().remove(content)
    }

    pub fn set_current_room(&self, room_id: Option<&str>) {
        *self.current_room.lock() = room_id.map(str::to_string);
    }

    pub fn current_room(&self) -> Option<String> {
        self.current_room.lock().clone()
    }

    pub fn is_current_room(&self, room_id: &str) -> bool {
        self.current_room
            .lock()
            .as_deref()
            .is_some_and(|current| current == room_id)
    }

    /// Mark the room list as needing a rebuild.
    pub fn mark_room_list_stale(&self) {
        self.room_list_stale.store(true, Ordering::Relaxed);
    }

    /// Check and clear the stale flag.
    pub fn take_room_list_stale(&self) -> bool {
        self.room_list_stale.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryState, MessageKind};

    fn view(id: &str) -> MessageView {
        MessageView {
            id: id.to_string(),
            sender_id: "u1".into(),
            sender_name: None,
            sender_avatar: None,
            content: Some("hi".into()),
            attachments: Vec::new(),
            kind: MessageKind::Text,
            created_at: 0,
            is_me: true,
            state: DeliveryState::Provisional,
        }
    }

    #[test]
    fn cache_push_remove() {
        let session = SessionState::new("u1");
        let cache = session.cache("r1");
        cache.push(view("temp-1"));
        cache.push(view("temp-2"));
        assert!(cache.contains("temp-1"));

        let removed = cache.remove("temp-1").unwrap();
        assert_eq!(removed.id, "temp-1");
        assert!(!cache.contains("temp-1"));
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[test]
    fn cancelled_records_are_consumed_once() {
        let session = SessionState::new("u1");
        session.record_cancelled("take that back");
        assert!(session.take_cancelled("take that back"));
        assert!(!session.take_cancelled("take that back"));
        assert!(!session.take_cancelled("never sent"));
    }

    #[test]
    fn current_room_tracking() {
        let session = SessionState::new("u1");
        assert!(session.current_room().is_none());
        session.set_current_room(Some("r1"));
        assert!(session.is_current_room("r1"));
        assert!(!session.is_current_room("r2"));
        session.set_current_room(None);
        assert!(session.current_room().is_none());
    }

    #[test]
    fn stale_flag_is_one_shot() {
        let session = SessionState::new("u1");
        assert!(!session.take_room_list_stale());
        session.mark_room_list_stale();
        assert!(session.take_room_list_stale());
        assert!(!session.take_room_list_stale());
    }
}
