//! Per-room unread counters.
//!
//! Counts are seeded from authoritative store queries when a room list is
//! built, incremented in-memory as realtime inserts arrive, and reset to
//! zero when the room is read. The store's read marker is the source of
//! truth; these counters exist so the UI updates without a requery.

use dashmap::DashMap;

#[derive(Default)]
pub struct UnreadTracker {
    counts: DashMap<String, u32>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the counter with an authoritative count.
    pub fn set(&self, room_id: &str, count: u32) {
        self.counts.insert(room_id.to_string(), count);
    }

    /// Bump the counter for an incoming message.
    pub fn increment(&self, room_id: &str) {
        *self.counts.entry(room_id.to_string()).or_insert(0) += 1;
    }

    /// Clear the counter after the room is read.
    pub fn reset(&self, room_id: &str) {
        self.counts.insert(room_id.to_string(), 0);
    }

    pub fn get(&self, room_id: &str) -> u32 {
        self.counts.get(room_id).map(|c| *c).unwrap_or(0)
    }

    /// Sum across all rooms (global badge).
    pub fn total(&self) -> u32 {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }
}
