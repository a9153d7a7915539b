//! Change-notification feed.
//!
//! Repositories publish an event after every successful write; the realtime
//! layer consumes them. Delivery is at-least-once with no ordering guarantee
//! beyond arrival order, matching what the store substrate provides.

use crate::types::MessageRecord;
use tokio::sync::broadcast;
use tracing::trace;

/// A change observed on one of the store tables.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    MessageInserted(MessageRecord),
    MessageDeleted {
        room_id: String,
        message_id: String,
    },
    /// Participant row inserted, updated, or removed.
    ParticipantUpdated {
        room_id: String,
        user_id: String,
    },
    RoomUpdated {
        room_id: String,
    },
    InvitationChanged {
        room_id: String,
        invitee_id: String,
    },
}

/// Broadcast fan-out of [`ChangeEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Feed buffer size; slow consumers past this lag and resubscribe.
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Attach a new receiver. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A feed with no subscribers drops events silently.
    pub fn publish(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() {
            trace!("change feed has no subscribers");
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
