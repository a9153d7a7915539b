//! Optimistic message delivery.
//!
//! Sending appends a provisional entry to the room cache and returns
//! immediately; the durable insert happens in the background and is
//! reconciled by the realtime layer when the change feed echoes it back.
//! A monitor task flips entries that stay provisional past the timeout
//! to `Delayed`, at which point the user can retry or cancel.

use crate::config::DeliveryConfig;
use crate::directory::BlockService;
use crate::error::{ChatError, ChatResult};
use crate::session::SessionState;
use crate::store::{Database, NewMessage, now_millis};
use crate::types::{Attachment, DeliveryState, MessageKind, MessageView, RoomKind};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, warn};

/// Result of a send: the provisional id to watch for reconciliation, and
/// any participants mentioned in the body.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub provisional_id: String,
    pub mentions: Vec<String>,
}

/// Synthesize a provisional id carrying the send instant.
fn provisional_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    format!("temp-{}-{}", now_millis(), suffix)
}

/// Recover the send instant embedded in a provisional id.
fn provisional_sent_at(id: &str) -> Option<i64> {
    id.strip_prefix("temp-")?
        .split('-')
        .next()?
        .parse()
        .ok()
}

pub struct DeliveryEngine {
    db: Database,
    blocks: Arc<dyn BlockService>,
    session: Arc<SessionState>,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(
        db: Database,
        blocks: Arc<dyn BlockService>,
        session: Arc<SessionState>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            db,
            blocks,
            session,
            config,
        }
    }

    /// Send a message optimistically.
    ///
    /// The provisional entry lands in the cache before this returns; the
    /// durable insert runs in the background. A failed insert leaves the
    /// provisional entry in place for the delay monitor to flag.
    /// `mentioned` is the caller-supplied list of users to notify;
    /// notification fan-out itself lives outside the core, so the list
    /// is only cleaned of self-mentions and handed back in the receipt.
    pub async fn send(
        &self,
        room_id: &str,
        content: Option<&str>,
        attachments: Vec<Attachment>,
        kind: MessageKind,
        mentioned: &[String],
    ) -> ChatResult<SendReceipt> {
        let body = content.map(str::trim).filter(|s| !s.is_empty());
        if body.is_none() && attachments.is_empty() {
            return Err(ChatError::Validation(
                "message needs content or attachments".to_string(),
            ));
        }

        let room = self
            .db
            .rooms()
            .find(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;

        let me = self.session.user_id.clone();
        let participants = self.db.participants().list(room_id).await?;
        if !participants.iter().any(|p| p.user_id == me) {
            return Err(ChatError::Permission(
                "only participants can post to a room".to_string(),
            ));
        }

        // Partner rooms stop flowing when either side has blocked the
        // other. System messages still land (moderation trail).
        if room.kind == RoomKind::Partner && kind != MessageKind::System {
            if let Some(other) = participants.iter().find(|p| p.user_id != me)
                && self
                    .blocks
                    .is_blocked_bidirectional(&me, &other.user_id)
                    .await
            {
                return Err(ChatError::Permission(
                    "messaging is blocked between these users".to_string(),
                ));
            }
        }

        let temp_id = provisional_id();
        let view = MessageView {
            id: temp_id.clone(),
            sender_id: me.clone(),
            sender_name: None,
            sender_avatar: None,
            content: body.map(str::to_string),
            attachments: attachments.clone(),
            kind,
            created_at: now_millis(),
            is_me: true,
            state: DeliveryState::Provisional,
        };
        self.session.cache(room_id).push(view);

        let mentions: Vec<String> = mentioned
            .iter()
            .filter(|id| **id != me)
            .cloned()
            .collect();

        let db = self.db.clone();
        let message = NewMessage {
            room_id: room_id.to_string(),
            sender_id: me,
            content: body.map(str::to_string),
            attachments,
            kind,
        };
        let watched_id = temp_id.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            if let Err(e) = db.messages().insert(message).await {
                // The provisional entry stays; the monitor will flag it.
                warn!(provisional_id = %watched_id, error = %e, "Durable insert failed");
                session.mark_room_list_stale();
            }
        });

        Ok(SendReceipt {
            provisional_id: temp_id,
            mentions,
        })
    }

    /// Resend a delayed message: the stuck entry is dropped and its body
    /// goes back through the normal send path under a fresh id.
    pub async fn retry(&self, room_id: &str, temp_id: &str) -> ChatResult<SendReceipt> {
        let entry = self
            .session
            .cache(room_id)
            .remove(temp_id)
            .ok_or_else(|| ChatError::NotFound(format!("provisional message {temp_id}")))?;

        self.send(room_id, entry.content.as_deref(), entry.attachments, entry.kind, &[])
            .await
    }

    /// Cancel a delayed message.
    ///
    /// The provisional entry is dropped now. The earlier background insert
    /// may still have landed; recording the body lets the realtime layer
    /// delete the durable row if it echoes back later.
    pub fn cancel(&self, room_id: &str, temp_id: &str) -> ChatResult<()> {
        let entry = self
            .session
            .cache(room_id)
            .remove(temp_id)
            .ok_or_else(|| ChatError::NotFound(format!("provisional message {temp_id}")))?;

        if let Some(content) = entry.content {
            self.session.record_cancelled(&content);
        }
        debug!(provisional_id = %temp_id, "Provisional message cancelled");
        Ok(())
    }

    /// Start the sweep that flips overdue provisional entries to `Delayed`.
    pub fn spawn_delay_monitor(&self) -> JoinHandle<()> {
        let session = self.session.clone();
        let timeout_ms = self.config.timeout_ms as i64;
        let tick = Duration::from_millis(self.config.monitor_interval_ms);

        tokio::spawn(async move {
            let mut ticker = interval(tick);
            loop {
                ticker.tick().await;
                let now = now_millis();
                session.each_cache(|room_id, cache| {
                    cache.with_entries(|entries| {
                        for entry in entries.iter_mut() {
                            if entry.state == DeliveryState::Provisional
                                && let Some(sent_at) = provisional_sent_at(&entry.id)
                                && now - sent_at > timeout_ms
                            {
                                entry.state = DeliveryState::Delayed;
                                debug!(room_id = %room_id, provisional_id = %entry.id, "Message delivery delayed");
                            }
                        }
                    });
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_id_embeds_send_instant() {
        let before = now_millis();
        let id = provisional_id();
        let after = now_millis();

        assert!(id.starts_with("temp-"));
        let sent_at = provisional_sent_at(&id).unwrap();
        assert!(sent_at >= before && sent_at <= after);
    }

    #[test]
    fn malformed_ids_have_no_send_instant() {
        assert_eq!(provisional_sent_at("not-a-temp-id"), None);
        assert_eq!(provisional_sent_at("temp-abc-xyz"), None);
        assert_eq!(provisional_sent_at("0c5b4f1a"), None);
    }
}
