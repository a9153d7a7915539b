//! Core data model: rooms, participants, messages, invitations.
//!
//! Record types mirror the store schema; view types are the enriched
//! client-facing shapes (sender names resolved, delivery state attached).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Room category. Partner rooms are two-party; the rest are group rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Project,
    Team,
    Partner,
    Collaboration,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Team => "team",
            Self::Partner => "partner",
            Self::Collaboration => "collaboration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "team" => Some(Self::Team),
            "partner" => Some(Self::Partner),
            "collaboration" => Some(Self::Collaboration),
            _ => None,
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant role within a room.
///
/// Every non-empty room has exactly one owner; admins hold moderation
/// rights short of irrevocable owner actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Sort rank: owner first, then admins, then members.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Owner => 0,
            Self::Admin => 1,
            Self::Member => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message kind. System messages record moderation/membership activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Attachment descriptor. Upload happens outside the core; the URL is
/// treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// A room row as stored.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub kind: RoomKind,
    pub title: String,
    pub created_by: String,
    pub project_id: Option<String>,
    pub collaboration_id: Option<String>,
    pub notice_message_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
}

/// A participant row as stored.
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    pub room_id: String,
    pub user_id: String,
    pub role: Role,
    pub joined_at: i64,
    pub pinned: bool,
    pub pinned_at: Option<i64>,
    pub notifications_enabled: bool,
    pub last_read_at: i64,
}

/// A durable message row as stored.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub kind: MessageKind,
    pub created_at: i64,
}

/// Invitation lifecycle state. Transitions are one-way: a resolved
/// invitation is never resurrected, a fresh invite creates a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Withdrawn,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

/// An invitation row as stored.
#[derive(Debug, Clone)]
pub struct InvitationRecord {
    pub id: String,
    pub room_id: String,
    pub inviter_id: String,
    pub invitee_id: String,
    pub status: InvitationStatus,
    pub message: Option<String>,
    pub sent_at: i64,
    pub responded_at: Option<i64>,
    pub expires_at: i64,
}

// ============================================================================
// Client-side view types
// ============================================================================

/// Delivery state of a cached message entry.
///
/// Provisional entries carry a synthetic `temp-` id and flip to `Delayed`
/// once the delay monitor sees them unreconciled past the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Durable,
    Provisional,
    Delayed,
}

/// A message as rendered in a room: either a durable row or a provisional
/// local entry awaiting reconciliation.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    /// Resolved display name; `None` for the session user's own messages.
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub kind: MessageKind,
    pub created_at: i64,
    pub is_me: bool,
    pub state: DeliveryState,
}

impl MessageView {
    /// Whether this entry is still a client-local provisional message.
    pub fn is_provisional(&self) -> bool {
        self.state != DeliveryState::Durable
    }
}

/// A room as shown in the room list.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub id: String,
    pub kind: RoomKind,
    pub title: String,
    pub created_by: String,
    pub last_message: String,
    pub last_message_at: Option<i64>,
    pub unread: u32,
    pub participant_ids: Vec<String>,
    pub participant_names: Vec<String>,
    pub image_url: Option<String>,
    pub pinned: bool,
    pub pinned_at: Option<i64>,
    pub notifications_enabled: bool,
    pub my_role: Role,
    pub notice_message_id: Option<String>,
    pub project_id: Option<String>,
    pub collaboration_id: Option<String>,
}

/// A participant with directory details resolved.
#[derive(Debug, Clone)]
pub struct ParticipantView {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub joined_at: i64,
}

/// An invitation with room title and directory details resolved.
#[derive(Debug, Clone)]
pub struct InvitationView {
    pub id: String,
    pub room_id: String,
    pub room_title: String,
    pub inviter_id: String,
    pub inviter_name: String,
    pub inviter_avatar: Option<String>,
    pub invitee_id: String,
    pub invitee_name: String,
    pub invitee_avatar: Option<String>,
    pub status: InvitationStatus,
    pub message: Option<String>,
    pub sent_at: i64,
    pub responded_at: Option<i64>,
    pub expires_at: i64,
}

/// Outcome of a batch invite; partial success is reported, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InviteOutcome {
    pub sent: usize,
    pub already_in_room: usize,
    pub already_invited: usize,
}

/// The room's pinned notice, resolved to its message.
#[derive(Debug, Clone)]
pub struct NoticeView {
    pub message_id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub created_at: i64,
}

/// One attachment surfaced in the room media gallery.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub message_id: String,
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    pub size: Option<u64>,
    pub created_at: i64,
    pub sender_id: String,
    pub sender_name: String,
}

/// Media gallery filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFilter {
    All,
    Image,
    File,
}

impl MediaFilter {
    pub fn matches(&self, kind: AttachmentKind) -> bool {
        match self {
            Self::All => true,
            Self::Image => kind == AttachmentKind::Image,
            Self::File => kind == AttachmentKind::File,
        }
    }
}

/// Room list filter tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomFilter {
    #[default]
    All,
    /// Project and collaboration rooms combined (one tab in the app).
    ProjectCollaboration,
    Kind(RoomKind),
}

impl RoomFilter {
    pub fn matches(&self, kind: RoomKind) -> bool {
        match self {
            Self::All => true,
            Self::ProjectCollaboration => {
                matches!(kind, RoomKind::Project | RoomKind::Collaboration)
            }
            Self::Kind(k) => kind == *k,
        }
    }
}
