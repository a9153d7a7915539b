//! atelier-chat: the messaging core for creator/brand collaboration.
//!
//! Client-side optimistic delivery over a durable SQLite store:
//! messages render provisionally the instant they are sent, a change
//! feed reconciles them against server-ordered rows, and a monitor task
//! flags anything stuck so the user can retry or cancel. On top of that
//! sit rooms with an owner/admin/member role matrix, an invitation
//! lifecycle with expiry and compensating rollback, ownership handover
//! on leave, and read/unread tracking.
//!
//! [`ChatCore`] is the entry point; identity resolution and block
//! relationships plug in through the [`directory`] traits.

pub mod config;
pub mod core;
pub mod delivery;
pub mod directory;
pub mod error;
pub mod invitations;
pub mod messages;
pub mod participants;
pub mod perm;
pub mod realtime;
pub mod rooms;
pub mod session;
pub mod store;
pub mod types;
pub mod unread;

pub use crate::core::ChatCore;
pub use config::ChatConfig;
pub use delivery::{DeliveryEngine, SendReceipt};
pub use directory::{BlockService, UserDetails, UserDirectory};
pub use error::{ChatError, ChatResult};
pub use invitations::InvitationService;
pub use messages::MessageService;
pub use participants::ParticipantService;
pub use perm::RoomAction;
pub use realtime::RealtimeSync;
pub use rooms::{CreateRoom, RoomService};
pub use session::SessionState;
pub use store::Database;
pub use types::{
    Attachment, AttachmentKind, DeliveryState, InvitationStatus, InvitationView, InviteOutcome,
    MediaFilter, MediaItem, MessageKind, MessageView, NoticeView, ParticipantView, Role, Room,
    RoomFilter, RoomKind, RoomSummary,
};
