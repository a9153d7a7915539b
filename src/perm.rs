//! Role/permission matrix.
//!
//! All role checks funnel through this module so the contract lives in one
//! place instead of ad hoc comparisons at call sites.

use crate::types::Role;

/// Moderation and management actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    /// Invite new participants.
    Invite,
    /// Grant or revoke the admin role.
    ManageRoles,
    /// Remove a participant (owner targets are always rejected, see
    /// [`Role::can_kick`]).
    Kick,
    /// Pin or clear the room notice.
    SetNotice,
    /// Rename the room.
    RenameRoom,
    /// Change or clear the room image, delete gallery media.
    ManageMedia,
}

impl Role {
    /// Permission matrix lookup.
    pub fn permits(self, action: RoomAction) -> bool {
        match action {
            RoomAction::Invite => matches!(self, Role::Owner | Role::Admin),
            RoomAction::ManageRoles => self == Role::Owner,
            RoomAction::Kick => matches!(self, Role::Owner | Role::Admin),
            RoomAction::SetNotice => matches!(self, Role::Owner | Role::Admin),
            RoomAction::RenameRoom => self == Role::Owner,
            RoomAction::ManageMedia => matches!(self, Role::Owner | Role::Admin),
        }
    }

    /// Whether this role may kick a participant holding `target`.
    /// Owners are never kickable.
    pub fn can_kick(self, target: Role) -> bool {
        target != Role::Owner && self.permits(RoomAction::Kick)
    }

    /// Whether this role may delete a message.
    ///
    /// Everyone deletes their own; owners delete anything; admins delete
    /// non-owner messages only.
    pub fn can_delete_message(self, own_message: bool, sender_role: Role) -> bool {
        if own_message {
            return true;
        }
        match self {
            Role::Owner => true,
            Role::Admin => sender_role != Role::Owner,
            Role::Member => false,
        }
    }
}
