//! Unified error handling for atelier-chat.
//!
//! One taxonomy for the public API surface; store-level failures live in
//! `store::DbError` (kept there for sqlx proximity) and convert via `#[from]`.

use crate::store::DbError;
use thiserror::Error;

/// Errors surfaced by the messaging core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Input rejected before any write (e.g. empty message).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor's role or a block relationship forbids the action.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The target is not in a state that allows the transition
    /// (e.g. invitation already resolved).
    #[error("invalid state: {0}")]
    State(String),

    /// The invitation is past its expiry timestamp.
    #[error("invitation expired")]
    Expired,

    /// The actor is not the identity the operation is scoped to.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// An owner is leaving with no remaining moderator and no nominee.
    #[error("ownership handover required: nominate a new owner before leaving")]
    HandoverRequired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl ChatError {
    /// Static code string for log labeling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::State(_) => "state",
            Self::Expired => "expired",
            Self::Authorization(_) => "authorization",
            Self::HandoverRequired => "handover_required",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "db",
        }
    }
}

/// Result type for core operations.
pub type ChatResult<T> = Result<T, ChatError>;
