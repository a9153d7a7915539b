//! External collaborator seams: user directory and block service.
//!
//! The core never resolves identities or block relationships itself; callers
//! plug in implementations backed by their profile and safety services.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Display details for a user, resolved by the hosting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    pub name: String,
    pub avatar: Option<String>,
}

/// Batch lookup of display name and avatar.
///
/// The priority order among a user's profile kinds is the implementor's
/// concern; the core only consumes the resolved result.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve details for a set of user ids. Unknown ids may be absent
    /// from the returned map.
    async fn batch_details(&self, user_ids: &[String]) -> HashMap<String, UserDetails>;

    /// Resolve a single user, defined in terms of the batch lookup.
    async fn details(&self, user_id: &str) -> Option<UserDetails> {
        let mut map = self.batch_details(&[user_id.to_string()]).await;
        map.remove(user_id)
    }
}

/// Resolve a display name with the source app's fallback.
pub(crate) async fn display_name(directory: &Arc<dyn UserDirectory>, user_id: &str) -> String {
    directory
        .details(user_id)
        .await
        .map(|d| d.name)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Bidirectional block relationship checks.
#[async_trait]
pub trait BlockService: Send + Sync {
    /// True when either user blocks the other.
    async fn is_blocked_bidirectional(&self, a: &str, b: &str) -> bool;

    /// All user ids with a block relationship to `user_id`, in either
    /// direction. Used to filter partner rooms from listings.
    async fn blocked_ids(&self, user_id: &str) -> HashSet<String>;
}

/// Directory stub returning nothing; useful when the host resolves names
/// elsewhere.
pub struct NullDirectory;

#[async_trait]
impl UserDirectory for NullDirectory {
    async fn batch_details(&self, _user_ids: &[String]) -> HashMap<String, UserDetails> {
        HashMap::new()
    }
}

/// Block service stub with no block relationships.
pub struct NoBlocks;

#[async_trait]
impl BlockService for NoBlocks {
    async fn is_blocked_bidirectional(&self, _a: &str, _b: &str) -> bool {
        false
    }

    async fn blocked_ids(&self, _user_id: &str) -> HashSet<String> {
        HashSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_lookup_defers_to_batch() {
        let dir: Arc<dyn UserDirectory> = Arc::new(NullDirectory);
        assert!(dir.details("u1").await.is_none());
        assert_eq!(display_name(&dir, "u1").await, "Unknown");
    }
}
