//! Shared harness for integration tests: an in-memory store, canned
//! directory/block services, and polling helpers for the async
//! reconciliation paths.

#![allow(dead_code)]

use async_trait::async_trait;
use atelier_chat::{
    BlockService, ChatConfig, ChatCore, Database, UserDetails, UserDirectory,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route crate logs through `RUST_LOG` when a test needs them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Directory with a fixed name table.
pub struct StaticDirectory {
    users: HashMap<String, UserDetails>,
}

impl StaticDirectory {
    pub fn with(entries: &[(&str, &str)]) -> Arc<Self> {
        let users = entries
            .iter()
            .map(|(id, name)| {
                (
                    id.to_string(),
                    UserDetails {
                        name: name.to_string(),
                        avatar: None,
                    },
                )
            })
            .collect();
        Arc::new(Self { users })
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn batch_details(&self, user_ids: &[String]) -> HashMap<String, UserDetails> {
        user_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|d| (id.clone(), d.clone())))
            .collect()
    }
}

/// Block service with a fixed set of blocked pairs.
pub struct StaticBlocks {
    pairs: HashSet<(String, String)>,
}

impl StaticBlocks {
    pub fn none() -> Arc<Self> {
        Arc::new(Self {
            pairs: HashSet::new(),
        })
    }

    pub fn between(pairs: &[(&str, &str)]) -> Arc<Self> {
        let pairs = pairs
            .iter()
            .flat_map(|(a, b)| {
                [
                    (a.to_string(), b.to_string()),
                    (b.to_string(), a.to_string()),
                ]
            })
            .collect();
        Arc::new(Self { pairs })
    }
}

#[async_trait]
impl BlockService for StaticBlocks {
    async fn is_blocked_bidirectional(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&(a.to_string(), b.to_string()))
    }

    async fn blocked_ids(&self, user_id: &str) -> HashSet<String> {
        self.pairs
            .iter()
            .filter(|(a, _)| a == user_id)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

/// Config pointed at a fresh in-memory store, with the delivery timeout
/// shortened so delayed-state tests finish quickly.
pub fn test_config() -> ChatConfig {
    let mut config = ChatConfig::default();
    config.database.path = ":memory:".to_string();
    config.delivery.timeout_ms = 200;
    config.delivery.monitor_interval_ms = 20;
    config
}

pub async fn open_db() -> Database {
    init_tracing();
    Database::new(":memory:").await.expect("open in-memory db")
}

/// A session for `user_id` on a shared store, resolving the given names.
pub fn session_on(db: &Database, user_id: &str, names: &[(&str, &str)]) -> ChatCore {
    ChatCore::attach(
        db.clone(),
        &test_config(),
        user_id,
        StaticDirectory::with(names),
        StaticBlocks::none(),
    )
}

/// Poll until `check` returns `Some`, or panic after ~5 seconds.
pub async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(value) = check() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met within timeout");
}

/// Async variant of [`eventually`] for store-backed conditions.
pub async fn eventually_async<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..200 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met within timeout");
}
