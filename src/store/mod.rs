//! Room & message store: async SQLite persistence plus a change feed.
//!
//! Provides repositories for:
//! - Rooms and their settings (notice, image, linked project/collaboration)
//! - Participants with roles and per-user room settings
//! - Messages with attachment payloads
//! - Invitations and their lifecycle states
//!
//! Every successful write publishes a [`ChangeEvent`] on the database's
//! [`ChangeFeed`], which the realtime layer consumes.

mod feed;
mod invitations;
mod messages;
mod participants;
mod rooms;

pub use feed::{ChangeEvent, ChangeFeed};
pub use invitations::InvitationRepository;
pub use messages::{MessageRepository, NewMessage};
pub use participants::ParticipantRepository;
pub use rooms::{NewRoom, RoomRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

/// Database handle with connection pool and change feed.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:atelier-chat-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        // WAL mode allows reads to happen while writes are in progress
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Required for the ON DELETE CASCADE schema
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            feed: ChangeFeed::new(),
        })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the change-notification feed.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get room repository.
    pub fn rooms(&self) -> RoomRepository<'_> {
        RoomRepository::new(&self.pool, &self.feed)
    }

    /// Get participant repository.
    pub fn participants(&self) -> ParticipantRepository<'_> {
        ParticipantRepository::new(&self.pool, &self.feed)
    }

    /// Get message repository.
    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool, &self.feed)
    }

    /// Get invitation repository.
    pub fn invitations(&self) -> InvitationRepository<'_> {
        InvitationRepository::new(&self.pool, &self.feed)
    }
}

/// Current UTC time in epoch milliseconds; the store's authoritative clock.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
