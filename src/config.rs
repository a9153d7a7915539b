//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level chat core configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Message delivery tuning.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Invitation lifecycle tuning.
    #[serde(default)]
    pub invitations: InvitationConfig,
}

impl ChatConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or ":memory:".
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "atelier-chat.db".to_string()
}

/// Delivery engine tuning.
///
/// The timeout is a UI-affordance threshold, not a network deadline: a
/// provisional message older than this is offered retry/cancel, while the
/// underlying write keeps running.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeliveryConfig {
    /// Milliseconds before an unreconciled provisional message is
    /// considered delayed.
    #[serde(default = "default_delivery_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay monitor scan interval in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_delivery_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}

fn default_monitor_interval_ms() -> u64 {
    1_000
}

/// Invitation lifecycle tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InvitationConfig {
    /// Days until a pending invitation expires.
    #[serde(default = "default_invite_expiry_days")]
    pub expiry_days: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_invite_expiry_days(),
        }
    }
}

fn default_invite_expiry_days() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.delivery.timeout_ms, 10_000);
        assert_eq!(config.delivery.monitor_interval_ms, 1_000);
        assert_eq!(config.invitations.expiry_days, 7);
    }

    #[test]
    fn parse_partial_toml() {
        let config: ChatConfig = toml::from_str(
            r#"
            [database]
            path = ":memory:"

            [delivery]
            timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.delivery.timeout_ms, 500);
        // Unset fields fall back to defaults
        assert_eq!(config.delivery.monitor_interval_ms, 1_000);
        assert_eq!(config.invitations.expiry_days, 7);
    }
}
