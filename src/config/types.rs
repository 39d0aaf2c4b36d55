//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::*;
use crate::queue::{RotationError, Tag, TagRotation};
use crate::session::NamePool;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Metrics endpoint and background cadence.
    #[serde(default)]
    pub server: ServerConfig,
    /// Tag rotation and pairing policy.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Session roster settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Automated-participant backend.
    #[serde(default)]
    pub responder: ResponderConfig,
    /// Persistence backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Match-index retention.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Log output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Daemon-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Prometheus metrics HTTP port (0 disables the endpoint).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Seconds between matching passes driven by the daemon.
    #[serde(default = "default_match_interval_secs")]
    pub match_interval_secs: u64,
    /// Seconds between match-index eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            match_interval_secs: default_match_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Pairing policy.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Tags handed out in arrival order, cycling.
    #[serde(default = "default_tag_rotation")]
    pub tag_rotation: Vec<String>,
    /// Tag that always goes solo.
    #[serde(default = "default_solo_tag")]
    pub solo_tag: String,
    /// `[L, R]`. L takes slot 0 and R slot 1 of a paired session.
    #[serde(default = "default_pair_tags")]
    pub pair_tags: [String; 2],
    /// Seconds a participant waits before becoming solo-eligible.
    #[serde(default = "default_solo_wait_secs")]
    pub solo_wait_secs: u64,
    /// Run a matching pass inline after every admission.
    #[serde(default)]
    pub match_on_admit: bool,
    /// Attempts at persisting a new session, each under a fresh id.
    #[serde(default = "default_session_create_attempts")]
    pub session_create_attempts: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tag_rotation: default_tag_rotation(),
            solo_tag: default_solo_tag(),
            pair_tags: default_pair_tags(),
            solo_wait_secs: default_solo_wait_secs(),
            match_on_admit: false,
            session_create_attempts: default_session_create_attempts(),
        }
    }
}

impl MatchingConfig {
    /// Build the tag rotation described by this section.
    pub fn rotation(&self) -> Result<TagRotation, RotationError> {
        let [left, right] = &self.pair_tags;
        TagRotation::new(
            self.tag_rotation.iter().map(|t| Tag::new(t.as_str())).collect(),
            Tag::new(self.solo_tag.as_str()),
            Tag::new(left.as_str()),
            Tag::new(right.as_str()),
        )
    }

    pub fn solo_wait(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.solo_wait_secs).unwrap_or(i64::MAX))
    }
}

/// Session roster settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Display names handed out to slots.
    #[serde(default = "default_name_pool")]
    pub name_pool: Vec<String>,
    /// Shuffle names per session (disable for reproducible tests).
    #[serde(default = "default_true")]
    pub shuffle_names: bool,
    /// Largest session the pool must be able to name.
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_pool: default_name_pool(),
            shuffle_names: true,
            max_slots: default_max_slots(),
        }
    }
}

impl SessionConfig {
    pub fn names(&self) -> NamePool {
        NamePool::new(self.name_pool.clone(), self.shuffle_names)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponderBackend {
    /// Fixed list of short replies. Needs no network access.
    #[default]
    Canned,
    /// OpenAI-compatible chat-completions endpoint.
    OpenAi,
}

/// Automated-participant settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponderConfig {
    #[serde(default)]
    pub backend: ResponderBackend,
    /// Chat-completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the bearer key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on one completion call, in seconds.
    #[serde(default = "default_responder_timeout_secs")]
    pub timeout_secs: u64,
    /// Posted in place of a reply when the call fails or times out.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            backend: ResponderBackend::default(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_responder_timeout_secs(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process only; nothing survives a restart.
    #[default]
    Memory,
    /// Embedded redb database at `path`.
    Redb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file for the redb backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Match-index entries older than this are evicted by a sweep.
    #[serde(default = "default_match_ttl_secs")]
    pub match_ttl_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            match_ttl_secs: default_match_ttl_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn match_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.match_ttl_secs).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
