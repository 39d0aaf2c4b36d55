//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and loading (Config, one struct per TOML section)
//! - [`defaults`]: serde default value functions
//! - [`validation`]: cross-field checks run once at startup

mod defaults;
mod types;
pub mod validation;

pub use types::{
    Config, ConfigError, LogFormat, LoggingConfig, MatchingConfig, ResponderBackend,
    ResponderConfig, RetentionConfig, ServerConfig, SessionConfig, StorageBackend,
    StorageConfig,
};
pub use validation::{ValidationError, validate};
