//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, StorageBackend};
use crate::queue::RotationError;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("matching: {0}")]
    TagRotation(#[from] RotationError),
    #[error("matching.session_create_attempts must be at least 1")]
    NoCreateAttempts,
    #[error("session.max_slots must be at least 2, got {0}")]
    MaxSlotsTooSmall(usize),
    #[error("session.name_pool has {pool} names but max_slots is {max_slots}")]
    NamePoolTooSmall { pool: usize, max_slots: usize },
    #[error("session.name_pool contains '{0}' more than once")]
    DuplicateName(String),
    #[error("responder.timeout_secs must be greater than 0")]
    ZeroResponderTimeout,
    #[error("server.{0} must be greater than 0")]
    ZeroInterval(&'static str),
    #[error("storage.path parent directory does not exist: {0}")]
    StoragePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Tag rotation: non-empty, roles present, distinct, nothing unclassified
    if let Err(e) = config.matching.rotation() {
        errors.push(ValidationError::TagRotation(e));
    }
    if config.matching.session_create_attempts == 0 {
        errors.push(ValidationError::NoCreateAttempts);
    }

    // Name pool must cover the largest session
    let session = &config.session;
    if session.max_slots < 2 {
        errors.push(ValidationError::MaxSlotsTooSmall(session.max_slots));
    }
    if session.name_pool.len() < session.max_slots {
        errors.push(ValidationError::NamePoolTooSmall {
            pool: session.name_pool.len(),
            max_slots: session.max_slots,
        });
    }
    for (idx, name) in session.name_pool.iter().enumerate() {
        if session.name_pool[..idx].contains(name) {
            errors.push(ValidationError::DuplicateName(name.clone()));
        }
    }

    if config.responder.timeout_secs == 0 {
        errors.push(ValidationError::ZeroResponderTimeout);
    }
    if config.server.match_interval_secs == 0 {
        errors.push(ValidationError::ZeroInterval("match_interval_secs"));
    }
    if config.server.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroInterval("sweep_interval_secs"));
    }

    // Database path validation
    if config.storage.backend == StorageBackend::Redb {
        let db_path = Path::new(&config.storage.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::StoragePathInvalid(
                config.storage.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
