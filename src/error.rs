//! Unified error handling for parleyd.
//!
//! Each layer has its own error enum; [`LobbyError`] is what request-layer
//! callers see. Every enum exposes a static `error_code()` for metrics labels.

use crate::store::StoreError;
use thiserror::Error;

// ============================================================================
// Session Errors (turn state machine)
// ============================================================================

/// Errors raised by a [`TurnSession`](crate::session::TurnSession).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no slot with index {0}")]
    UnknownSlot(usize),

    #[error("slot {slot} posted out of turn (current speaker is slot {current})")]
    TurnViolation { slot: usize, current: usize },

    #[error("session has not been started")]
    NotStarted,

    #[error("invalid session configuration: {0}")]
    InvalidConfiguration(String),
}

impl SessionError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownSlot(_) => "unknown_slot",
            Self::TurnViolation { .. } => "turn_violation",
            Self::NotStarted => "not_started",
            Self::InvalidConfiguration(_) => "invalid_configuration",
        }
    }
}

// ============================================================================
// Lobby Errors (request-layer surface)
// ============================================================================

/// Errors returned by [`Lobby`](crate::lobby::Lobby) operations.
///
/// Automated-response failures never appear here: they are recovered with a
/// fallback message inside the lobby.
#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("session handle must not be empty")]
    EmptyHandle,

    #[error("no such session: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl LobbyError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyHandle => "empty_handle",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Session(e) => e.error_code(),
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Only persistence failures are transient; everything else is a
    /// contract violation by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// True for unknown session / slot lookups.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::Session(SessionError::UnknownSlot(_))
        )
    }
}

/// Result type for lobby operations.
pub type LobbyResult<T> = Result<T, LobbyError>;
