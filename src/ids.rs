//! Identifier generation for participants and sessions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of collision-resistant identifiers.
pub trait IdSource: Send + Sync {
    /// Identifier for a newly admitted participant.
    fn participant_id(&self) -> String;

    /// Identifier for a newly created session.
    fn session_id(&self) -> String;
}

/// Random v4 UUID identifiers, e.g. `room_3f2b9c...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn participant_id(&self) -> String {
        format!("user_{}", uuid::Uuid::new_v4().simple())
    }

    fn session_id(&self) -> String {
        format!("room_{}", uuid::Uuid::new_v4().simple())
    }
}

/// Deterministic counter-based identifiers.
///
/// Format: prefix + 6 chars base36, e.g. `user_AAAAAA`, `room_AAAAAB`.
/// Unique for the lifetime of the generator only; used by tests and
/// single-process deployments that never restore persisted state.
#[derive(Debug, Default)]
pub struct SequentialIds {
    participants: AtomicU64,
    sessions: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn participant_id(&self) -> String {
        let n = self.participants.fetch_add(1, Ordering::Relaxed);
        format!("user_{}", base36_encode_6(n))
    }

    fn session_id(&self) -> String {
        let n = self.sessions.fetch_add(1, Ordering::Relaxed);
        format!("room_{}", base36_encode_6(n))
    }
}

/// Encode a number as a 6-character base36 string.
fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}
