//! Persistence port.
//!
//! The core treats storage as an abstract key-value store of JSON documents.
//! Keys name a logical store: the queue is one document, while sessions and
//! match-index entries get one record each so a mutation rewrites only what
//! it touched.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

pub mod memory;
pub mod redb;

pub use memory::MemoryStore;
pub use self::redb::RedbStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Groups of records that can be listed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFamily {
    Queue,
    Sessions,
    MatchIndex,
}

impl StoreFamily {
    pub fn prefix(self) -> &'static str {
        match self {
            StoreFamily::Queue => "queue",
            StoreFamily::Sessions => "sessions/",
            StoreFamily::MatchIndex => "match-index/",
        }
    }
}

/// Logical record name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// `queue`
    Queue,
    /// `sessions/<session id>`
    Session(String),
    /// `match-index/<original handle>`
    MatchIndex(String),
}

impl StoreKey {
    pub fn family(&self) -> StoreFamily {
        match self {
            StoreKey::Queue => StoreFamily::Queue,
            StoreKey::Session(_) => StoreFamily::Sessions,
            StoreKey::MatchIndex(_) => StoreFamily::MatchIndex,
        }
    }

    /// Parse a record name produced by `Display`.
    pub fn parse(name: &str) -> Option<Self> {
        if name == "queue" {
            return Some(StoreKey::Queue);
        }
        match name.split_once('/')? {
            ("sessions", id) if !id.is_empty() => Some(StoreKey::Session(id.to_string())),
            ("match-index", handle) if !handle.is_empty() => {
                Some(StoreKey::MatchIndex(handle.to_string()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Queue => f.write_str("queue"),
            StoreKey::Session(id) => write!(f, "sessions/{id}"),
            StoreKey::MatchIndex(handle) => write!(f, "match-index/{handle}"),
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a record. `None` if it was never written or has been removed.
    async fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a record atomically, replacing any previous value.
    async fn save(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError>;

    /// Delete a record. Returns whether it existed.
    async fn remove(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Keys of every record in `family`.
    async fn list(&self, family: StoreFamily) -> Result<Vec<StoreKey>, StoreError>;
}

/// Serialize `value` as JSON and save it under `key`.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    key: &StoreKey,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.save(key, bytes).await
}

/// Load and deserialize the JSON record under `key`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &StoreKey,
) -> Result<Option<T>, StoreError> {
    match store.load(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("{key}: {e}"))),
        None => Ok(None),
    }
}
