//! In-process store.
//!
//! Default backend. Nothing survives a restart; every operation succeeds.

use super::{StateStore, StoreError, StoreFamily, StoreKey};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(&key.to_string()).map(|r| r.value().clone()))
    }

    async fn save(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool, StoreError> {
        Ok(self.records.remove(&key.to_string()).is_some())
    }

    async fn list(&self, family: StoreFamily) -> Result<Vec<StoreKey>, StoreError> {
        let prefix = family.prefix();
        let mut keys: Vec<StoreKey> = self
            .records
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .filter_map(|e| StoreKey::parse(e.key()))
            .filter(|k| k.family() == family)
            .collect();
        keys.sort_by_key(|k| k.to_string());
        Ok(keys)
    }
}
