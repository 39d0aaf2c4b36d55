//! Redb-backed persistent store.
//!
//! # Schema
//!
//! ```text
//! STATE: "queue" | "sessions/<id>" | "match-index/<handle>" -> JSON bytes
//! ```
//!
//! Each `save` or `remove` is a single committed write transaction, so a
//! record is either fully replaced or untouched.

use super::{StateStore, StoreError, StoreFamily, StoreKey};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;

        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write().map_err(db_err)?;
        write_txn.open_table(STATE_TABLE).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        let name = key.to_string();
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STATE_TABLE).map_err(db_err)?;
        let value = table.get(name.as_str()).map_err(db_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    async fn save(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        let name = key.to_string();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STATE_TABLE).map_err(db_err)?;
            table
                .insert(name.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let name = key.to_string();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let existed = {
            let mut table = write_txn.open_table(STATE_TABLE).map_err(db_err)?;
            let removed = table.remove(name.as_str()).map_err(db_err)?;
            removed.is_some()
        };
        write_txn.commit().map_err(db_err)?;
        Ok(existed)
    }

    async fn list(&self, family: StoreFamily) -> Result<Vec<StoreKey>, StoreError> {
        let prefix = family.prefix();
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STATE_TABLE).map_err(db_err)?;

        let mut keys = Vec::new();
        for item in table.range(prefix..).map_err(db_err)? {
            let (k, _v) = item.map_err(db_err)?;
            let name = k.value();
            if !name.starts_with(prefix) {
                break;
            }
            if let Some(key) = StoreKey::parse(name).filter(|k| k.family() == family) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
