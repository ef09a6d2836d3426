//! Local replica storage.
//!
//! The device keeps every entity collection as one JSON array in a simple
//! key-value store. [`LocalReplica`] reads and replaces whole collections;
//! [`FieldStore`] is the mutation façade that validates records and tells the
//! sync scheduler about every change.

mod field_store;
mod replica;
mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Distribution, Zone};

pub use field_store::{DistributionEdit, FieldStore};
pub use replica::LocalReplica;
pub use sqlite::SqliteKvStore;

/// Byte-string key-value persistence.
pub trait KvStore: Send + Sync {
    /// Read a value, `None` when the key was never set or was removed
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// A record kept in the local replica, keyed by its client-side id.
pub trait ReplicaRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Key of the collection in the key-value store
    const COLLECTION: &'static str;

    /// Client-generated identifier
    fn record_id(&self) -> &str;
}

impl ReplicaRecord for Distribution {
    const COLLECTION: &'static str = "distributions";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

impl ReplicaRecord for Zone {
    const COLLECTION: &'static str = "zones";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

/// In-memory [`KvStore`] (primarily for tests)
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Database("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
