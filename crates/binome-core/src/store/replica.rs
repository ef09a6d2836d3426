//! Whole-collection persistence of records

use std::sync::{Arc, Mutex};

use super::{KvStore, ReplicaRecord};
use crate::error::{Error, Result};

/// On-device copy of every entity collection.
///
/// Collections are always replaced as a whole. Read-modify-write cycles go
/// through [`LocalReplica::modify`], which serializes writers sharing this
/// replica.
pub struct LocalReplica<S: KvStore> {
    store: Arc<S>,
    write_lock: Arc<Mutex<()>>,
}

impl<S: KvStore> Clone for LocalReplica<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<S: KvStore> LocalReplica<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Underlying key-value store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load a collection. A collection that was never saved is empty.
    pub fn load<R: ReplicaRecord>(&self) -> Result<Vec<R>> {
        match self.store.get(R::COLLECTION)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace a collection.
    pub fn save<R: ReplicaRecord>(&self, records: &[R]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        self.store.set(R::COLLECTION, &bytes)?;
        tracing::debug!("Saved {} {} locally", records.len(), R::COLLECTION);
        Ok(())
    }

    /// Load, edit and save a collection as one step.
    ///
    /// Nothing is saved when `edit` fails.
    pub fn modify<R, T>(&self, edit: impl FnOnce(&mut Vec<R>) -> Result<T>) -> Result<T>
    where
        R: ReplicaRecord,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Database("replica write lock poisoned".to_string()))?;
        let mut records = self.load::<R>()?;
        let outcome = edit(&mut records)?;
        self.save(&records)?;
        Ok(outcome)
    }
}
