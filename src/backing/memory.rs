//! An in-memory backing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::BackingStorageTraits;
use crate::store_key::{StoreKey, StoreKeys};
use crate::{Bytes, MaybeBytes, StorageError};

/// An in-memory backing.
///
/// Data lives for the lifetime of the value; useful for tests and as a
/// stand-in for an object store.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    data_map: RwLock<BTreeMap<StoreKey, Bytes>>,
}

impl MemoryBacking {
    /// Create a new, empty in-memory backing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackingStorageTraits for MemoryBacking {
    async fn list(&self, prefix: &str) -> Result<StoreKeys, StorageError> {
        let data_map = self.data_map.read();
        Ok(data_map
            .keys()
            .filter(|key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let data_map = self.data_map.read();
        Ok(data_map.get(key).cloned())
    }

    async fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let mut data_map = self.data_map.write();
        data_map.insert(key.clone(), value);
        Ok(())
    }

    async fn del(&self, key: &StoreKey) -> Result<(), StorageError> {
        let mut data_map = self.data_map.write();
        data_map.remove(key);
        Ok(())
    }
}
