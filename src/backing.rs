//! The interface by which a [`Store`](crate::Store) accesses a backend datastore.
//!
//! A backing stores opaque byte blobs keyed by string. It has no knowledge of
//! sessions, namespaces, or locks; it is a replaceable collaborator.
//! [`MemoryBacking`] is always available. [`ObjectStoreBacking`] (crate feature
//! `object_store`, enabled by default) adapts any [`object_store`] store,
//! including Amazon S3 and the local filesystem.

mod memory;
#[cfg(feature = "object_store")]
mod object_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::store_key::{StoreKey, StoreKeys};
use crate::{Bytes, MaybeBytes, StorageError};

pub use memory::MemoryBacking;
#[cfg(feature = "object_store")]
pub use self::object_store::ObjectStoreBacking;

/// [`Arc`] wrapped backing storage.
pub type BackingStorage = Arc<dyn BackingStorageTraits>;

/// Backing storage traits.
#[async_trait]
pub trait BackingStorageTraits: Send + Sync + core::fmt::Debug {
    /// Retrieve all keys whose stored form starts with `prefix`.
    ///
    /// This is a raw string-prefix match, not a directory listing. It may be
    /// slow and its result is unbounded.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if there is an underlying error with the store.
    async fn list(&self, prefix: &str) -> Result<StoreKeys, StorageError>;

    /// Retrieve the value at `key`.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if there is an underlying error with the store.
    async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError>;

    /// Store `value` at `key`, overwriting unconditionally.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] on failure to store.
    async fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError>;

    /// Remove the value at `key`.
    ///
    /// Succeeds if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if there is an underlying error with the store.
    async fn del(&self, key: &StoreKey) -> Result<(), StorageError>;
}
