//! A key-value store whose durable state lives in an object store, with
//! serializability enforced in-process by a session-scoped multi-key lock
//! manager.
//!
//! The lock manager, [`Sloto`] ("Session Lockout/Tagout", like the tags that
//! keep industrial equipment safe), locks groups of keys all-or-nothing under
//! auto-expiring sessions. The [`Store`] composes it with a pluggable
//! [backing store](backing): it namespaces keys, gates mutations on session
//! membership, and delegates reads and writes.
//!
//! Locking is a single-process concern: the backing store may be shared, but
//! the lock table is local, in-memory state.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use slotokv::backing::MemoryBacking;
//! use slotokv::{Bytes, Store, StoreKey};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new("app", Arc::new(MemoryBacking::new()))?;
//! let key = StoreKey::new("key1")?;
//!
//! // Lock keys so you can exclusively interact with their data.
//! let session = store.lock(&[key.clone()]).await?;
//! store.set(&session, &key, Bytes::from("val1")).await?;
//! store.unlock(&session);
//!
//! // Reads are not gated on sessions.
//! assert_eq!(store.get(&key).await?, Some(Bytes::from("val1")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate features
//! - `object_store` (enabled by default): [`backing::ObjectStoreBacking`],
//!   which adapts any [`object_store`] store (Amazon S3, the local
//!   filesystem, an in-memory store) as a backing.

pub mod backing;
pub mod sloto;
mod store;
mod store_key;

use thiserror::Error;

pub use sloto::{SessionId, Sloto, SlotoConfig};
pub use store::{SessionMembershipError, Store};
pub use store_key::{StoreKey, StoreKeyError, StoreKeys};

/// The type for bytes used in store set and get methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// An alias for bytes which may or may not be available.
///
/// When a value is read from a store, it returns `MaybeBytes` which is
/// [`None`] if the key is not available.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store namespace is empty or starts or ends with `/`.
    #[error("invalid store namespace {0:?}")]
    InvalidNamespace(String),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// A lock call exhausted its timeout while a requested key stayed busy.
    #[error(transparent)]
    LockTimeout(#[from] sloto::LockTimeoutError),
    /// A mutation was gated on a session that does not hold the key.
    #[error(transparent)]
    SessionMembership(#[from] SessionMembershipError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
