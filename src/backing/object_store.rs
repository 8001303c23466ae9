//! A backing for [`object_store`] stores.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::{path::Path, ObjectStore};

use super::BackingStorageTraits;
use crate::store_key::{StoreKey, StoreKeys};
use crate::{Bytes, MaybeBytes, StorageError};

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        StorageError::Other(err.to_string())
    }
}

/// A backing for any [`object_store::ObjectStore`] store.
///
/// Supports all [`object_store` stores](https://docs.rs/object_store/latest/object_store/index.html#modules),
/// including Amazon S3 (`object_store::aws`), the local filesystem, and
/// [`object_store::memory::InMemory`].
#[derive(Debug)]
pub struct ObjectStoreBacking<T: ObjectStore> {
    object_store: T,
}

impl<T: ObjectStore> ObjectStoreBacking<T> {
    /// Create a new backing wrapping `object_store`.
    #[must_use]
    pub fn new(object_store: T) -> Self {
        Self { object_store }
    }

    fn path(key: &StoreKey) -> Path {
        Path::from(key.as_str())
    }
}

#[async_trait]
impl<T: ObjectStore> BackingStorageTraits for ObjectStoreBacking<T> {
    async fn list(&self, prefix: &str) -> Result<StoreKeys, StorageError> {
        // Raw string-prefix semantics: object store listings are directory
        // delimited, so list everything and filter on the stored form.
        let locations: Vec<Path> = self
            .object_store
            .list(None)
            .map_ok(|object_meta| object_meta.location)
            .try_collect()
            .await?;
        let mut keys = locations
            .iter()
            .filter_map(|location| {
                let path: &str = location.as_ref();
                path.starts_with(prefix).then(|| StoreKey::try_from(path))
            })
            .collect::<Result<StoreKeys, _>>()?;
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        // a missing key is an absent value, not an error
        match self.object_store.get(&Self::path(key)).await {
            Ok(get) => Ok(Some(get.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.object_store.put(&Self::path(key), value.into()).await?;
        Ok(())
    }

    async fn del(&self, key: &StoreKey) -> Result<(), StorageError> {
        // deletion is idempotent
        match self.object_store.delete(&Self::path(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[tokio::test]
    async fn object_store_backing() -> Result<(), Box<dyn Error>> {
        let backing = ObjectStoreBacking::new(object_store::memory::InMemory::new());

        let key = "a/b".try_into()?;
        assert!(backing.get(&key).await?.is_none());
        backing.set(&key, Bytes::from_static(&[0, 1, 2])).await?;
        assert_eq!(backing.get(&key).await?.unwrap(), &[0, 1, 2][..]);

        backing.set(&"a/c".try_into()?, Bytes::new()).await?;
        backing.set(&"b/d".try_into()?, Bytes::new()).await?;
        assert_eq!(
            backing.list("").await?,
            &["a/b".try_into()?, "a/c".try_into()?, "b/d".try_into()?]
        );
        assert_eq!(
            backing.list("a/").await?,
            &["a/b".try_into()?, "a/c".try_into()?]
        );
        assert_eq!(backing.list("a/b").await?, &["a/b".try_into()?]);

        backing.del(&key).await?;
        assert!(backing.get(&key).await?.is_none());
        backing.del(&key).await?; // succeeds
        Ok(())
    }
}
