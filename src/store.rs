//! The store façade: key namespacing, session gating, and delegation to a
//! backing store.

use thiserror::Error;

use crate::backing::BackingStorage;
use crate::sloto::{SessionId, Sloto, SlotoConfig};
use crate::store_key::{StoreKey, StoreKeys};
use crate::{Bytes, MaybeBytes, StorageError};

/// A mutation was gated on a session that does not hold the key.
///
/// This indicates either programmer error or that the session has expired.
#[derive(Debug, Error)]
#[error("session {session} does not include key: {key}")]
pub struct SessionMembershipError {
    session: SessionId,
    key: StoreKey,
}

impl SessionMembershipError {
    /// The session presented with the mutation.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The key the session does not hold.
    #[must_use]
    pub fn key(&self) -> &StoreKey {
        &self.key
    }
}

/// A key-value store over a [backing store](crate::backing), with mutations
/// serialized by a session-scoped lock manager.
///
/// Every key is prefixed with the store's namespace (joined by `/`) before it
/// reaches the backing store. Mutations require a live [`SessionId`] holding
/// the key, obtained from [`Store::lock`]; reads do not.
#[derive(Debug)]
pub struct Store {
    namespace: String,
    backing: BackingStorage,
    sloto: Sloto,
}

impl Store {
    /// Create a new store with default lock timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidNamespace`] if `namespace` is empty or
    /// starts or ends with `/`.
    pub fn new(
        namespace: impl Into<String>,
        backing: BackingStorage,
    ) -> Result<Self, StorageError> {
        Self::new_with_config(namespace, backing, SlotoConfig::default())
    }

    /// Create a new store with the given lock manager configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidNamespace`] if `namespace` is empty or
    /// starts or ends with `/`.
    pub fn new_with_config(
        namespace: impl Into<String>,
        backing: BackingStorage,
        config: SlotoConfig,
    ) -> Result<Self, StorageError> {
        let namespace = namespace.into();
        if !StoreKey::validate(&namespace) {
            return Err(StorageError::InvalidNamespace(namespace));
        }
        Ok(Self {
            namespace,
            backing,
            sloto: Sloto::new(config),
        })
    }

    /// The namespace prefixed to every key before it reaches the backing store.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Retrieve all backing-store keys starting with `namespace/prefix`.
    ///
    /// The result is returned raw: keys are in their stored (namespaced) form.
    /// Does not consult the lock manager.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if there is an underlying error with the
    /// backing store.
    pub async fn list(&self, prefix: &str) -> Result<StoreKeys, StorageError> {
        self.backing
            .list(&format!("{}/{}", self.namespace, prefix))
            .await
    }

    /// Retrieve the value at `key`.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// Reads are not gated on sessions: a reader may observe a value being
    /// mutated inside some session. For an atomic read-modify-write, lock the
    /// key first and read within the session.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if there is an underlying error with the
    /// backing store.
    pub async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        self.backing.get(&self.namespaced(key)).await
    }

    /// Create a session holding every key in `keys`, locking them
    /// all-or-nothing.
    ///
    /// The session ends on [`Store::unlock`] or after the configured session
    /// timeout, whichever comes first. After expiry, mutations under the
    /// session fail their membership check; acquire a new session to proceed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockTimeout`] if a requested key stayed busy
    /// for the whole lock timeout.
    pub async fn lock(&self, keys: &[StoreKey]) -> Result<SessionId, StorageError> {
        Ok(self.sloto.lock(keys).await?)
    }

    /// Release every key held by `sid` and close the session.
    ///
    /// Idempotent: unlocking an unknown or already-closed session is a no-op.
    pub fn unlock(&self, sid: &SessionId) {
        self.sloto.unlock(sid);
    }

    /// Store `value` at `key`, overwriting unconditionally.
    ///
    /// Session expiry does not cancel a mutation already in flight; it may
    /// still reach the backing store without holding exclusion.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SessionMembership`] if `sid` does not hold
    /// `key`, otherwise any [`StorageError`] from the backing store.
    pub async fn set(
        &self,
        sid: &SessionId,
        key: &StoreKey,
        value: Bytes,
    ) -> Result<(), StorageError> {
        self.check_membership(sid, key)?;
        self.backing.set(&self.namespaced(key), value).await
    }

    /// Remove the value at `key`. Succeeds if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SessionMembership`] if `sid` does not hold
    /// `key`, otherwise any [`StorageError`] from the backing store.
    pub async fn del(&self, sid: &SessionId, key: &StoreKey) -> Result<(), StorageError> {
        self.check_membership(sid, key)?;
        self.backing.del(&self.namespaced(key)).await
    }

    fn check_membership(
        &self,
        sid: &SessionId,
        key: &StoreKey,
    ) -> Result<(), SessionMembershipError> {
        if self.sloto.contains(sid, key) {
            Ok(())
        } else {
            tracing::debug!(session = %sid, key = %key, "mutation rejected");
            Err(SessionMembershipError {
                session: sid.clone(),
                key: key.clone(),
            })
        }
    }

    /// Prefix `key` with the store namespace. The namespace and key shape
    /// rules guarantee the composed key is valid.
    fn namespaced(&self, key: &StoreKey) -> StoreKey {
        unsafe { StoreKey::new_unchecked(format!("{}/{}", self.namespace, key)) }
    }
}
