//! Session Lockout/Tagout: multi-key mutual exclusion in auto-expiring sessions.
//!
//! [`Sloto`] locks groups of keys all-or-nothing under a fresh [`SessionId`],
//! the sole capability proving membership in the lock set. A session ends on
//! [`Sloto::unlock`] or when its `session_timeout` elapses, whichever comes
//! first. The lock table is in-memory, process-lifetime state; it provides
//! mutual exclusion within a single process, not across processes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_more::Display;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::store_key::{StoreKey, StoreKeys};

/// Default delay between lock attempts while a desired key is busy.
pub const DEFAULT_LOCK_ATTEMPT_INTERVAL: Duration = Duration::from_millis(100);

/// Default wall-clock bound on a single [`Sloto::lock`] call.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a session before its keys are force-unlocked.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Fraction of the attempt interval added as random jitter between attempts.
const JITTER_FRAC: f64 = 0.1;

/// Identifier of a session created by [`Sloto::lock`].
///
/// Opaque to callers. Unique for the lifetime of the process.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
pub struct SessionId(String);

impl SessionId {
    fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Extracts a string slice of the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A [`Sloto::lock`] call exhausted its `lock_timeout`.
#[derive(Debug, Error)]
#[error("timed out locking key: {0}")]
pub struct LockTimeoutError(StoreKey);

impl LockTimeoutError {
    /// The first busy key observed on the last attempt.
    #[must_use]
    pub fn key(&self) -> &StoreKey {
        &self.0
    }
}

/// Configuration for a [`Sloto`].
///
/// Override individual fields with struct update syntax:
///
/// ```
/// # use std::time::Duration;
/// # use slotokv::SlotoConfig;
/// let config = SlotoConfig {
///     session_timeout: Duration::from_secs(60),
///     ..SlotoConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SlotoConfig {
    /// Base delay between retry attempts when a desired key is busy.
    pub lock_attempt_interval: Duration,
    /// Maximum wall-clock duration a single [`Sloto::lock`] call spends retrying.
    pub lock_timeout: Duration,
    /// How long after creation a session may live before it is force-unlocked.
    pub session_timeout: Duration,
}

impl Default for SlotoConfig {
    fn default() -> Self {
        Self {
            lock_attempt_interval: DEFAULT_LOCK_ATTEMPT_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Lock table state. Invariant: a key is in `key_locks` iff it is listed in
/// exactly one session.
#[derive(Debug, Default)]
struct SlotoState {
    key_locks: HashSet<StoreKey>,
    sessions: HashMap<SessionId, StoreKeys>,
}

#[derive(Debug)]
struct SlotoInner {
    config: SlotoConfig,
    state: Mutex<SlotoState>,
}

impl SlotoInner {
    /// Returns true if the session was live.
    fn unlock(&self, sid: &SessionId) -> bool {
        let mut state = self.state.lock();
        let Some(keys) = state.sessions.remove(sid) else {
            return false;
        };
        for key in &keys {
            state.key_locks.remove(key);
        }
        true
    }
}

/// Session Lockout/Tagout: locks groups of keys in auto-expiring sessions.
///
/// Cloning is cheap; clones share the same lock table.
#[derive(Debug, Clone)]
pub struct Sloto {
    inner: Arc<SlotoInner>,
}

impl Sloto {
    /// Create a new lock manager.
    #[must_use]
    pub fn new(config: SlotoConfig) -> Self {
        Self {
            inner: Arc::new(SlotoInner {
                config,
                state: Mutex::default(),
            }),
        }
    }

    /// Create a new session and lock the given keys.
    ///
    /// Acquisition is all-or-nothing: on return either every key is locked
    /// under the new session, or none are and no session exists. Duplicate
    /// keys collapse; a key appears at most once in the session's key list.
    /// While any requested key is busy the call retries, sleeping
    /// `lock_attempt_interval` plus jitter between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeoutError`] naming the first busy key observed on the
    /// last attempt once `lock_timeout` is exhausted.
    pub async fn lock(&self, keys: &[StoreKey]) -> Result<SessionId, LockTimeoutError> {
        let start = Instant::now();
        loop {
            let busy = match self.try_lock(keys) {
                Ok(sid) => {
                    tracing::debug!(session = %sid, keys = keys.len(), "session opened");
                    return Ok(sid);
                }
                Err(busy) => busy,
            };

            if start.elapsed() > self.inner.config.lock_timeout {
                tracing::debug!(key = %busy, "lock attempt timed out");
                return Err(LockTimeoutError(busy));
            }

            let interval = self.inner.config.lock_attempt_interval;
            let jitter = interval.mul_f64(rand::rng().random::<f64>() * JITTER_FRAC);
            tokio::time::sleep(interval + jitter).await;
        }
    }

    /// Release every key held by `sid` and close the session.
    ///
    /// Idempotent: unlocking an unknown or already-closed session is a no-op.
    pub fn unlock(&self, sid: &SessionId) {
        if self.inner.unlock(sid) {
            tracing::debug!(session = %sid, "session closed");
        }
    }

    /// Returns true if `key` is locked within the live session `sid`.
    ///
    /// Returns false for unknown or expired sessions.
    #[must_use]
    pub fn contains(&self, sid: &SessionId, key: &StoreKey) -> bool {
        let state = self.inner.state.lock();
        state
            .sessions
            .get(sid)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Attempt to create a new session and lock the given keys, changing
    /// nothing if any key is already locked.
    fn try_lock(&self, keys: &[StoreKey]) -> Result<SessionId, StoreKey> {
        let mut state = self.inner.state.lock();
        for key in keys {
            if state.key_locks.contains(key) {
                return Err(key.clone());
            }
        }

        let sid = SessionId::mint();
        let mut session_keys = Vec::with_capacity(keys.len());
        for key in keys {
            if state.key_locks.insert(key.clone()) {
                session_keys.push(key.clone());
            }
        }
        state.sessions.insert(sid.clone(), session_keys);
        drop(state);

        self.schedule_expiry(sid.clone());
        Ok(sid)
    }

    /// Arm the one-shot expiry timer for a new session. On firing it takes the
    /// same unlock path a client would; racing an explicit unlock is safe.
    fn schedule_expiry(&self, sid: SessionId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.session_timeout).await;
            if inner.unlock(&sid) {
                tracing::debug!(session = %sid, "session expired");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: &str) -> StoreKey {
        StoreKey::new(key).unwrap()
    }

    fn fast_config() -> SlotoConfig {
        SlotoConfig {
            lock_attempt_interval: Duration::from_millis(1),
            lock_timeout: Duration::from_millis(10),
            session_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn lock_contains_expire() {
        let sloto = Sloto::new(fast_config());

        let sid = sloto.lock(&[key("foo"), key("bar")]).await.unwrap();
        assert!(!sid.as_str().is_empty());

        assert!(sloto.contains(&sid, &key("foo")));
        assert!(sloto.contains(&sid, &key("bar")));
        assert!(!sloto.contains(&sid, &key("baz")));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!sloto.contains(&sid, &key("foo")));
        assert!(!sloto.contains(&sid, &key("bar")));
        assert!(!sloto.contains(&sid, &key("baz")));

        // expiry released the keys
        sloto.lock(&[key("foo"), key("bar")]).await.unwrap();
        let err = sloto.lock(&[key("baz"), key("bar")]).await.unwrap_err();
        assert_eq!(err.to_string(), "timed out locking key: bar");
        assert_eq!(err.key(), &key("bar"));
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let sloto = Sloto::new(fast_config());

        let sid = sloto.lock(&[key("foo")]).await.unwrap();
        sloto.unlock(&sid);
        assert!(!sloto.contains(&sid, &key("foo")));
        sloto.unlock(&sid);

        // the key is free again
        sloto.lock(&[key("foo")]).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_keys_collapse() {
        let sloto = Sloto::new(fast_config());

        let sid = sloto.lock(&[key("foo"), key("foo")]).await.unwrap();
        assert!(sloto.contains(&sid, &key("foo")));

        sloto.unlock(&sid);
        assert!(!sloto.contains(&sid, &key("foo")));
        sloto.lock(&[key("foo")]).await.unwrap();
    }

    #[tokio::test]
    async fn failed_lock_changes_nothing() {
        let sloto = Sloto::new(fast_config());

        let sid = sloto.lock(&[key("bar")]).await.unwrap();
        let err = sloto.lock(&[key("foo"), key("bar")]).await.unwrap_err();
        assert_eq!(err.key(), &key("bar"));

        // the failed group acquisition must not have left "foo" locked
        sloto.unlock(&sid);
        let sid = sloto.lock(&[key("foo"), key("bar")]).await.unwrap();
        assert!(sloto.contains(&sid, &key("foo")));
    }

    /// Workers append to two of three shared strings concurrently. The
    /// read-sleep-write inside each session loses updates unless neighbouring
    /// pairs are mutually excluded.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pairwise_stress() {
        let sloto = Sloto::new(SlotoConfig {
            lock_attempt_interval: Duration::from_millis(1),
            lock_timeout: Duration::from_secs(15),
            session_timeout: Duration::from_secs(30),
        });

        let x = Arc::new(Mutex::new(String::new()));
        let y = Arc::new(Mutex::new(String::new()));
        let z = Arc::new(Mutex::new(String::new()));

        let count = 50;
        let tasks = (0..count * 3).map(|i| {
            let sloto = sloto.clone();
            let (names, targets) = match i % 3 {
                0 => ([key("x"), key("y")], [x.clone(), y.clone()]),
                1 => ([key("y"), key("z")], [y.clone(), z.clone()]),
                _ => ([key("z"), key("x")], [z.clone(), x.clone()]),
            };
            tokio::spawn(async move {
                let sid = sloto.lock(&names).await.unwrap();
                for target in &targets {
                    let current = target.lock().clone();
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    *target.lock() = current + "x";
                }
                sloto.unlock(&sid);
            })
        });
        futures::future::try_join_all(tasks).await.unwrap();

        // each string is appended to by two of the three worker kinds
        assert_eq!(x.lock().len(), count * 2);
        assert_eq!(y.lock().len(), count * 2);
        assert_eq!(z.lock().len(), count * 2);
    }
}
