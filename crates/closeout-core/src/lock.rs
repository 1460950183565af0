//! Run lock for pipeline mutual exclusion.
//!
//! Only one pipeline invocation should be active system-wide. The lock uses
//! the object store as the coordination point: acquisition writes a lock file
//! with a `put_if_absent` precondition, expiry (TTL) prevents a crashed
//! holder from wedging the pipeline, and an expired lock is taken over by
//! deleting and re-acquiring.
//!
//! The lock is advisory: racing invocations stay correct regardless, because
//! the sent-flag and id-range transactions in the pipeline are individually
//! safe to race. The lock only prevents wasted duplicate work.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::storage::ObjectStore;

/// Default lock TTL.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(15 * 60);

/// Lock file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Unique lock holder ID.
    pub holder_id: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(holder_id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        Self {
            holder_id: holder_id.into(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true if the lock has expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Object-store-backed run lock.
pub struct RunLock {
    store: Arc<dyn ObjectStore>,
    path: String,
    ttl: Duration,
}

impl RunLock {
    /// Creates a lock coordinated through the given object path.
    pub fn new(store: Arc<dyn ObjectStore>, path: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            path: path.into(),
            ttl,
        }
    }

    /// Attempts to acquire the lock without waiting.
    ///
    /// Returns `None` if another holder currently owns an unexpired lock.
    /// An expired lock file is deleted and acquisition is retried once.
    ///
    /// # Errors
    ///
    /// Returns an error if the object store fails or the lock file is
    /// unreadable.
    pub async fn try_acquire(&self) -> Result<Option<RunLockGuard>> {
        let holder_id = Ulid::new().to_string();

        for _ in 0..2 {
            let info = LockInfo::new(&holder_id, self.ttl);
            let body = serde_json::to_vec(&info)
                .map_err(|e| Error::serialization(format!("lock info encode: {e}")))?;

            if self
                .store
                .put_if_absent(&self.path, Bytes::from(body))
                .await?
            {
                return Ok(Some(RunLockGuard {
                    store: Arc::clone(&self.store),
                    path: self.path.clone(),
                    holder_id,
                }));
            }

            let current = match self.store.get(&self.path).await {
                Ok(bytes) => bytes,
                // Holder released between our put and get; retry fresh.
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let current: LockInfo = serde_json::from_slice(&current)
                .map_err(|e| Error::serialization(format!("lock info decode: {e}")))?;

            if current.is_expired(Utc::now()) {
                tracing::warn!(
                    holder = %current.holder_id,
                    expired_at = %current.expires_at,
                    "taking over expired run lock"
                );
                self.store.delete(&self.path).await?;
                continue;
            }

            return Ok(None);
        }

        Ok(None)
    }
}

/// Guard for a held run lock. Release explicitly; dropping without release
/// leaves the lock to expire via TTL.
pub struct RunLockGuard {
    store: Arc<dyn ObjectStore>,
    path: String,
    holder_id: String,
}

impl RunLockGuard {
    /// The holder ID recorded in the lock file.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Releases the lock by deleting the lock file.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; the lock then expires via TTL.
    pub async fn release(self) -> Result<()> {
        self.store.delete(&self.path).await
    }
}
