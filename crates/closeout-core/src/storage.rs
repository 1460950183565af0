//! Object store abstraction for archive artifacts.
//!
//! Archive writes are keyed deterministically by id range, so the contract is
//! deliberately small: unconditional idempotent `put` (re-running a crashed
//! batch overwrites the identical artifact), idempotent `delete` (used for
//! compensation), and a conditional `put_if_absent` used only by the run lock.
//!
//! Production backends (GCS, S3, filesystem) implement this trait out of
//! scope; [`MemoryObjectStore`] backs tests and local runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: DateTime<Utc>,
}

/// Durable object storage for archive artifacts and the run lock.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Writes an object unconditionally. Overwrites any existing object at
    /// the same path.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Writes an object only if nothing exists at the path.
    ///
    /// Returns `true` if the write happened, `false` if an object was
    /// already present.
    async fn put_if_absent(&self, path: &str, data: Bytes) -> Result<bool>;

    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Deletes an object. Succeeds even if the object doesn't exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix, ordered by path.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
}

/// In-memory object store for testing and local runs.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn object_count(&self) -> Result<usize> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.len())
    }
}

fn poisoned() -> Error {
    Error::Internal {
        message: "lock poisoned".into(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, data: Bytes) -> Result<bool> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        if objects.contains_key(path) {
            return Ok(false);
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect())
    }
}
