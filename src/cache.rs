//! Single-slot snapshot cache with timestamp + TTL semantics.
//!
//! Records are stored as `{ timestamp, data }` (epoch milliseconds) and
//! encoded with postcard. Reads never fail: a missing, unreadable or
//! undecodable record is a cache miss.

use anyhow::Result;
use fjall::Keyspace;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task;

use crate::SmogMapError;
use crate::clock::Clock;

/// Raw key-value persistence underneath the snapshot cache.
pub trait SnapshotBackend: Send + Sync + 'static {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// fjall-backed persistent store.
pub struct FjallBackend {
    _db: fjall::Database,
    store: Keyspace,
}

impl FjallBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("snapshots", fjall::KeyspaceCreateOptions::default)?;
        Ok(FjallBackend {
            _db: db,
            store: items,
        })
    }
}

impl SnapshotBackend for FjallBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(key.as_bytes().to_vec())?.map(|v| v.to_vec()))
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.store.insert(key.as_bytes().to_vec(), bytes)?;
        Ok(())
    }
}

/// Process-local store, for sessions that should not touch disk.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), bytes);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord<T> {
    timestamp: i64, // Unix timestamp (milliseconds)
    data: T,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoadOptions {
    /// Return the record even when it is older than the TTL
    pub allow_expired: bool,
}

impl LoadOptions {
    #[must_use]
    pub fn fresh_only() -> Self {
        Self {
            allow_expired: false,
        }
    }

    #[must_use]
    pub fn allow_expired() -> Self {
        Self {
            allow_expired: true,
        }
    }
}

#[derive(Clone)]
pub struct SnapshotCache {
    backend: Arc<dyn SnapshotBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(backend: Arc<dyn SnapshotBackend>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Retrieves the value stored under `key`.
    /// Returns `None` for absent, corrupt or (unless allowed) expired records.
    #[tracing::instrument(name = "load_snapshot", level = "debug", skip(self))]
    pub async fn load<T: DeserializeOwned + Send + 'static>(
        &self,
        key: &str,
        options: LoadOptions,
    ) -> Option<T> {
        let backend = Arc::clone(&self.backend);
        let key_owned = key.to_string();

        let maybe_bytes = match task::spawn_blocking(move || backend.read(&key_owned)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!("Snapshot read failed: {e:#}");
                return None;
            }
            Err(e) => {
                tracing::warn!("Snapshot read task failed: {e}");
                return None;
            }
        };

        let Some(bytes) = maybe_bytes else {
            tracing::debug!("Key not found");
            return None;
        };

        let record: SnapshotRecord<T> = match postcard::from_bytes(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Ignoring corrupt snapshot: {e}");
                return None;
            }
        };

        if options.allow_expired || self.is_fresh(record.timestamp) {
            tracing::debug!("Key found");
            Some(record.data)
        } else {
            tracing::debug!("Key found but expired");
            None
        }
    }

    /// Overwrites the slot under `key`, stamped with the current time.
    #[tracing::instrument(name = "save_snapshot", level = "debug", skip(self, data))]
    pub async fn save<T: Serialize>(&self, key: &str, data: &T) -> crate::Result<()> {
        let bytes = postcard::to_stdvec(&SnapshotRecord {
            timestamp: self.clock.now().timestamp_millis(),
            data,
        })
        .map_err(|e| SmogMapError::cache(format!("encoding {key} failed: {e}")))?;

        let backend = Arc::clone(&self.backend);
        let key = key.to_string();
        task::spawn_blocking(move || backend.write(&key, bytes))
            .await
            .map_err(|e| SmogMapError::cache(format!("write task failed: {e}")))?
            .map_err(|e| SmogMapError::cache(format!("{e:#}")))
    }

    /// A timestamp too far off to compute an age from counts as expired.
    fn is_fresh(&self, timestamp: i64) -> bool {
        let Some(age_ms) = self.clock.now().timestamp_millis().checked_sub(timestamp) else {
            return false;
        };
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        age_ms < ttl_ms
    }
}
