//! Read-through TTL cache in front of a [`StorageBackend`].
//!
//! Reads are served from the cache while an entry is live; a miss goes to
//! the backend and stamps the result with a fresh expiry. Writes go to the
//! backend first and the cache is then overwritten with whatever the backend
//! reports as stored, never with the caller's input.
//!
//! Every operation that touches the backend for a given key runs under that
//! key's async lock, so a read-modify-write ([`CachedStore::update`]) cannot
//! interleave with another write to the same key. Unrelated keys never wait
//! on each other. The cache itself has no size bound and may be dropped with
//! [`CachedStore::clear`] at any time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::application::errors::StorageError;
use crate::domain::traits::StorageBackend;

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` caches a confirmed absence
    value: Option<Value>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for ch in part.chars() {
        if matches!(ch, '\\' | ':') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Guild-scoped cached data store
pub struct CachedStore {
    backend: Arc<dyn StorageBackend>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds a key's write lock; drops the lock table slot once nobody else wants it
struct KeyGuard<'a> {
    store: &'a CachedStore,
    key: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.store.key_locks.lock();
        // One reference in the table, one here.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

impl CachedStore {
    pub fn new(backend: Arc<dyn StorageBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `tenant:entityType:keyword`, with `\` and `:` escaped inside each part
    pub fn cache_key(entity_type: &str, entity_id: &str, keyword: &str) -> String {
        format!("{}:{}:{}", escape_part(entity_id), escape_part(entity_type), escape_part(keyword))
    }

    fn cached(&self, key: &str) -> Option<Option<Value>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, key: String, value: Option<Value>) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(key, entry);
    }

    async fn lock_key(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.key_locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        KeyGuard {
            store: self,
            key: key.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    /// Read a value, consulting the cache first
    pub async fn get(&self, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<Value>, StorageError> {
        let key = Self::cache_key(entity_type, entity_id, keyword);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let _guard = self.lock_key(&key).await;
        // A writer may have refreshed the entry while we waited.
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        tracing::trace!(key = %key, backend = self.backend.name(), "Cache miss");
        let value = self.backend.get(entity_type, entity_id, keyword).await?;
        self.remember(key, value.clone());
        Ok(value)
    }

    /// Write a value and cache the backend's authoritative result
    pub async fn set(&self, entity_type: &str, entity_id: &str, keyword: &str, value: Value) -> Result<Value, StorageError> {
        let key = Self::cache_key(entity_type, entity_id, keyword);
        let _guard = self.lock_key(&key).await;
        self.write_locked(key, entity_type, entity_id, keyword, value).await
    }

    async fn write_locked(
        &self,
        key: String,
        entity_type: &str,
        entity_id: &str,
        keyword: &str,
        value: Value,
    ) -> Result<Value, StorageError> {
        match self.backend.set(entity_type, entity_id, keyword, value).await {
            Ok(stored) => {
                self.remember(key, Some(stored.clone()));
                Ok(stored)
            }
            Err(e) => {
                // The backend may or may not have applied the write.
                self.entries.lock().remove(&key);
                Err(e)
            }
        }
    }

    /// Writes `value` only when the backend holds nothing for the key.
    ///
    /// Returns the value now stored and whether this call wrote it.
    pub async fn set_if_absent(
        &self,
        entity_type: &str,
        entity_id: &str,
        keyword: &str,
        value: Value,
    ) -> Result<(Value, bool), StorageError> {
        let key = Self::cache_key(entity_type, entity_id, keyword);
        let _guard = self.lock_key(&key).await;

        if let Some(existing) = self.backend.get(entity_type, entity_id, keyword).await? {
            self.remember(key, Some(existing.clone()));
            return Ok((existing, false));
        }
        let stored = self.write_locked(key, entity_type, entity_id, keyword, value).await?;
        Ok((stored, true))
    }

    /// Serialised read-modify-write against the backend's current value.
    ///
    /// `f` sees the authoritative value (not the cached copy). Returning an
    /// error from `f` aborts without writing.
    pub async fn update<F, E>(&self, entity_type: &str, entity_id: &str, keyword: &str, f: F) -> Result<Value, E>
    where
        F: FnOnce(Option<Value>) -> Result<Value, E>,
        E: From<StorageError>,
    {
        let key = Self::cache_key(entity_type, entity_id, keyword);
        let _guard = self.lock_key(&key).await;

        let current = self.backend.get(entity_type, entity_id, keyword).await?;
        let next = f(current)?;
        Ok(self.write_locked(key, entity_type, entity_id, keyword, next).await?)
    }

    pub async fn get_as<T>(&self, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
    {
        match self.get(entity_type, entity_id, keyword).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set_as<T>(&self, entity_type: &str, entity_id: &str, keyword: &str, value: &T) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned,
    {
        let stored = self
            .set(entity_type, entity_id, keyword, serde_json::to_value(value)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Typed [`update`](Self::update)
    pub async fn update_as<T, F, E>(&self, entity_type: &str, entity_id: &str, keyword: &str, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let stored = self
            .update(entity_type, entity_id, keyword, |current| {
                let current = match current {
                    Some(value) => Some(serde_json::from_value(value).map_err(StorageError::from)?),
                    None => None,
                };
                let next = f(current)?;
                Ok::<_, E>(serde_json::to_value(next).map_err(StorageError::from)?)
            })
            .await?;
        Ok(serde_json::from_value(stored).map_err(StorageError::from)?)
    }

    /// Drop one cached entry
    pub fn invalidate(&self, entity_type: &str, entity_id: &str, keyword: &str) {
        self.entries
            .lock()
            .remove(&Self::cache_key(entity_type, entity_id, keyword));
    }

    /// Drop the whole cache; the next reads rebuild it from the backend
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.entries.lock().len()
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        self.backend.close().await
    }
}
