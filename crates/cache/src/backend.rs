//! Cache backends
//!
//! A backend is any key-value store supporting get/set-with-TTL/delete
//! over byte-string keys and values. Production uses Redis through a
//! connection manager; tests and single-process deployments use the
//! in-memory backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;

/// Errors from the cache backend. CacheStore treats all of these as a
/// miss on reads (fail open) and logs them on writes.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// Key-value store with optional per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// `ttl = None` means the entry never expires
    async fn write(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// Redis-backed store
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis. The connection manager reconnects on its own,
    /// so this handle is long-lived and constructed once at startup.
    pub async fn connect(redis_url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn write(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-memory entry with expiration
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() > at,
            None => false,
        }
    }
}

/// Thread-safe in-memory backend
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries (call periodically for memory management)
    pub fn purge(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| !entry.is_expired());
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.values().filter(|entry| !entry.is_expired()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let entries = self.entries.read().map_err(|_| BackendError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn write(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let mut entries = self.entries.write().map_err(|_| BackendError::Poisoned)?;
        entries.insert(key.to_string(), Entry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.write().map_err(|_| BackendError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
