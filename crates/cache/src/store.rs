//! Cache-aside store with stale-while-revalidate refresh
//!
//! `CacheStore::get` checks the backend before computing a value and
//! writes the computed value back for future reads. Hits schedule a
//! jittered background refresh; misses either return empty immediately
//! (`allow_stale_empty`, load-shedding for cold keys) or compute
//! synchronously. Backend unavailability degrades to "always
//! recompute", never to an error surfaced to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::CacheBackend;
use crate::key::{compose_key, KeyPart};
use crate::refresh::RefreshPool;

/// Default TTL for cached values (5 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Per-call cache behavior
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// On a miss, return empty immediately and populate in the
    /// background instead of blocking on the compute. The first caller
    /// for a cold key gets a deliberate false negative.
    pub allow_stale_empty: bool,
    /// Do not schedule a background refresh on a hit
    pub suppress_refresh: bool,
    /// Store without expiry
    pub never_expire: bool,
    /// Expiry for stored values (ignored when `never_expire`)
    pub ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            allow_stale_empty: false,
            suppress_refresh: false,
            never_expire: false,
            ttl: DEFAULT_TTL,
        }
    }
}

/// Errors surfaced by `CacheStore::get`. Only the synchronous-miss
/// path can fail; backend trouble and background compute failures are
/// logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("compute failed: {0}")]
    Compute(#[source] anyhow::Error),

    #[error("compute task aborted")]
    Aborted,
}

/// Shared cache-aside store. Construct once at startup and hand out
/// behind an `Arc`.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    refresh: RefreshPool,
    max_jitter: Duration,
}

impl CacheStore {
    /// `max_jitter` bounds the random delay before a hit-triggered
    /// background refresh, so concurrent readers of a hot key do not
    /// all recompute at once.
    pub fn new(backend: Arc<dyn CacheBackend>, refresh: RefreshPool, max_jitter: Duration) -> Self {
        Self {
            backend,
            refresh,
            max_jitter,
        }
    }

    /// Cache-aside read. `compute` produces `Ok(None)` for "no value";
    /// empty results are returned but never cached.
    pub async fn get<T, C, Fut>(
        &self,
        parts: &[KeyPart],
        opts: CacheOptions,
        compute: C,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        let key = compose_key(parts);

        // Fail open: a broken cache degrades to recompute, never to an
        // error for the caller.
        let cached = match self.backend.read(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        if let Some(bytes) = cached {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    if !opts.suppress_refresh {
                        let delay = self.jitter();
                        self.spawn_background(key, opts, compute, delay);
                    }
                    return Ok(Some(value));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cached value failed to decode, treating as miss");
                }
            }
        }

        if opts.allow_stale_empty {
            self.spawn_background(key, opts, compute, Duration::ZERO);
            return Ok(None);
        }

        // Synchronous miss. The compute runs in its own task so that a
        // caller disconnecting mid-flight does not cancel it; the result
        // still lands in the cache for subsequent requests.
        let backend = Arc::clone(&self.backend);
        let ttl = store_ttl(&opts);
        let handle = tokio::spawn(async move {
            let value = compute().await?;
            if let Some(v) = &value {
                write_back(&backend, &key, v, ttl).await;
            }
            Ok::<_, anyhow::Error>(value)
        });

        match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Compute(e)),
            Err(e) => {
                tracing::warn!(error = %e, "cache compute task failed to join");
                Err(CacheError::Aborted)
            }
        }
    }

    /// Drop a cached entry
    pub async fn invalidate(&self, parts: &[KeyPart]) {
        let key = compose_key(parts);
        if let Err(e) = self.backend.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "cache invalidation failed");
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Fire-and-forget compute-and-store through the refresh pool
    fn spawn_background<T, C, Fut>(&self, key: String, opts: CacheOptions, compute: C, delay: Duration)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let ttl = store_ttl(&opts);
        self.refresh.submit(
            delay,
            Box::pin(async move {
                match compute().await {
                    Ok(Some(value)) => write_back(&backend, &key, &value, ttl).await,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(key = %key, error = %e, "background compute failed");
                    }
                }
            }),
        );
    }
}

fn store_ttl(opts: &CacheOptions) -> Option<Duration> {
    if opts.never_expire {
        None
    } else {
        Some(opts.ttl)
    }
}

/// Serialize and write a value. Never blocks the read path from
/// returning its already-decided value; failures are logged.
async fn write_back<T: Serialize>(
    backend: &Arc<dyn CacheBackend>,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            if let Err(e) = backend.write(key, &bytes, ttl).await {
                tracing::warn!(key = %key, error = %e, "cache write failed");
            }
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "cache value failed to serialize");
        }
    }
}
