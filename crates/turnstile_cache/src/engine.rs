// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache-aside engine and its three anti-stampede strategies.

use std::{fmt::Display, time::Duration};

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use turnstile_store::RemoteStore;

use crate::{Envelope, Error, Result, rebuild::RebuildPool};

/// Value stored under a key to mark a confirmed-absent record.
///
/// An empty payload can never be a legitimate serialized value (every JSON
/// document is at least one byte), so the empty string doubles as the
/// negative-cache marker.
const EMPTY_MARKER: &str = "";

/// Value stored under an advisory rebuild lock. The advisory locks are
/// per-key and short-lived; unlike the order locks they need no holder
/// token, because only the instance that acquired one proceeds to rebuild.
const ADVISORY_HOLDER: &str = "1";

const DEFAULT_NULL_TTL: Duration = Duration::from_secs(120);
const DEFAULT_MUTEX_TTL: Duration = Duration::from_secs(10);
const DEFAULT_MUTEX_RETRIES: u32 = 3;
const DEFAULT_MUTEX_BACKOFF: Duration = Duration::from_millis(50);
const DEFAULT_REBUILD_WORKERS: usize = 10;

/// What a cache read found.
enum CachedState<T> {
    /// A decoded payload.
    Value(T),
    /// The empty-marker: the record is confirmed absent, don't ask the
    /// system of record again.
    Absent,
    /// Nothing cached.
    Miss,
}

/// A cache-aside layer over the remote store.
///
/// Given a key, a serde-decodable payload type, and a fallback fetch closure
/// against the system of record, each query strategy returns the freshest
/// acceptable value while shielding the system of record from repeated
/// misses and rebuild contention:
///
/// - [`get_with_pass_through`](Self::get_with_pass_through) guards against
///   cache penetration by negative-caching confirmed-absent records.
/// - [`get_with_mutex`](Self::get_with_mutex) additionally serializes
///   rebuilds of one key behind a store-side advisory lock with bounded,
///   doubling backoff.
/// - [`get_with_logical_expire`](Self::get_with_logical_expire) never
///   blocks readers: pre-warmed entries carry a logical expiry, stale reads
///   return immediately, and a single background rebuild per key refreshes
///   the entry on a bounded worker pool.
///
/// "Not found" is a first-class result: all strategies return `Ok(None)` for
/// it, and an `Err` always means infrastructure failed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use turnstile_cache::CacheAside;
/// use turnstile_store::MemoryStore;
/// # futures::executor::block_on(async {
///
/// let cache = CacheAside::builder(MemoryStore::new()).build();
///
/// let value = cache
///     .get_with_pass_through("cache:shop:", &1_u64, Duration::from_secs(600), || async {
///         // Stands in for a system-of-record query.
///         Ok::<_, std::io::Error>(Some("espresso bar".to_string()))
///     })
///     .await?;
/// assert_eq!(value.as_deref(), Some("espresso bar"));
/// # Ok::<(), turnstile_cache::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct CacheAside<S> {
    store: S,
    null_ttl: Duration,
    mutex_ttl: Duration,
    mutex_retries: u32,
    mutex_backoff: Duration,
    rebuild: RebuildPool,
}

impl<S> CacheAside<S>
where
    S: RemoteStore + Clone + 'static,
{
    /// Creates a builder for a cache-aside layer over `store`.
    #[must_use]
    pub fn builder(store: S) -> CacheAsideBuilder<S> {
        CacheAsideBuilder::new(store)
    }

    /// Serializes `value` and stores it under `key` with a physical TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store is
    /// unreachable.
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value).map_err(Error::codec)?;
        self.store.put(key, &json, Some(ttl)).await?;
        Ok(())
    }

    /// Stores `value` under `key` wrapped in a logical-expiry envelope.
    ///
    /// This is the pre-warm operation for the logical-expiration strategy:
    /// the entry gets no physical TTL, only the embedded `expire_at`
    /// timestamp `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store is
    /// unreachable.
    pub async fn put_with_logical_expiry<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize,
    {
        let envelope = Envelope::new(value, ttl);
        let json = serde_json::to_string(&envelope).map_err(Error::codec)?;
        self.store.put(key, &json, None).await?;
        Ok(())
    }

    /// Removes the entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Queries with the pass-through strategy (penetration guard only).
    ///
    /// On a cache hit the decoded payload is returned; on a negative-cache
    /// hit `Ok(None)` is returned without touching the system of record. On
    /// a miss, `fetch` runs: an absent record writes the empty-marker with
    /// the configured short TTL (so repeated lookups of nonexistent keys
    /// stop reaching the system of record), a present one is cached with
    /// `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable, the payload cannot be
    /// decoded, or `fetch` itself fails.
    pub async fn get_with_pass_through<T, I, F, Fut, E>(
        &self,
        prefix: &str,
        id: &I,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        I: Display + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let key = format!("{prefix}{id}");
        match self.read_cached::<T>(&key).await? {
            CachedState::Value(value) => Ok(Some(value)),
            CachedState::Absent => Ok(None),
            CachedState::Miss => self.fetch_and_fill(&key, ttl, fetch).await,
        }
    }

    /// Queries with the mutex strategy (stampede guard).
    ///
    /// Hit handling matches
    /// [`get_with_pass_through`](Self::get_with_pass_through). On a miss,
    /// the caller races for a short-lived advisory lock under
    /// `<lock_prefix><id>`: the winner re-checks the cache (another instance
    /// may have already rebuilt), then fetches and fills, releasing the lock
    /// on every exit path. Losers retry with doubling backoff - three
    /// attempts at 50/100/200ms by default - and then give up with
    /// `Ok(None)`.
    ///
    /// That final `Ok(None)` is a *transient* outcome, not ground truth:
    /// the record may well exist and simply still be rebuilding. Callers in
    /// strict-consistency contexts must not negative-cache or otherwise
    /// treat it as confirmed absence.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable, the payload cannot be
    /// decoded, or `fetch` itself fails. Lock contention is never an error.
    pub async fn get_with_mutex<T, I, F, Fut, E>(
        &self,
        prefix: &str,
        lock_prefix: &str,
        id: &I,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        I: Display + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let key = format!("{prefix}{id}");
        match self.read_cached::<T>(&key).await? {
            CachedState::Value(value) => return Ok(Some(value)),
            CachedState::Absent => return Ok(None),
            CachedState::Miss => {}
        }

        let lock_key = format!("{lock_prefix}{id}");
        let mut backoff = self.mutex_backoff;
        let mut acquired = false;
        for attempt in 1..=self.mutex_retries {
            if self
                .store
                .put_if_absent(&lock_key, ADVISORY_HOLDER, Some(self.mutex_ttl))
                .await?
            {
                acquired = true;
                break;
            }
            tracing::debug!(key = %key, attempt, "rebuild lock busy; backing off");
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
        if !acquired {
            tracing::debug!(key = %key, "rebuild lock still busy after bounded retries; reporting transient miss");
            return Ok(None);
        }

        let outcome = self.load_under_lock(&key, ttl, fetch).await;
        self.release_advisory(&lock_key).await;
        outcome
    }

    /// Queries with the logical-expiration strategy (bounded staleness,
    /// non-blocking reads).
    ///
    /// A miss returns `Ok(None)` immediately: this strategy assumes keys
    /// were pre-warmed with
    /// [`put_with_logical_expiry`](Self::put_with_logical_expiry). A fresh
    /// hit returns the payload. An expired hit returns the *stale* payload
    /// right away and, if the per-key rebuild lock is free, schedules one
    /// asynchronous rebuild on the bounded worker pool; the rebuild fetches,
    /// re-wraps with a new expiry, writes back, and releases the lock no
    /// matter how the fetch went. While the lock is held, further readers
    /// keep serving stale data without scheduling anything, so at most one
    /// rebuild per key is in flight and convergence to freshness is
    /// eventual.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the envelope cannot
    /// be decoded. Rebuild failures are logged, not surfaced.
    pub async fn get_with_logical_expire<T, I, F, Fut, E>(
        &self,
        prefix: &str,
        lock_prefix: &str,
        id: &I,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        I: Display + ?Sized,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let key = format!("{prefix}{id}");
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let envelope: Envelope<T> = decode(&raw)?;
        let now = Utc::now().timestamp();
        if !envelope.is_expired(now) {
            return Ok(Some(envelope.data));
        }

        let lock_key = format!("{lock_prefix}{id}");
        if self
            .store
            .put_if_absent(&lock_key, ADVISORY_HOLDER, Some(self.mutex_ttl))
            .await?
        {
            // Double-check: the previous holder may have finished its
            // rebuild between our stale read and winning the lock.
            match self.reread_fresh::<T>(&key, now).await {
                Ok(Some(fresh)) => {
                    self.release_advisory(&lock_key).await;
                    return Ok(Some(fresh));
                }
                Ok(None) => self.schedule_rebuild(key, lock_key, ttl, fetch),
                Err(error) => {
                    self.release_advisory(&lock_key).await;
                    return Err(error);
                }
            }
        }

        Ok(Some(envelope.data))
    }

    /// Re-reads `key` and returns its payload only if it is now fresh.
    async fn reread_fresh<T>(&self, key: &str, now: i64) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.get(key).await? {
            Some(raw) if !raw.is_empty() => {
                let envelope: Envelope<T> = decode(&raw)?;
                Ok((!envelope.is_expired(now)).then_some(envelope.data))
            }
            _ => Ok(None),
        }
    }

    fn schedule_rebuild<T, F, Fut, E>(&self, key: String, lock_key: String, ttl: Duration, fetch: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let store = self.store.clone();
        self.rebuild.spawn(async move {
            match fetch().await {
                Ok(Some(value)) => {
                    let envelope = Envelope::new(value, ttl);
                    match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            if let Err(error) = store.put(&key, &json, None).await {
                                tracing::warn!(key = %key, %error, "background rebuild could not write back");
                            }
                        }
                        Err(error) => {
                            tracing::warn!(key = %key, %error, "background rebuild produced an unencodable payload");
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!(key = %key, "record absent during background rebuild; stale envelope left in place");
                }
                Err(error) => {
                    tracing::warn!(key = %key, %error, "background rebuild fetch failed");
                }
            }
            if let Err(error) = store.delete(&lock_key).await {
                tracing::warn!(key = %lock_key, %error, "failed to release rebuild lock; it will lapse with its TTL");
            }
        });
    }

    /// Rebuilds a key while holding its advisory lock.
    async fn load_under_lock<T, F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.read_cached::<T>(key).await? {
            CachedState::Value(value) => Ok(Some(value)),
            CachedState::Absent => Ok(None),
            CachedState::Miss => self.fetch_and_fill(key, ttl, fetch).await,
        }
    }

    async fn fetch_and_fill<T, F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Option<T>>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match fetch().await.map_err(Error::fetch)? {
            Some(value) => {
                self.put(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store.put(key, EMPTY_MARKER, Some(self.null_ttl)).await?;
                Ok(None)
            }
        }
    }

    async fn read_cached<T>(&self, key: &str) -> Result<CachedState<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.get(key).await? {
            Some(raw) if raw.is_empty() => Ok(CachedState::Absent),
            Some(raw) => Ok(CachedState::Value(decode(&raw)?)),
            None => Ok(CachedState::Miss),
        }
    }

    async fn release_advisory(&self, lock_key: &str) {
        if let Err(error) = self.store.delete(lock_key).await {
            tracing::warn!(key = %lock_key, %error, "failed to release rebuild lock; it will lapse with its TTL");
        }
    }
}

fn decode<T>(raw: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(raw).map_err(Error::codec)
}

/// Builder for a [`CacheAside`] layer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use turnstile_cache::CacheAside;
/// use turnstile_store::MemoryStore;
///
/// let cache = CacheAside::builder(MemoryStore::new())
///     .null_ttl(Duration::from_secs(60))
///     .mutex_backoff(Duration::from_millis(25))
///     .rebuild_workers(4)
///     .build();
/// ```
#[derive(Debug)]
pub struct CacheAsideBuilder<S> {
    store: S,
    null_ttl: Duration,
    mutex_ttl: Duration,
    mutex_retries: u32,
    mutex_backoff: Duration,
    rebuild_workers: usize,
}

impl<S> CacheAsideBuilder<S>
where
    S: RemoteStore + Clone + 'static,
{
    fn new(store: S) -> Self {
        Self {
            store,
            null_ttl: DEFAULT_NULL_TTL,
            mutex_ttl: DEFAULT_MUTEX_TTL,
            mutex_retries: DEFAULT_MUTEX_RETRIES,
            mutex_backoff: DEFAULT_MUTEX_BACKOFF,
            rebuild_workers: DEFAULT_REBUILD_WORKERS,
        }
    }

    /// Sets the TTL of negative-cache (empty-marker) entries.
    #[must_use]
    pub fn null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Sets the lease of the advisory rebuild locks.
    #[must_use]
    pub fn mutex_ttl(mut self, ttl: Duration) -> Self {
        self.mutex_ttl = ttl;
        self
    }

    /// Sets how many times the mutex strategy attempts to take the rebuild
    /// lock before degrading to a transient miss.
    #[must_use]
    pub fn mutex_retries(mut self, retries: u32) -> Self {
        self.mutex_retries = retries;
        self
    }

    /// Sets the initial backoff between lock attempts; it doubles on every
    /// further attempt.
    #[must_use]
    pub fn mutex_backoff(mut self, backoff: Duration) -> Self {
        self.mutex_backoff = backoff;
        self
    }

    /// Sets the size of the background rebuild pool used by the
    /// logical-expiration strategy.
    #[must_use]
    pub fn rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    /// Builds the cache-aside layer.
    #[must_use]
    pub fn build(self) -> CacheAside<S> {
        CacheAside {
            store: self.store,
            null_ttl: self.null_ttl,
            mutex_ttl: self.mutex_ttl,
            mutex_retries: self.mutex_retries,
            mutex_backoff: self.mutex_backoff,
            rebuild: RebuildPool::new(self.rebuild_workers),
        }
    }
}
