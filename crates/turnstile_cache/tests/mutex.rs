// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mutex strategy: bounded backoff under contention, single rebuild.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use turnstile_cache::CacheAside;
use turnstile_store::{MemoryStore, RemoteStore};

const TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Shop {
    name: String,
}

/// Wraps a [`MemoryStore`] and counts lock-acquisition attempts.
#[derive(Clone, Debug, Default)]
struct CountingStore {
    inner: MemoryStore,
    lock_attempts: Arc<AtomicUsize>,
}

impl CountingStore {
    fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }
}

impl RemoteStore for CountingStore {
    async fn get(&self, key: &str) -> turnstile_store::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> turnstile_store::Result<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> turnstile_store::Result<bool> {
        if key.starts_with("lock:") {
            self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> turnstile_store::Result<()> {
        self.inner.delete(key).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> turnstile_store::Result<bool> {
        self.inner.delete_if_equals(key, expected).await
    }

    async fn increment(&self, key: &str) -> turnstile_store::Result<i64> {
        self.inner.increment(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn sustained_contention_degrades_to_miss_after_three_backoffs() {
    let store = CountingStore::default();
    // Another instance holds the rebuild lock for the whole test.
    store
        .inner
        .put("lock:shop:1", "1", None)
        .await
        .expect("seed foreign lock");

    let cache = CacheAside::builder(store.clone()).build();
    let fetches = AtomicUsize::new(0);

    let started = tokio::time::Instant::now();
    let result: Option<Shop> = cache
        .get_with_mutex("cache:shop:", "lock:shop:", &1, TTL, || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "never".into() }))
        })
        .await
        .expect("contention is not an error");
    let waited = started.elapsed();

    assert!(result.is_none(), "exhausted retries degrade to a transient miss");
    assert_eq!(store.lock_attempts(), 3, "exactly three acquisition attempts");
    assert_eq!(fetches.load(Ordering::SeqCst), 0, "the loser never fetches");
    // Backoffs of 50 + 100 + 200ms, measured in paused virtual time.
    assert!(waited >= Duration::from_millis(350), "waited only {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_rebuild_once() {
    let store = CountingStore::default();
    let cache = Arc::new(CacheAside::builder(store).build());
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut queries = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        queries.push(tokio::spawn(async move {
            cache
                .get_with_mutex("cache:shop:", "lock:shop:", &1, TTL, move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "roastery".into() }))
                })
                .await
                .expect("query")
        }));
    }

    for query in queries {
        let result = query.await.expect("join");
        assert_eq!(result.map(|shop| shop.name).as_deref(), Some("roastery"));
    }
    assert_eq!(
        fetches.load(Ordering::SeqCst),
        1,
        "only the lock winner may reach the system of record"
    );
}

#[tokio::test]
async fn lock_is_released_after_a_failed_fetch() {
    let store = MemoryStore::new();
    let cache = CacheAside::builder(store.clone()).build();

    let result: Result<Option<Shop>, _> = cache
        .get_with_mutex("cache:shop:", "lock:shop:", &1, TTL, || async {
            Err::<Option<Shop>, _>(std::io::Error::other("query exploded"))
        })
        .await;
    result.expect_err("fetch failure propagates");

    // The advisory lock must not leak; a follow-up query acquires it
    // immediately and succeeds.
    let recovered = cache
        .get_with_mutex("cache:shop:", "lock:shop:", &1, TTL, || async {
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "recovered".into() }))
        })
        .await
        .expect("second query");
    assert_eq!(recovered.map(|shop| shop.name).as_deref(), Some("recovered"));
    assert!(
        store.get("lock:shop:1").await.expect("lock key").is_none(),
        "advisory lock released on every exit path"
    );
}

#[tokio::test]
async fn empty_marker_short_circuits_before_any_locking() {
    let store = CountingStore::default();
    store.inner.put("cache:shop:1", "", Some(TTL)).await.expect("seed marker");
    let cache = CacheAside::builder(store.clone()).build();

    let result: Option<Shop> = cache
        .get_with_mutex("cache:shop:", "lock:shop:", &1, TTL, || async {
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "never".into() }))
        })
        .await
        .expect("query");

    assert!(result.is_none());
    assert_eq!(store.lock_attempts(), 0, "negative hit takes no lock");
}
