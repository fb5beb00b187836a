// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Logical-expiration strategy: stale reads, single background rebuild,
//! eventual convergence.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use turnstile_cache::CacheAside;
use turnstile_store::{MemoryStore, RemoteStore};

const TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Shop {
    name: String,
}

async fn query(cache: &CacheAside<MemoryStore>, name: &'static str) -> Option<Shop> {
    cache
        .get_with_logical_expire("cache:shop:", "lock:shop:", &1, TTL, move || async move {
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: name.into() }))
        })
        .await
        .expect("query")
}

#[tokio::test]
async fn miss_returns_none_without_fetching() {
    let cache = CacheAside::builder(MemoryStore::new()).build();
    let consulted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&consulted);
    let result: Option<Shop> = cache
        .get_with_logical_expire("cache:shop:", "lock:shop:", &1, TTL, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "cold".into() }))
        })
        .await
        .expect("query");

    assert!(result.is_none(), "unwarmed keys report not-found");
    assert_eq!(consulted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_hit_returns_payload_without_rebuilding() {
    let cache = CacheAside::builder(MemoryStore::new()).build();
    cache
        .put_with_logical_expiry("cache:shop:1", &Shop { name: "warm".into() }, TTL)
        .await
        .expect("pre-warm");

    let result = query(&cache, "should-not-be-fetched").await;
    assert_eq!(result.map(|shop| shop.name).as_deref(), Some("warm"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_hit_serves_stale_then_converges() {
    let store = MemoryStore::new();
    let cache = CacheAside::builder(store).build();
    cache
        .put_with_logical_expiry("cache:shop:1", &Shop { name: "stale".into() }, Duration::ZERO)
        .await
        .expect("pre-warm expired");

    // The expired read is served immediately with the old payload.
    let first = query(&cache, "fresh").await;
    assert_eq!(first.map(|shop| shop.name).as_deref(), Some("stale"));

    // The background rebuild converges the key to the fetched value.
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if query(&cache, "fresh").await.map(|shop| shop.name).as_deref() == Some("fresh") {
            return;
        }
    }
    panic!("key never converged to the rebuilt value");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_rebuild_is_in_flight_per_key() {
    let store = MemoryStore::new();
    let cache = CacheAside::builder(store).build();
    cache
        .put_with_logical_expiry("cache:shop:1", &Shop { name: "stale".into() }, Duration::ZERO)
        .await
        .expect("pre-warm expired");

    let started = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    // Every query hands in a fetch that blocks on the gate, so the first
    // scheduled rebuild stays in flight while further stale reads arrive.
    let slow_fetch = |started: Arc<AtomicUsize>, gate: Arc<Notify>| {
        move || async move {
            started.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            Ok::<Option<Shop>, std::io::Error>(Some(Shop { name: "fresh".into() }))
        }
    };

    for _ in 0..5 {
        let result = cache
            .get_with_logical_expire(
                "cache:shop:",
                "lock:shop:",
                &1,
                TTL,
                slow_fetch(Arc::clone(&started), Arc::clone(&gate)),
            )
            .await
            .expect("stale query");
        assert_eq!(
            result.map(|shop| shop.name).as_deref(),
            Some("stale"),
            "readers keep getting stale data while the rebuild runs"
        );
    }

    gate.notify_one();

    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if query(&cache, "fresh").await.map(|shop| shop.name).as_deref() == Some("fresh") {
            assert_eq!(
                started.load(Ordering::SeqCst),
                1,
                "exactly one rebuild may run for an expired key"
            );
            return;
        }
    }
    panic!("key never converged to the rebuilt value");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rebuild_releases_the_lock_and_keeps_stale_data() {
    let store = MemoryStore::new();
    let cache = CacheAside::builder(store.clone()).build();
    cache
        .put_with_logical_expiry("cache:shop:1", &Shop { name: "stale".into() }, Duration::ZERO)
        .await
        .expect("pre-warm expired");

    let first = cache
        .get_with_logical_expire("cache:shop:", "lock:shop:", &1, TTL, || async {
            Err::<Option<Shop>, _>(std::io::Error::other("system of record down"))
        })
        .await
        .expect("stale query");
    assert_eq!(first.map(|shop| shop.name).as_deref(), Some("stale"));

    // The failed rebuild must release its lock so a later read can retry.
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if store.get("lock:shop:1").await.expect("lock key").is_none() {
            // Stale data survived the failed rebuild, and the next stale
            // read schedules a fresh attempt that now succeeds.
            if query(&cache, "recovered").await.map(|shop| shop.name).as_deref() == Some("recovered") {
                return;
            }
        }
    }
    panic!("rebuild lock leaked or the key never recovered");
}
