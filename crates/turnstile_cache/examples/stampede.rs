// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Twenty concurrent readers miss the same cold key; the mutex strategy
//! lets exactly one of them reach the (slow) system of record. Readers that
//! exhaust their lock retries report a transient miss rather than piling
//! onto the backend - rerun the query and it hits the rebuilt cache.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use turnstile_cache::CacheAside;
use turnstile_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), turnstile_cache::Error> {
    let cache = Arc::new(CacheAside::builder(MemoryStore::new()).build());
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut readers = Vec::new();
    for _ in 0..20 {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        readers.push(tokio::spawn(async move {
            cache
                .get_with_mutex("cache:shop:", "lock:shop:", &1, Duration::from_secs(600), move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    // A slow system-of-record query.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, std::io::Error>(Some("espresso bar".to_string()))
                })
                .await
        }));
    }

    let mut hits = 0;
    let mut transient_misses = 0;
    for reader in readers {
        match reader.await.expect("reader task")? {
            Some(_) => hits += 1,
            None => transient_misses += 1,
        }
    }

    println!(
        "20 readers -> {hits} served, {transient_misses} transient misses, {} backend fetch(es)",
        fetches.load(Ordering::SeqCst)
    );

    // The key is warm now: everyone hits, nobody fetches.
    let warm = cache
        .get_with_mutex("cache:shop:", "lock:shop:", &1, Duration::from_secs(600), || async {
            Ok::<Option<String>, std::io::Error>(None)
        })
        .await?;
    assert_eq!(warm.as_deref(), Some("espresso bar"));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    Ok(())
}
