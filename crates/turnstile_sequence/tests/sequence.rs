// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Uniqueness of minted identifiers under concurrent fan-out.

use std::collections::HashSet;

use turnstile_sequence::SequenceGenerator;
use turnstile_store::MemoryStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_minting_never_collides() {
    let sequence = SequenceGenerator::new(MemoryStore::new());

    let mut minters = Vec::new();
    for _ in 0..10 {
        let sequence = sequence.clone();
        minters.push(tokio::spawn(async move {
            let mut ids = Vec::with_capacity(100);
            for _ in 0..100 {
                ids.push(sequence.next_id("order").await.expect("mint"));
            }
            ids
        }));
    }

    let mut seen = HashSet::new();
    for minter in minters {
        for id in minter.await.expect("join") {
            assert!(id > 0, "identifiers stay in the positive 63-bit range");
            assert!(seen.insert(id), "duplicate identifier {id}");
        }
    }
    assert_eq!(seen.len(), 1_000);
}

#[tokio::test]
async fn counters_are_dense_within_a_prefix() {
    let sequence = SequenceGenerator::new(MemoryStore::new());

    let mut counters: Vec<i64> = Vec::new();
    for _ in 0..50 {
        let id = sequence.next_id("order").await.expect("mint");
        counters.push(id & 0xFFFF_FFFF);
    }

    let expected: Vec<i64> = (1..=50).collect();
    assert_eq!(counters, expected);
}
