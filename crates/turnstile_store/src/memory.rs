// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Process-local reference backend.
//!
//! [`MemoryStore`] keeps the entire store state behind one mutex, which
//! trivially gives every operation the same atomicity a Redis script gets
//! from the server's single-threaded execution. That makes it a faithful
//! stand-in for the real store in tests, and a usable backend for
//! single-process deployments.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{AdmitCode, RemoteStore, Result, SaleStore};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct Ticket {
    stock: u32,
    begin: i64,
    end: i64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tickets: HashMap<u64, Ticket>,
    buyers: HashMap<u64, HashSet<u64>>,
}

impl Inner {
    /// Returns the live entry for `key`, dropping it first if its TTL lapsed.
    fn live_entry(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }
}

/// An in-memory store with the atomicity guarantees of the remote store.
///
/// Cloning is cheap and clones share state, the way two connections to the
/// same server would. Expired entries are dropped lazily on access.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use turnstile_store::{MemoryStore, RemoteStore};
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::new();
/// assert!(store.put_if_absent("lock:shop:1", "1", Some(Duration::from_secs(10))).await?);
/// assert!(!store.put_if_absent("lock:shop:1", "1", Some(Duration::from_secs(10))).await?);
/// # Ok::<(), turnstile_store::Error>(())
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stock remaining in the ledger for a staged voucher.
    ///
    /// Returns `None` if the voucher was never staged. Intended for
    /// inspection in tests and diagnostics.
    #[must_use]
    pub fn remaining_stock(&self, voucher_id: u64) -> Option<u32> {
        self.inner.lock().tickets.get(&voucher_id).map(|ticket| ticket.stock)
    }
}

impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        Ok(inner.live_entry(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.live_entry(key).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().entries.remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.live_entry(key).is_some_and(|entry| entry.value == expected) {
            inner.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.lock();
        let current = match inner.live_entry(key) {
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map_err(crate::Error::from_source)?,
            None => 0,
        };
        let next = current + 1;
        // INCR preserves an existing expiry.
        let expires_at = inner.entries.get(key).and_then(|entry| entry.expires_at);
        inner.entries.insert(
            key.to_owned(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}

impl SaleStore for MemoryStore {
    async fn stage_sale(&self, voucher_id: u64, stock: u32, begin: i64, end: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tickets.insert(voucher_id, Ticket { stock, begin, end });
        inner.buyers.remove(&voucher_id);
        Ok(())
    }

    async fn admit(&self, voucher_id: u64, user_id: u64, now: i64) -> Result<AdmitCode> {
        let mut inner = self.inner.lock();
        let Some(ticket) = inner.tickets.get(&voucher_id) else {
            return Ok(AdmitCode::Closed);
        };
        if now < ticket.begin || now >= ticket.end {
            return Ok(AdmitCode::Closed);
        }
        if ticket.stock == 0 {
            return Ok(AdmitCode::SoldOut);
        }
        if inner.buyers.get(&voucher_id).is_some_and(|set| set.contains(&user_id)) {
            return Ok(AdmitCode::Duplicate);
        }
        if let Some(ticket) = inner.tickets.get_mut(&voucher_id) {
            ticket.stock -= 1;
        }
        inner.buyers.entry(voucher_id).or_default().insert(user_id);
        Ok(AdmitCode::Admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_what_put_stored() {
        let store = MemoryStore::new();
        store.put("k", "v", None).await.expect("put");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn empty_string_is_a_stored_value_not_absence() {
        let store = MemoryStore::new();
        store.put("k", "", None).await.expect("put");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .put("k", "v", Some(Duration::from_millis(20)))
            .await
            .expect("put");
        assert!(store.get("k").await.expect("get").is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn put_if_absent_respects_expired_entries() {
        let store = MemoryStore::new();
        assert!(
            store
                .put_if_absent("k", "a", Some(Duration::from_millis(20)))
                .await
                .expect("first")
        );
        assert!(!store.put_if_absent("k", "b", None).await.expect("held"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.put_if_absent("k", "b", None).await.expect("lapsed"));
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn delete_if_equals_only_matches_exact_value() {
        let store = MemoryStore::new();
        store.put("k", "token-a", None).await.expect("put");
        assert!(!store.delete_if_equals("k", "token-b").await.expect("mismatch"));
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("token-a"));
        assert!(store.delete_if_equals("k", "token-a").await.expect("match"));
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn increment_counts_from_zero_and_is_sequential() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("n").await.expect("first"), 1);
        assert_eq!(store.increment("n").await.expect("second"), 2);
        assert_eq!(store.get("n").await.expect("get").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn increment_rejects_non_numeric_values() {
        let store = MemoryStore::new();
        store.put("n", "not-a-number", None).await.expect("put");
        store.increment("n").await.expect_err("non-numeric");
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("k", "v", None).await.expect("put");
        assert_eq!(other.get("k").await.expect("get").as_deref(), Some("v"));
    }
}
