// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed mutual exclusion leased from the remote store.
//!
//! [`LeaseLock`] provides single-attempt, non-blocking mutual exclusion
//! across process instances. Acquisition is an atomic set-if-absent with a
//! TTL, so a crashed holder can never wedge the resource: the lease simply
//! lapses. Release is token-protected - each lock instance carries a unique
//! holder token, and release deletes the store entry only if it still holds
//! that token. A holder whose lease expired (and whose resource was
//! reacquired by someone else) therefore cannot delete the new holder's
//! lock.
//!
//! There is deliberately no blocking or waiting variant: every call site in
//! the engine uses a single attempt and treats a busy lock as "someone else
//! is already doing this work".
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use turnstile_lock::LeaseLock;
//! use turnstile_store::MemoryStore;
//! # futures::executor::block_on(async {
//!
//! let store = MemoryStore::new();
//! let lock = LeaseLock::new(store.clone(), "order:42");
//!
//! assert!(lock.try_acquire(Duration::from_secs(10)).await?);
//! // A second holder is shut out until the first releases or the lease lapses.
//! let rival = LeaseLock::new(store, "order:42");
//! assert!(!rival.try_acquire(Duration::from_secs(10)).await?);
//!
//! assert!(lock.release().await?);
//! # Ok::<(), turnstile_lock::Error>(())
//! # });
//! ```

use std::time::Duration;

use turnstile_store::RemoteStore;
use uuid::Uuid;

/// Namespace prefix for all lock keys in the remote store.
const LOCK_PREFIX: &str = "lock:";

/// An error from a lock operation.
///
/// Lock errors are always infrastructure errors from the underlying store;
/// contention is not an error but a `false` return from
/// [`LeaseLock::try_acquire`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] turnstile_store::Error);

/// A specialized [`Result`] type for lock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A leased, token-protected distributed lock over one resource.
///
/// Each instance generates its own holder token at construction; two
/// instances for the same resource are two distinct prospective holders.
#[derive(Clone, Debug)]
pub struct LeaseLock<S> {
    store: S,
    key: String,
    token: String,
}

impl<S> LeaseLock<S>
where
    S: RemoteStore,
{
    /// Creates a new prospective holder for `resource`.
    ///
    /// The store key is `lock:<resource>`; the holder token is a fresh UUID.
    #[must_use]
    pub fn new(store: S, resource: &str) -> Self {
        Self {
            store,
            key: format!("{LOCK_PREFIX}{resource}"),
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Returns the store key guarding the resource.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempts to take the lock for `lease`, without blocking.
    ///
    /// Returns `true` iff this call created the lock entry. The lease starts
    /// immediately; work protected by the lock must finish (and release)
    /// before it lapses, or the protection silently ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable. Contention is reported
    /// as `Ok(false)`, never as an error.
    pub async fn try_acquire(&self, lease: Duration) -> Result<bool> {
        let acquired = self.store.put_if_absent(&self.key, &self.token, Some(lease)).await?;
        Ok(acquired)
    }

    /// Releases the lock if this holder still owns it.
    ///
    /// The check and the delete run as one atomic step at the store. Returns
    /// `false` when the entry no longer holds this instance's token - the
    /// lease lapsed and possibly someone else now holds the resource - in
    /// which case nothing is deleted and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn release(&self) -> Result<bool> {
        let released = self.store.delete_if_equals(&self.key, &self.token).await?;
        if !released {
            tracing::warn!(key = %self.key, "lease lapsed before release; lock left untouched");
        }
        Ok(released)
    }
}
