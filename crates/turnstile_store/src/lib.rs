// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Remote store abstraction for the turnstile admission-control engine.
//!
//! Every turnstile component talks to one shared remote store through the
//! traits in this crate: the cache-aside engine, the distributed lease lock,
//! the sequence generator, and the flash-sale admission path. The store is a
//! collaborator, not something this workspace reimplements - the traits only
//! pin down the handful of primitives the engine relies on:
//!
//! - [`RemoteStore`]: key/value access with TTLs plus the atomic primitives
//!   (set-if-absent, compare-and-delete, increment) the lock and sequence
//!   components are built on.
//! - [`SaleStore`]: the flash-sale ledger - staging a sale and the atomic
//!   admission step that checks the sale window, remaining stock, and
//!   duplicate purchases in a single serialized operation.
//!
//! The `memory` feature (enabled by default) provides [`MemoryStore`], a
//! process-local reference backend with the same atomicity guarantees. It
//! backs the test suites of the whole workspace. A Redis-backed production
//! implementation lives in the sibling `turnstile_store_redis` crate.
//!
//! # Examples
//!
//! ```
//! use turnstile_store::{MemoryStore, RemoteStore};
//! # futures::executor::block_on(async {
//!
//! let store = MemoryStore::new();
//! store.put("greeting", "hello", None).await?;
//! assert_eq!(store.get("greeting").await?.as_deref(), Some("hello"));
//! # Ok::<(), turnstile_store::Error>(())
//! # });
//! ```

mod error;
#[cfg(feature = "memory")]
mod memory;
mod store;

pub use error::{Error, Result};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use store::{AdmitCode, RemoteStore, SaleStore};
