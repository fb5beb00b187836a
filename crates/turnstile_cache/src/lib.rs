// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache-aside engine with three interchangeable anti-stampede strategies.
//!
//! This crate shields a slow system of record from cache penetration and
//! cache breakdown. [`CacheAside`] layers over any
//! [`RemoteStore`](turnstile_store::RemoteStore) and offers, per query, a
//! choice of strategy:
//!
//! | strategy                                             | misses           | hot-key expiry                      |
//! |------------------------------------------------------|------------------|-------------------------------------|
//! | [`get_with_pass_through`](CacheAside::get_with_pass_through) | fetch + negative-cache | every caller rebuilds        |
//! | [`get_with_mutex`](CacheAside::get_with_mutex)       | fetch + negative-cache | one rebuilder, others back off |
//! | [`get_with_logical_expire`](CacheAside::get_with_logical_expire) | `None` (pre-warmed keys) | stale reads + one async rebuild |
//!
//! All three treat "not found" as a first-class `Ok(None)` result, distinct
//! from infrastructure errors, which always propagate as `Err`.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use turnstile_cache::CacheAside;
//! use turnstile_store::MemoryStore;
//! # futures::executor::block_on(async {
//!
//! let cache = CacheAside::builder(MemoryStore::new()).build();
//!
//! // First query misses and consults the system of record...
//! let hit = cache
//!     .get_with_pass_through("cache:shop:", &7_u64, Duration::from_secs(600), || async {
//!         Ok::<_, std::io::Error>(Some("roastery".to_string()))
//!     })
//!     .await?;
//! assert_eq!(hit.as_deref(), Some("roastery"));
//!
//! // ...the second is served from the cache: the fetch (which would now
//! // report absence) is never consulted.
//! let cached = cache
//!     .get_with_pass_through("cache:shop:", &7_u64, Duration::from_secs(600), || async {
//!         Ok::<Option<String>, std::io::Error>(None)
//!     })
//!     .await?;
//! assert_eq!(cached.as_deref(), Some("roastery"));
//! # Ok::<(), turnstile_cache::Error>(())
//! # });
//! ```

mod engine;
mod envelope;
mod error;
mod rebuild;

pub use engine::{CacheAside, CacheAsideBuilder};
pub use envelope::Envelope;
pub use error::{Error, Result};
