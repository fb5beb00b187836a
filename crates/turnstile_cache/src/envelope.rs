// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The logical-expiration envelope.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wraps a cached payload with a logical expiry timestamp.
///
/// The envelope is stored with no physical TTL: the store never evicts it on
/// its own, so readers always find *something* for a pre-warmed key. Whether
/// that something is fresh is decided by comparing [`Envelope::expire_at`]
/// against the current time, and a stale envelope stays serveable while a
/// background rebuild replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Epoch second at which the payload stops being fresh.
    pub expire_at: i64,
    /// The wrapped payload.
    pub data: T,
}

impl<T> Envelope<T> {
    /// Wraps `data` as fresh for the next `ttl`.
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            expire_at: Utc::now().timestamp() + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            data,
        }
    }

    /// Returns `true` once `now` (epoch seconds) has reached the expiry.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at <= now
    }
}
