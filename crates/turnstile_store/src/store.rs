// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core traits for remote store backends.
//!
//! [`RemoteStore`] defines the key/value and atomic-counter surface shared by
//! the cache, lock, and sequence components. [`SaleStore`] defines the
//! flash-sale ledger operations, whose admission step must execute as one
//! atomic unit at the store. Backends implement both.

use std::time::Duration;

use crate::{Error, Result};

/// Outcome of the atomic admission operation, as encoded on the wire.
///
/// The store serializes all concurrent admission attempts for the same
/// voucher, so these outcomes are authoritative: at most `stock` callers ever
/// observe [`AdmitCode::Admitted`], and a given `(voucher, user)` pair
/// observes it at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitCode {
    /// Stock was decremented and the purchase marker recorded for the caller.
    Admitted,
    /// No stock remains.
    SoldOut,
    /// The caller already holds a purchase marker for this voucher.
    Duplicate,
    /// The sale window has not opened yet, has already ended, or the sale
    /// was never staged.
    Closed,
}

impl AdmitCode {
    /// Decodes the integer reply of the admission script.
    ///
    /// # Errors
    ///
    /// Returns an error for any value outside the defined `0..=3` range,
    /// which indicates a store-side script mismatch.
    pub fn from_wire(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Admitted),
            1 => Ok(Self::SoldOut),
            2 => Ok(Self::Duplicate),
            3 => Ok(Self::Closed),
            other => Err(Error::from_message(format!(
                "admission script returned unknown status {other}"
            ))),
        }
    }

    /// Encodes this outcome as the admission script's integer reply.
    #[must_use]
    pub fn as_wire(self) -> i64 {
        match self {
            Self::Admitted => 0,
            Self::SoldOut => 1,
            Self::Duplicate => 2,
            Self::Closed => 3,
        }
    }
}

/// Trait for remote key/value store backends.
///
/// All values are strings; callers serialize structured payloads themselves.
/// Absence is modeled as `Ok(None)` - an `Err` always means the store itself
/// failed, and implementations must never translate infrastructure failures
/// into absence.
///
/// The three non-plain operations (`put_if_absent`, `delete_if_equals`,
/// `increment`) must be atomic with respect to all other clients of the
/// store; they are the foundation of the advisory cache locks, the
/// distributed lease lock, and the sequence generator.
pub trait RemoteStore: Send + Sync {
    /// Gets the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// With `ttl` set, the entry expires after the given duration; without,
    /// it persists until deleted or replaced.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> impl Future<Output = Result<()>> + Send;

    /// Stores `value` under `key` only if the key does not currently exist.
    ///
    /// Returns `true` iff this call created the entry.
    fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes the value stored under `key`, if any.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Deletes `key` only if its current value equals `expected`, as one
    /// atomic step.
    ///
    /// Returns `true` iff the entry was deleted.
    fn delete_if_equals(&self, key: &str, expected: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically increments the counter stored under `key` and returns the
    /// new value. A missing key counts from zero.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;
}

/// Trait for the flash-sale ledger kept in the remote store.
///
/// The ledger mirrors the system of record's stock for one high-write
/// hotspot so that admission can be decided in a single store round trip,
/// without touching the slow system of record at all.
pub trait SaleStore: Send + Sync {
    /// Stages a sale: records the voucher's stock and `[begin, end)` window
    /// (epoch seconds) and clears any previous buyer markers.
    ///
    /// Re-staging a voucher resets its ledger.
    fn stage_sale(
        &self,
        voucher_id: u64,
        stock: u32,
        begin: i64,
        end: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Runs the atomic admission step for one `(voucher, user)` attempt.
    ///
    /// In a single atomic unit the store checks, in order:
    ///
    /// 1. `now` lies inside the staged sale window (else [`AdmitCode::Closed`]),
    /// 2. remaining stock is positive (else [`AdmitCode::SoldOut`]),
    /// 3. the user holds no purchase marker (else [`AdmitCode::Duplicate`]),
    ///
    /// and only if all three hold decrements the stock and records the
    /// marker, returning [`AdmitCode::Admitted`]. Stock never goes negative.
    fn admit(&self, voucher_id: u64, user_id: u64, now: i64) -> impl Future<Output = Result<AdmitCode>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip() {
        for code in [
            AdmitCode::Admitted,
            AdmitCode::SoldOut,
            AdmitCode::Duplicate,
            AdmitCode::Closed,
        ] {
            assert_eq!(AdmitCode::from_wire(code.as_wire()).expect("defined code"), code);
        }
    }

    #[test]
    fn unknown_wire_code_is_rejected() {
        AdmitCode::from_wire(4).expect_err("4 is not a defined status");
        AdmitCode::from_wire(-1).expect_err("-1 is not a defined status");
    }
}
