// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The system-of-record collaborator interface.

use crate::Order;

/// The slow, durable system of record behind the flash-sale pipeline.
///
/// The engine only consumes this interface; persistence itself (ORM, SQL,
/// whatever) lives with the implementor. All three operations are invoked by
/// the order worker, which is a single serialized consumer - implementations
/// need to be correct under concurrent calls only if they are shared with
/// other writers.
pub trait SystemOfRecord: Send + Sync {
    /// The implementor's error type. Failures are logged by the worker and
    /// the affected task is dropped; they are never retried.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Counts existing orders for a `(voucher, user)` pair.
    ///
    /// This is the worker's idempotency guard: anything above zero means the
    /// purchase was already persisted and the task is a duplicate delivery.
    fn count_orders(&self, voucher_id: u64, user_id: u64) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Decrements the voucher's stock, guarded by `stock > 0`.
    ///
    /// Returns `true` iff a row was updated. This is defense in depth behind
    /// the store-side decrement: the conditional update can never push stock
    /// negative even if the optimistic ledger somehow oversold.
    fn decrement_stock(&self, voucher_id: u64) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Persists an order. Returns `true` iff the order was inserted.
    fn insert_order(&self, order: &Order) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}
