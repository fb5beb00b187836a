// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Order records and the in-process task handed to the order worker.

/// A voucher order, as handed to the system of record.
///
/// At most one order exists per `(voucher_id, user_id)` pair; the admission
/// script guarantees it optimistically and the order worker re-checks it
/// before persisting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    /// Time-ordered identifier minted by the sequence generator.
    pub id: i64,
    /// The voucher this order redeems.
    pub voucher_id: u64,
    /// The buyer.
    pub user_id: u64,
    /// Creation time, epoch seconds.
    pub created_at: i64,
}

/// An admitted purchase awaiting persistence.
///
/// Created by the coordinator after a successful admission, consumed by the
/// order worker. Once the worker finishes with it - persisted or dropped
/// for a logged reason - the task ceases to exist; there is no redelivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTask {
    /// The order id already promised to the caller.
    pub order_id: i64,
    /// The voucher being bought.
    pub voucher_id: u64,
    /// The admitted buyer.
    pub user_id: u64,
    /// When the coordinator enqueued the task, epoch seconds.
    pub enqueued_at: i64,
}
