// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The order worker: a single serialized consumer of admitted purchases.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use turnstile_lock::LeaseLock;
use turnstile_store::RemoteStore;

use crate::{Order, OrderTask, SystemOfRecord};

/// Drains the order queue strictly FIFO until the queue closes or shutdown
/// is signaled, then keeps draining already-queued tasks up to the grace
/// period.
pub(crate) async fn run<S, R>(
    mut queue: mpsc::Receiver<OrderTask>,
    mut stop: watch::Receiver<bool>,
    store: S,
    records: R,
    lock_lease: Duration,
    drain_grace: Duration,
) where
    S: RemoteStore + Clone,
    R: SystemOfRecord,
{
    tracing::debug!("order worker started");
    loop {
        tokio::select! {
            task = queue.recv() => match task {
                Some(task) => handle_task(&store, &records, lock_lease, task).await,
                None => {
                    tracing::debug!("order queue closed; worker stopping");
                    return;
                }
            },
            changed = stop.changed() => {
                // A closed channel means the service handle is gone; treat
                // it like a shutdown signal.
                if changed.is_err() || *stop.borrow_and_update() {
                    break;
                }
            }
        }
    }

    let deadline = tokio::time::Instant::now() + drain_grace;
    loop {
        tokio::select! {
            task = queue.recv() => match task {
                Some(task) => handle_task(&store, &records, lock_lease, task).await,
                None => break,
            },
            () = tokio::time::sleep_until(deadline) => {
                let remaining = queue.len();
                if remaining > 0 {
                    tracing::warn!(remaining, "drain grace elapsed; dropping queued order tasks");
                }
                break;
            }
        }
    }
    tracing::debug!("order worker stopped");
}

/// Processes one admitted purchase.
///
/// The per-user lease lock is defense in depth for a future multi-consumer
/// deployment; with the single worker it can only be busy if a second
/// consumer runs against the same store. A busy lock drops the task with a
/// warning - there is no redelivery.
async fn handle_task<S, R>(store: &S, records: &R, lock_lease: Duration, task: OrderTask)
where
    S: RemoteStore + Clone,
    R: SystemOfRecord,
{
    let lock = LeaseLock::new(store.clone(), &format!("order:{}", task.user_id));
    match lock.try_acquire(lock_lease).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(
                order_id = task.order_id,
                user_id = task.user_id,
                "per-user order lock busy; dropping task"
            );
            return;
        }
        Err(error) => {
            tracing::warn!(
                order_id = task.order_id,
                user_id = task.user_id,
                %error,
                "could not acquire per-user order lock; dropping task"
            );
            return;
        }
    }

    if let Err(error) = persist(records, &task).await {
        tracing::warn!(
            order_id = task.order_id,
            voucher_id = task.voucher_id,
            user_id = task.user_id,
            %error,
            "order persistence failed; dropping task"
        );
    }

    if let Err(error) = lock.release().await {
        tracing::warn!(order_id = task.order_id, %error, "failed to release per-user order lock");
    }
}

/// Persists one order with the final safety re-checks.
async fn persist<R>(records: &R, task: &OrderTask) -> Result<(), R::Error>
where
    R: SystemOfRecord,
{
    // Idempotency guard against double delivery.
    if records.count_orders(task.voucher_id, task.user_id).await? > 0 {
        tracing::warn!(
            order_id = task.order_id,
            voucher_id = task.voucher_id,
            user_id = task.user_id,
            "order already persisted; skipping duplicate task"
        );
        return Ok(());
    }

    // Conditional decrement, guarded by stock > 0 at the system of record.
    if !records.decrement_stock(task.voucher_id).await? {
        tracing::warn!(
            order_id = task.order_id,
            voucher_id = task.voucher_id,
            "stock exhausted at the system of record; dropping admitted order"
        );
        return Ok(());
    }

    let order = Order {
        id: task.order_id,
        voucher_id: task.voucher_id,
        user_id: task.user_id,
        created_at: Utc::now().timestamp(),
    };
    if !records.insert_order(&order).await? {
        tracing::warn!(order_id = order.id, "system of record refused the order insert");
    }
    Ok(())
}
