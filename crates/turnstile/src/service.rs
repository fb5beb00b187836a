// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The flash-sale service: coordinator, queue, and worker lifecycle.

use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::JoinHandle,
};
use turnstile_sequence::SequenceGenerator;
use turnstile_store::{RemoteStore, SaleStore};

use crate::{Admission, OrderTask, Result, SystemOfRecord, worker};

const DEFAULT_QUEUE_CAPACITY: usize = 1 << 20;
const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(10);
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_ID_PREFIX: &str = "order";

/// The flash-sale admission service.
///
/// One instance owns the whole pipeline: the atomic admission step against
/// the remote store, the sequence generator minting order ids, the bounded
/// in-process task queue, and the single background worker that persists
/// admitted orders against the system of record.
///
/// Construction goes through [`FlashSale::builder`]; [`FlashSaleBuilder::start`]
/// spawns the worker and returns the running service. [`FlashSale::shutdown`]
/// stops it again, draining queued work within a grace period. Dropping the
/// service without a shutdown closes the queue, which also stops the worker
/// after it drains - but without the grace bound.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use turnstile::{FlashSale, Order, SystemOfRecord};
/// use turnstile_store::MemoryStore;
///
/// # #[derive(Clone, Default)]
/// # struct NoopRecords;
/// # impl SystemOfRecord for NoopRecords {
/// #     type Error = Infallible;
/// #     async fn count_orders(&self, _: u64, _: u64) -> Result<u64, Infallible> { Ok(0) }
/// #     async fn decrement_stock(&self, _: u64) -> Result<bool, Infallible> { Ok(true) }
/// #     async fn insert_order(&self, _: &Order) -> Result<bool, Infallible> { Ok(true) }
/// # }
/// #
/// # async fn example() -> Result<(), turnstile::Error> {
/// let sale = FlashSale::builder(MemoryStore::new(), NoopRecords).start();
///
/// // Stage 100 units on voucher 7, on sale for the next hour.
/// let now = chrono::Utc::now().timestamp();
/// sale.stage_sale(7, 100, now, now + 3_600).await?;
///
/// let outcome = sale.submit(7, 12_345).await?;
/// assert!(outcome.order_id().is_some());
///
/// sale.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct FlashSale<S> {
    store: S,
    sequence: SequenceGenerator<S>,
    id_prefix: String,
    queue: mpsc::Sender<OrderTask>,
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl<S> Debug for FlashSale<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashSale")
            .field("id_prefix", &self.id_prefix)
            .finish_non_exhaustive()
    }
}

impl<S> FlashSale<S>
where
    S: RemoteStore + SaleStore + Clone + 'static,
{
    /// Creates a builder for a service over the given store and system of
    /// record.
    #[must_use]
    pub fn builder<R>(store: S, records: R) -> FlashSaleBuilder<S, R>
    where
        R: SystemOfRecord + 'static,
    {
        FlashSaleBuilder::new(store, records)
    }

    /// Stages a sale: `stock` units of `voucher_id`, purchasable in the
    /// `[begin, end)` window (epoch seconds).
    ///
    /// Re-staging a voucher resets its ledger, including purchase markers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn stage_sale(&self, voucher_id: u64, stock: u32, begin: i64, end: i64) -> Result<()> {
        self.store.stage_sale(voucher_id, stock, begin, end).await?;
        tracing::info!(voucher_id, stock, begin, end, "sale staged");
        Ok(())
    }

    /// Submits one purchase attempt for `voucher_id` by `user_id`.
    ///
    /// The eligibility and stock check runs as a single atomic step at the
    /// remote store, so concurrent submissions can never oversell or admit
    /// the same user twice. On admission an order id is minted and the
    /// persistence task enqueued; the id is returned immediately, before the
    /// order is durable (see [`Admission::Admitted`]).
    ///
    /// A full queue yields [`Admission::Busy`] instead of blocking or
    /// failing: admission control applies to the service itself, too.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or no order id could be
    /// minted. Business rejections are `Ok` outcomes.
    pub async fn submit(&self, voucher_id: u64, user_id: u64) -> Result<Admission> {
        let now = Utc::now().timestamp();
        let code = self.store.admit(voucher_id, user_id, now).await?;
        if let Some(rejection) = Admission::rejected(code) {
            return Ok(rejection);
        }

        let order_id = self.sequence.next_id(&self.id_prefix).await?;
        let task = OrderTask {
            order_id,
            voucher_id,
            user_id,
            enqueued_at: now,
        };
        match self.queue.try_send(task) {
            Ok(()) => Ok(Admission::Admitted { order_id }),
            Err(TrySendError::Full(task)) => {
                tracing::warn!(
                    order_id = task.order_id,
                    voucher_id,
                    user_id,
                    "order queue full; shedding admission"
                );
                Ok(Admission::Busy)
            }
            Err(TrySendError::Closed(task)) => {
                tracing::warn!(
                    order_id = task.order_id,
                    voucher_id,
                    user_id,
                    "order queue closed; service is shutting down"
                );
                Ok(Admission::Busy)
            }
        }
    }

    /// Stops the service: signals the worker, closes the queue, and waits
    /// for the worker to drain queued tasks within the configured grace
    /// period.
    pub async fn shutdown(self) {
        // A send error only means the worker already exited.
        drop(self.stop.send(true));
        drop(self.queue);
        if let Err(error) = self.worker.await {
            tracing::warn!(%error, "order worker task failed during shutdown");
        }
    }
}

/// Builder for a [`FlashSale`] service.
///
/// All knobs have production-ready defaults: a ~1M-task queue, a 10s
/// per-user lock lease, a 5s shutdown drain grace, and order ids minted
/// under the `order` prefix.
#[derive(Debug)]
pub struct FlashSaleBuilder<S, R> {
    store: S,
    records: R,
    queue_capacity: usize,
    lock_lease: Duration,
    drain_grace: Duration,
    id_prefix: String,
}

impl<S, R> FlashSaleBuilder<S, R>
where
    S: RemoteStore + SaleStore + Clone + 'static,
    R: SystemOfRecord + 'static,
{
    fn new(store: S, records: R) -> Self {
        Self {
            store,
            records,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lock_lease: DEFAULT_LOCK_LEASE,
            drain_grace: DEFAULT_DRAIN_GRACE,
            id_prefix: DEFAULT_ID_PREFIX.to_owned(),
        }
    }

    /// Sets the capacity of the in-process order queue. Submissions that
    /// find it full are shed with [`Admission::Busy`].
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the lease of the per-user order lock taken by the worker.
    #[must_use]
    pub fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Sets how long a shutdown keeps draining queued tasks.
    #[must_use]
    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Sets the sequence prefix under which order ids are minted.
    #[must_use]
    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Starts the service: binds the queue and spawns the order worker.
    ///
    /// Must be called within a tokio runtime, which the worker task runs on
    /// for the service's lifetime.
    #[must_use]
    pub fn start(self) -> FlashSale<S> {
        let (queue, tasks) = mpsc::channel(self.queue_capacity);
        let (stop, stop_signal) = watch::channel(false);
        let worker = tokio::spawn(worker::run(
            tasks,
            stop_signal,
            self.store.clone(),
            self.records,
            self.lock_lease,
            self.drain_grace,
        ));
        FlashSale {
            sequence: SequenceGenerator::new(self.store.clone()),
            store: self.store,
            id_prefix: self.id_prefix,
            queue,
            stop,
            worker,
        }
    }
}
