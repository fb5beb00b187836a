// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded worker pool for background cache rebuilds.

use std::sync::Arc;

use tokio::sync::Semaphore;

/// A fixed-size pool for fire-and-forget rebuild tasks.
///
/// Each scheduled task waits for one of the pool's permits before running,
/// so at most `workers` rebuilds execute concurrently; excess tasks queue on
/// the semaphore. At-most-one-rebuild-per-key is not this pool's concern -
/// the engine enforces that with the per-key rebuild lock before scheduling.
#[derive(Debug)]
pub(crate) struct RebuildPool {
    permits: Arc<Semaphore>,
}

impl RebuildPool {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Schedules `work` on the pool. Never blocks the caller.
    pub(crate) fn spawn<T>(&self, work: T)
    where
        T: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed, but a panic-free fallback beats
            // unwinding inside a detached task.
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            work.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_caps_concurrency() {
        let pool = RebuildPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn all_scheduled_tasks_eventually_run() {
        let pool = RebuildPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.spawn(async move {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        for _ in 0..100 {
            if done.load(Ordering::SeqCst) == 5 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("queued rebuilds never drained");
    }
}
