//! Background refresh worker pool
//!
//! Cache refreshes are fire-and-forget, but they still have to be
//! bounded: a flood of hot-key reads must not spawn an unbounded number
//! of upstream recomputations. Jobs go through a bounded queue and a
//! semaphore caps how many are in flight at once; when the queue is
//! full the job is dropped, since a refresh is always best-effort.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Semaphore};

struct Job {
    delay: Duration,
    work: BoxFuture<'static, ()>,
}

/// Handle to the shared refresh pool. Cheap to clone.
#[derive(Clone)]
pub struct RefreshPool {
    tx: mpsc::Sender<Job>,
}

impl RefreshPool {
    /// Spawn the dispatcher. `queue_depth` bounds pending jobs,
    /// `max_concurrency` bounds jobs in flight (delayed or running).
    pub fn new(queue_depth: usize, max_concurrency: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_depth);
        let permits = Arc::new(Semaphore::new(max_concurrency));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // The dispatcher holds the permit through the spawn, so
                // at most `max_concurrency` jobs are in flight and the
                // channel depth bounds everything still pending.
                // Closed only when the pool is dropped mid-shutdown.
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    return;
                };
                tokio::spawn(async move {
                    let _permit = permit;
                    if job.delay > Duration::ZERO {
                        tokio::time::sleep(job.delay).await;
                    }
                    job.work.await;
                });
            }
        });

        Self { tx }
    }

    /// Submit a job, to run after `delay`. Dropped silently (with a
    /// debug log) when the queue is full.
    pub fn submit(&self, delay: Duration, work: BoxFuture<'static, ()>) {
        if self.tx.try_send(Job { delay, work }).is_err() {
            tracing::debug!("refresh queue full, dropping background refresh");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_submitted_job_runs() {
        let pool = RefreshPool::new(8, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        pool.submit(
            Duration::ZERO,
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delay_is_honored() {
        let pool = RefreshPool::new(8, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        pool.submit(
            Duration::from_millis(80),
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_jobs_bounded_by_queue_depth() {
        let pool = RefreshPool::new(2, 1);
        let counter = Arc::new(AtomicUsize::new(0));

        // Occupy the single permit so nothing behind it can start
        let c = Arc::clone(&counter);
        pool.submit(
            Duration::ZERO,
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The channel holds two, the dispatcher may hold one more while
        // it waits on the permit; the rest of the burst is shed.
        for _ in 0..8 {
            let c = Arc::clone(&counter);
            pool.submit(
                Duration::ZERO,
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        let completed = counter.load(Ordering::SeqCst);
        assert!((3..=4).contains(&completed), "completed {completed}");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = RefreshPool::new(16, 1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(
                Duration::ZERO,
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
