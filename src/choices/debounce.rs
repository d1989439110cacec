//! Trailing-edge debounce over tokio timers

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs only the last call of a burst, `interval` after it arrived.
///
/// A call that already started running is never cancelled by a later one;
/// stale results are the caller's job (see the resolver's invocation counter).
pub struct Debouncer {
    interval: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Debouncer {
            interval,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule `job`, superseding any call still waiting out its interval.
    /// A zero interval runs the job right away.
    pub fn call<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if self.interval.is_zero() {
            tokio::spawn(job);
            return;
        }

        let generation = self.generation.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }
            job.await;
        });
    }

    /// Drop whatever is still waiting
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_only_the_last_call() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for input in ["a", "ab", "abc"] {
            let seen = seen.clone();
            debouncer.call(async move { seen.lock().push(input) });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock(), vec!["abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_separated_by_interval_both_run() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for input in [1, 2] {
            let seen = seen.clone();
            debouncer.call(async move { seen.lock().push(input) });
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let seen = Arc::new(Mutex::new(0));
        {
            let seen = seen.clone();
            debouncer.call(async move { *seen.lock() += 1 });
        }
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_runs_immediately() {
        let debouncer = Debouncer::new(Duration::ZERO);
        let (tx, rx) = tokio::sync::oneshot::channel();
        debouncer.call(async move {
            let _ = tx.send(7);
        });
        assert_eq!(rx.await.unwrap(), 7);
    }
}
