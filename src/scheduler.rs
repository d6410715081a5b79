//! Bounded-concurrency job runner shared by port scans and host discovery.
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default pool size.
pub const DEFAULT_CONCURRENCY: usize = 100;
/// Upper bound on the pool size, whatever the caller asks for.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Everything a [`ScanScheduler::run`] call produced.
#[derive(Debug)]
pub struct RunOutcome<R> {
    /// One entry per dispatched job, in completion order.
    pub results: Vec<R>,
    pub dispatched: usize,
    pub peak_in_flight: usize,
    /// Dispatched jobs that panicked and so left no entry in `results`.
    pub panicked: usize,
    /// True if the token fired before every job was dispatched.
    pub cancelled: bool,
}

/// Decrements the in-flight counter when a job ends, unwinding included.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fans jobs out over at most `concurrency` concurrent tasks and collects their
/// outputs once all of them have finished.
///
/// - A `Semaphore` permit is taken before a job is spawned and held until it ends,
///   so the number of running jobs never exceeds the bound.
/// - Results go into a mutex-protected sink; nothing is sorted here.
/// - Cancellation only stops dispatch. A job that got a permit always runs to the end
///   and contributes its result.
/// - A panicking job is counted in [`RunOutcome::panicked`]; callers that need one
///   entry per job fill the gap themselves.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    concurrency: usize,
    cancel: CancellationToken,
}

impl ScanScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<J, R, F, Fut>(&self, jobs: impl IntoIterator<Item = J>, task: F) -> RunOutcome<R>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let task = Arc::new(task);
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let sink: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        let mut dispatched = 0usize;
        let mut panicked = 0usize;
        let mut cancelled = false;

        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = sem.clone().acquire_owned() => permit,
            };
            // The semaphore is never closed while we hold it.
            let Ok(permit) = permit else { break };

            dispatched += 1;
            let task = task.clone();
            let sink = sink.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until the job is done
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let guard = InFlight(in_flight);

                let out = (*task)(job).await;

                drop(guard);
                sink.lock().await.push(out);
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                panicked += 1;
                warn!("scan worker failed: {e}");
            }
        }

        let results = std::mem::take(&mut *sink.lock().await);
        let peak_in_flight = peak.load(Ordering::SeqCst);
        debug!(
            dispatched,
            completed = results.len(),
            peak_in_flight,
            panicked,
            cancelled,
            "scheduler run finished"
        );

        RunOutcome {
            results,
            dispatched,
            peak_in_flight,
            panicked,
            cancelled,
        }
    }
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(ScanScheduler::new(0).concurrency(), 1);
        assert_eq!(ScanScheduler::new(1_000_000).concurrency(), MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn every_job_yields_one_result() {
        let sched = ScanScheduler::new(8);
        let mut out = sched.run(0..100u32, |n| async move { n * 2 }).await;
        assert_eq!(out.dispatched, 100);
        assert!(!out.cancelled);
        out.results.sort_unstable();
        assert_eq!(out.results, (0..100u32).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_job_list_returns_immediately() {
        let out = ScanScheduler::default().run(Vec::<u16>::new(), |p| async move { p }).await;
        assert!(out.results.is_empty());
        assert_eq!(out.dispatched, 0);
        assert_eq!(out.peak_in_flight, 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let sched = ScanScheduler::new(4).with_cancel(token);
        let out = sched.run(0..10u32, |n| async move { n }).await;
        assert!(out.cancelled);
        assert_eq!(out.dispatched, 0);
        assert!(out.results.is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_results_of_dispatched_jobs() {
        let token = CancellationToken::new();
        let sched = ScanScheduler::new(2).with_cancel(token.clone());
        let trigger = token.clone();
        let out = sched
            .run(0..50u32, move |n| {
                let trigger = trigger.clone();
                async move {
                    if n == 3 {
                        trigger.cancel();
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    n
                }
            })
            .await;
        assert!(out.cancelled);
        assert!(out.dispatched < 50);
        assert_eq!(out.results.len(), out.dispatched);
    }
}
