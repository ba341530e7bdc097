//! Bounded fan-out of probe work.
use super::cancel::CancelToken;
use super::sink::ProbeOutcome;
use crate::address::Address;
use futures::FutureExt;
use log::{debug, info, warn};
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant};

/// What happened to the work handed to [`WorkerPool::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Work items started.
    pub admitted: usize,
    /// Outcomes handed to the sink.
    pub completed: usize,
    /// Work items started but dropped before producing an outcome.
    pub abandoned: usize,
    /// Whether cancellation stopped admission.
    pub cancelled: bool,
}

/// Runs work concurrently with at most `limit` items in flight.
///
/// Admission is gated by a semaphore: an item is only started once it holds
/// a permit, and the permit is returned when the item finishes, which admits
/// exactly one more. Cancellation is checked before every admission and again
/// when each item starts.
#[derive(Debug)]
pub struct WorkerPool {
    limit: NonZeroUsize,
    gate: Arc<Semaphore>,
    cancel: CancelToken,
    grace: Duration,
}

impl WorkerPool {
    pub fn new(limit: NonZeroUsize, cancel: CancelToken, grace: Duration) -> Self {
        Self {
            limit,
            gate: Arc::new(Semaphore::new(limit.get())),
            cancel,
            grace,
        }
    }

    /// Number of work items currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit.get() - self.gate.available_permits()
    }

    /// Feeds `addresses` through `work`, handing each outcome to `sink` on the
    /// calling task.
    ///
    /// Without cancellation every address yields exactly one outcome. Once
    /// the token is cancelled no further address is admitted; running items
    /// get the grace period to finish and are aborted after it.
    pub async fn run<I, W, F, S>(&self, addresses: I, work: W, mut sink: S) -> PoolReport
    where
        I: IntoIterator<Item = Address>,
        W: Fn(Address) -> F,
        F: Future<Output = ProbeOutcome> + Send + 'static,
        S: FnMut(ProbeOutcome),
    {
        let mut report = PoolReport::default();
        let mut tasks = JoinSet::new();

        for address in addresses {
            // wait for a slot, routing finished work while we do so the
            // caller sees outcomes as they arrive
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break None,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        route(joined, &mut sink, &mut report);
                    }
                    permit = Arc::clone(&self.gate).acquire_owned() => break permit.ok(),
                }
            };

            let Some(permit) = permit else {
                break;
            };
            if self.cancel.is_cancelled() {
                break;
            }

            let cancel = self.cancel.clone();
            let job = work(address);
            report.admitted += 1;
            tasks.spawn(async move {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = AssertUnwindSafe(job).catch_unwind().await.unwrap_or_else(|_| {
                    warn!("Probe of {} panicked, classifying it as unreachable", address);
                    ProbeOutcome::unreachable(address)
                });
                Some(outcome)
            });
        }

        self.drain(&mut tasks, &mut sink, &mut report).await;
        report.cancelled = self.cancel.is_cancelled();
        debug!("Worker pool finished: {:?}", report);
        report
    }

    async fn drain<S>(
        &self,
        tasks: &mut JoinSet<Option<ProbeOutcome>>,
        sink: &mut S,
        report: &mut PoolReport,
    ) where
        S: FnMut(ProbeOutcome),
    {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(joined) => route(joined, sink, report),
                    None => return,
                },
            }
        }

        info!(
            "Cancellation requested, waiting up to {:?} for {} running probe(s)",
            self.grace,
            tasks.len()
        );
        let deadline = Instant::now() + self.grace;
        while let Ok(Some(joined)) = time::timeout_at(deadline, tasks.join_next()).await {
            route(joined, sink, report);
        }

        if !tasks.is_empty() {
            warn!(
                "Grace period over, aborting {} probe(s) still running",
                tasks.len()
            );
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                route(joined, sink, report);
            }
        }
    }
}

fn route<S>(joined: Result<Option<ProbeOutcome>, JoinError>, sink: &mut S, report: &mut PoolReport)
where
    S: FnMut(ProbeOutcome),
{
    match joined {
        Ok(Some(outcome)) => {
            report.completed += 1;
            sink(outcome);
        }
        Ok(None) => report.abandoned += 1,
        Err(e) => {
            if !e.is_cancelled() {
                warn!("Probe task failed: {}", e);
            }
            report.abandoned += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PoolReport, WorkerPool};
    use crate::address::Prefix;
    use crate::scanner::cancel::CancelToken;
    use crate::scanner::sink::ProbeOutcome;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn pool(limit: usize, cancel: CancelToken) -> WorkerPool {
        WorkerPool::new(
            NonZeroUsize::new(limit).unwrap(),
            cancel,
            Duration::from_millis(200),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_address_yields_one_outcome() {
        let pool = pool(8, CancelToken::new());
        let prefix = Prefix::new(10, 0, 0);
        let mut seen = Vec::new();

        let report = pool
            .run(
                prefix.hosts(),
                |address| async move { ProbeOutcome::reachable(address) },
                |outcome| seen.push(outcome.address),
            )
            .await;

        seen.sort();
        assert_eq!(seen, prefix.hosts().collect::<Vec<_>>());
        assert_eq!(
            report,
            PoolReport {
                admitted: 254,
                completed: 254,
                abandoned: 0,
                cancelled: false,
            }
        );
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_never_exceeds_limit() {
        let pool = pool(5, CancelToken::new());
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = pool
            .run(
                Prefix::new(10, 0, 0).hosts(),
                |address| {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        ProbeOutcome::unreachable(address)
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(report.completed, 254);
        assert!(peak.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_work_is_classified_unreachable() {
        let pool = pool(4, CancelToken::new());
        let prefix = Prefix::new(10, 0, 0);
        let mut unreachable = 0;

        let report = pool
            .run(
                prefix.hosts().take(10),
                |address| async move {
                    if address.suffix() == 3 {
                        panic!("probe blew up");
                    }
                    ProbeOutcome::reachable(address)
                },
                |outcome| {
                    if outcome == ProbeOutcome::unreachable(prefix.host(3).unwrap()) {
                        unreachable += 1;
                    }
                },
            )
            .await;

        assert_eq!(report.completed, 10);
        assert_eq!(unreachable, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_before_start_admits_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = pool(4, cancel);

        let report = pool
            .run(
                Prefix::new(10, 0, 0).hosts(),
                |address| async move { ProbeOutcome::reachable(address) },
                |_| panic!("no outcome expected"),
            )
            .await;

        assert_eq!(report.admitted, 0);
        assert!(report.cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stuck_work_is_aborted_after_grace() {
        let cancel = CancelToken::new();
        let pool = pool(3, cancel.clone());

        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let report = pool
            .run(
                Prefix::new(10, 0, 0).hosts(),
                |address| async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    ProbeOutcome::reachable(address)
                },
                |_| {},
            )
            .await;
        trigger.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.admitted, 3);
        assert_eq!(report.abandoned, 3);
        assert_eq!(report.completed, 0);
        assert!(report.cancelled);
    }
}
