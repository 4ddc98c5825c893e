//! Bounded, staggered worker pool.
//!
//! Claims items strictly in order, keeps at most `concurrency` of them in
//! flight and staggers the start of each claim within a refill burst. A claim
//! never starts ahead of an earlier one, so a pause always leaves a
//! contiguous prefix of rows started. All
//! completions that are ready together are handed to the caller before the
//! next burst is claimed.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::signal::RunSignal;

/// Configuration for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum units of work in flight.
    pub concurrency: usize,
    /// Gap between successive starts within one refill burst, in milliseconds.
    pub stagger_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            stagger_ms: 200,
        }
    }
}

/// What happened to the items of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Items taken off the cursor.
    pub claimed: usize,
    /// Results accepted by the completion callback.
    pub committed: usize,
    /// Items that saw admission closed before starting.
    pub abandoned: usize,
    /// Results dropped because the run was stopped or the callback refused them.
    pub discarded: usize,
    /// Tasks that panicked.
    pub panicked: usize,
}

/// A bounded worker pool.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Effective concurrency; never zero.
    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Process `items` until the cursor is exhausted or `signal` closes
    /// admission, then wait for everything in flight.
    ///
    /// `work` builds the future for one item; it is only polled after the
    /// item's stagger delay and only if admission is still open at that point.
    /// `on_complete` receives `offset + position` and the output, and returns
    /// whether the result was accepted. Results that arrive after a stop are
    /// never passed to it.
    pub async fn dispatch<T, W, Fut, C>(
        &self,
        items: Vec<T>,
        offset: usize,
        signal: &RunSignal,
        work: W,
        mut on_complete: C,
    ) -> DispatchSummary
    where
        W: Fn(T) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
        C: FnMut(usize, Fut::Output) -> bool,
    {
        let concurrency = self.concurrency();
        let stagger = Duration::from_millis(self.config.stagger_ms);
        let total = items.len();
        let mut cursor = items.into_iter().enumerate();
        let mut tasks: JoinSet<(usize, Option<Fut::Output>)> = JoinSet::new();
        let mut summary = DispatchSummary::default();

        info!(items = total, offset, concurrency, "Dispatching work");

        // Each claim learns whether the claim ahead of it started, so the rows
        // that start always form a prefix of the claim order.
        let mut gate: Option<oneshot::Receiver<bool>> = None;
        let mut last_deadline = Instant::now();

        loop {
            let mut burst: u32 = 0;
            while tasks.len() < concurrency && signal.is_admitting() {
                let Some((position, item)) = cursor.next() else {
                    break;
                };
                let deadline = (Instant::now() + stagger * burst).max(last_deadline);
                last_deadline = deadline;
                burst += 1;
                summary.claimed += 1;
                debug!(
                    row = offset + position,
                    delay_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Claimed row"
                );

                let unit = work(item);
                let task_signal = signal.clone();
                let ahead = gate.take();
                let (started_tx, started_rx) = oneshot::channel();
                gate = Some(started_rx);
                tasks.spawn(async move {
                    let admitted = admit(ahead, deadline, &task_signal).await;
                    let _ = started_tx.send(admitted);
                    if !admitted {
                        return (position, None);
                    }
                    (position, Some(unit.await))
                });
            }

            let Some(first) = tasks.join_next().await else {
                break;
            };
            settle(first, offset, signal, &mut on_complete, &mut summary);
            while let Some(next) = tasks.try_join_next() {
                settle(next, offset, signal, &mut on_complete, &mut summary);
            }
        }

        info!(
            claimed = summary.claimed,
            committed = summary.committed,
            abandoned = summary.abandoned,
            discarded = summary.discarded,
            panicked = summary.panicked,
            "Dispatch drained"
        );
        summary
    }
}

/// Wait for the claim ahead to decide, then for `deadline`, then check
/// admission. A claim never starts once the one ahead of it was abandoned.
async fn admit(
    ahead: Option<oneshot::Receiver<bool>>,
    deadline: Instant,
    signal: &RunSignal,
) -> bool {
    if let Some(ahead) = ahead {
        if !ahead.await.unwrap_or(false) {
            return false;
        }
    }
    if deadline > Instant::now() {
        tokio::select! {
            biased;
            _ = signal.closed() => return false,
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }
    signal.is_admitting()
}

fn settle<O, C>(
    joined: Result<(usize, Option<O>), JoinError>,
    offset: usize,
    signal: &RunSignal,
    on_complete: &mut C,
    summary: &mut DispatchSummary,
) where
    C: FnMut(usize, O) -> bool,
{
    match joined {
        Ok((position, None)) => {
            debug!(row = offset + position, "Abandoned row before start");
            summary.abandoned += 1;
        }
        Ok((position, Some(_))) if signal.is_stopped() => {
            debug!(row = offset + position, "Discarding result after stop");
            summary.discarded += 1;
        }
        Ok((position, Some(output))) => {
            if on_complete(offset + position, output) {
                summary.committed += 1;
            } else {
                summary.discarded += 1;
            }
        }
        Err(e) => {
            error!(error = %e, "Worker task failed");
            summary.panicked += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(concurrency: usize, stagger_ms: u64) -> WorkerPool {
        WorkerPool::new(PoolConfig {
            concurrency,
            stagger_ms,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_processes_every_item_once() {
        let signal = RunSignal::new();
        let mut seen = Vec::new();
        let summary = pool(5, 200)
            .dispatch(
                (0..12).collect(),
                0,
                &signal,
                |n: usize| async move { n * 10 },
                |index, out| {
                    assert_eq!(out, index * 10);
                    seen.push(index);
                    true
                },
            )
            .await;

        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        assert_eq!(summary.claimed, 12);
        assert_eq!(summary.committed, 12);
        assert_eq!(summary.abandoned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_is_added_to_positions() {
        let signal = RunSignal::new();
        let mut seen = Vec::new();
        pool(2, 0)
            .dispatch(
                vec!['a', 'b', 'c'],
                4,
                &signal,
                |c| async move { c },
                |index, _| {
                    seen.push(index);
                    true
                },
            )
            .await;
        seen.sort_unstable();
        assert_eq!(seen, vec![4, 5, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_burst_is_staggered() {
        let signal = RunSignal::new();
        let origin = Instant::now();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let recorder = starts.clone();

        pool(5, 200)
            .dispatch(
                (0..5).collect(),
                0,
                &signal,
                move |n: usize| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.lock().push((n, origin.elapsed().as_millis()));
                    }
                },
                |_, _| true,
            )
            .await;

        let mut starts = starts.lock().clone();
        starts.sort_unstable();
        assert_eq!(
            starts,
            vec![(0, 0), (1, 200), (2, 400), (3, 600), (4, 800)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_overtakes_staggered_claims() {
        let signal = RunSignal::new();
        let origin = Instant::now();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let recorder = starts.clone();

        pool(5, 200)
            .dispatch(
                (0..7u64).collect(),
                0,
                &signal,
                move |n| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.lock().push((n, origin.elapsed().as_millis()));
                        if n > 0 {
                            tokio::time::sleep(Duration::from_millis(1000)).await;
                        }
                    }
                },
                |_, _| true,
            )
            .await;

        let starts = starts.lock().clone();
        let order: Vec<u64> = starts.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, (0..7).collect::<Vec<_>>());
        assert_eq!(&starts[..6], &[(0, 0), (1, 200), (2, 400), (3, 600), (4, 800), (5, 800)]);
        assert!(starts.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_stagger_abandons_a_suffix() {
        let signal = RunSignal::new();
        let pauser = signal.clone();
        let mut committed = Vec::new();

        let summary = pool(5, 200)
            .dispatch(
                (0..7u64).collect(),
                0,
                &signal,
                move |n| {
                    let pauser = pauser.clone();
                    async move {
                        if n == 1 {
                            pauser.pause();
                        }
                        n
                    }
                },
                |index, _| {
                    committed.push(index);
                    true
                },
            )
            .await;

        committed.sort_unstable();
        assert_eq!(committed, vec![0, 1]);
        assert_eq!(summary.abandoned, summary.claimed - 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_concurrency() {
        let signal = RunSignal::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (gauge, high) = (in_flight.clone(), peak.clone());

        let summary = pool(3, 10)
            .dispatch(
                (0..20u64).collect(),
                0,
                &signal,
                move |n| {
                    let (gauge, high) = (gauge.clone(), high.clone());
                    async move {
                        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                        high.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50 + (n * 37) % 90)).await;
                        gauge.fetch_sub(1, Ordering::SeqCst);
                    }
                },
                |_, _| true,
            )
            .await;

        assert_eq!(summary.committed, 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_admission_claims_nothing() {
        let signal = RunSignal::new();
        signal.pause();
        let summary = pool(5, 200)
            .dispatch(
                vec![1, 2, 3],
                0,
                &signal,
                |n: i32| async move { n },
                |_, _| panic!("no completion expected"),
            )
            .await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_results() {
        let signal = RunSignal::new();
        let stopper = signal.clone();
        let summary = pool(2, 0)
            .dispatch(
                vec![0u64, 1, 2, 3],
                0,
                &signal,
                move |n| {
                    let stopper = stopper.clone();
                    async move {
                        if n == 1 {
                            stopper.stop();
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        n
                    }
                },
                |_, _| panic!("stopped results must not commit"),
            )
            .await;

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.committed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_results_are_counted_as_discarded() {
        let signal = RunSignal::new();
        let summary = pool(4, 0)
            .dispatch(
                (0..4).collect(),
                0,
                &signal,
                |n: usize| async move { n },
                |index, _| index % 2 == 0,
            )
            .await;
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.discarded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_unit_does_not_stop_the_pool() {
        let signal = RunSignal::new();
        let mut committed = Vec::new();
        let summary = pool(2, 0)
            .dispatch(
                (0..4).collect(),
                0,
                &signal,
                |n: usize| async move {
                    if n == 2 {
                        panic!("boom");
                    }
                    n
                },
                |index, _| {
                    committed.push(index);
                    true
                },
            )
            .await;

        committed.sort_unstable();
        assert_eq!(committed, vec![0, 1, 3]);
        assert_eq!(summary.panicked, 1);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(pool(0, 0).concurrency(), 1);
        assert_eq!(WorkerPool::default().config(), &PoolConfig::default());
    }
}
