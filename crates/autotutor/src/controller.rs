//! Job controller.
//!
//! Drives one run at a time: validates the transition in the store, hands the
//! remaining rows to the worker pool and commits each generated value back
//! through the store. Pause and stop are synchronous and only flip the run's
//! signal; the running dispatch observes them cooperatively.

use gradebook::RowRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::Result;
use crate::generator::CommentGenerator;
use crate::store::{RunMode, RunOutcome, RunSnapshot, SessionStore};
use crate::worker_pool::{DispatchSummary, PoolConfig, WorkerPool};

const EVENT_CAPACITY: usize = 256;

/// Progress notifications for displays and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        start_index: usize,
        total: usize,
    },
    RowCompleted {
        /// Absolute row index that was written.
        index: usize,
        /// Checkpoint after this commit.
        current_index: usize,
        progress: u8,
    },
    Paused {
        checkpoint: usize,
    },
    Stopped,
    Finished {
        outcome: RunOutcome,
    },
}

/// Result of one `start` or `resume` call, returned at the pool's join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub start_index: usize,
    pub outcome: RunOutcome,
    pub summary: DispatchSummary,
}

pub struct JobController {
    store: Arc<SessionStore>,
    generator: Arc<dyn CommentGenerator>,
    pool: WorkerPool,
    /// Held for the whole dispatch, so runs never overlap.
    run_lock: Mutex<()>,
    events: broadcast::Sender<RunEvent>,
}

impl JobController {
    pub fn new(
        store: Arc<SessionStore>,
        generator: Arc<dyn CommentGenerator>,
        pool: PoolConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            generator,
            pool: WorkerPool::new(pool),
            run_lock: Mutex::new(()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.store.snapshot()
    }

    /// Fresh run from row 0. Resolves when the run completes, pauses or stops.
    pub async fn start(&self) -> Result<RunReport> {
        self.run(RunMode::Start).await
    }

    /// Continue a paused run from its checkpoint.
    pub async fn resume(&self) -> Result<RunReport> {
        self.run(RunMode::Resume).await
    }

    /// Stop admitting rows. In-flight rows still commit.
    pub fn pause(&self) -> Result<RunSnapshot> {
        let snapshot = self.store.pause()?;
        self.emit(RunEvent::Paused {
            checkpoint: snapshot.current_index,
        });
        Ok(snapshot)
    }

    /// Abandon the run and its checkpoint. In-flight results are discarded.
    pub fn stop(&self) -> Result<RunSnapshot> {
        let snapshot = self.store.stop()?;
        self.emit(RunEvent::Stopped);
        Ok(snapshot)
    }

    async fn run(&self, mode: RunMode) -> Result<RunReport> {
        // Reject obviously invalid requests before queueing behind a draining run.
        self.store.check_can_begin(mode)?;
        let _running = self.run_lock.lock().await;
        let plan = self.store.begin_run(mode)?;

        info!(
            mode = ?mode,
            start_index = plan.start_index,
            total = plan.total,
            target = %plan.target_column,
            "Run started"
        );
        self.emit(RunEvent::Started {
            start_index: plan.start_index,
            total: plan.total,
        });

        let generator = self.generator.clone();
        let target: Arc<str> = Arc::from(plan.target_column.as_str());
        let store = &self.store;
        let column = &plan.target_column;

        let summary = self
            .pool
            .dispatch(
                plan.records,
                plan.start_index,
                &plan.signal,
                |record: RowRecord| {
                    let generator = generator.clone();
                    let target = target.clone();
                    async move { generator.generate(&record, &target).await }
                },
                |index, value| match store.commit(index, column, value) {
                    Some(snapshot) => {
                        debug!(
                            row = index,
                            current_index = snapshot.current_index,
                            progress = snapshot.progress,
                            "Row committed"
                        );
                        self.emit(RunEvent::RowCompleted {
                            index,
                            current_index: snapshot.current_index,
                            progress: snapshot.progress,
                        });
                        true
                    }
                    None => false,
                },
            )
            .await;

        let outcome = self.store.finish();
        info!(?outcome, committed = summary.committed, "Run finished");
        self.emit(RunEvent::Finished { outcome });

        Ok(RunReport {
            start_index: plan.start_index,
            outcome,
            summary,
        })
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
