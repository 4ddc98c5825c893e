//! Process-wide session store.
//!
//! Holds the dataset, the selected target column and the run state machine.
//! Every mutation goes through one `parking_lot::Mutex`, so pause/stop from a
//! UI thread and commits from the worker pool never interleave a
//! read-modify-write.

use gradebook::{Dataset, RowRecord};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::signal::RunSignal;
use crate::{Error, Result};

/// How a run is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Fresh run from row 0. Discards any checkpoint.
    Start,
    /// Continue a paused run from its checkpoint.
    Resume,
}

impl RunMode {
    fn verb(self) -> &'static str {
        match self {
            RunMode::Start => "start",
            RunMode::Resume => "resume",
        }
    }
}

/// The run state machine. `progress` is derived, never stored.
#[derive(Debug, Clone)]
enum RunState {
    Idle {
        /// Whether the last run reached natural completion.
        finished: bool,
    },
    Running {
        start_index: usize,
        completed: usize,
        signal: RunSignal,
    },
    Paused {
        checkpoint: usize,
        signal: RunSignal,
    },
}

impl RunState {
    fn name(&self) -> &'static str {
        match self {
            RunState::Idle { .. } => "idle",
            RunState::Running { .. } => "running",
            RunState::Paused { .. } => "paused",
        }
    }
}

/// Coarse run phase, as exposed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
}

/// Observable view of the run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub phase: RunPhase,
    pub is_generating: bool,
    pub is_paused: bool,
    /// Rows completed so far in the active or most recently paused run,
    /// counted from row 0 of the dataset.
    pub current_index: usize,
    /// `0..=100`.
    pub progress: u8,
    /// Number of rows in the dataset.
    pub total: usize,
}

/// How a run ended at its join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Paused { checkpoint: usize },
    Stopped,
}

/// Everything a run needs, captured when it begins.
#[derive(Debug)]
pub struct RunPlan {
    pub start_index: usize,
    pub total: usize,
    pub target_column: String,
    pub records: Vec<RowRecord>,
    pub signal: RunSignal,
}

/// `min(100, round(100 * done / total))`, rounding halves up.
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * done as u128 + total as u128) / (2 * total as u128);
    rounded.min(100) as u8
}

#[derive(Debug)]
struct Session {
    dataset: Dataset,
    target_column: Option<String>,
    run: RunState,
}

impl Session {
    fn snapshot(&self) -> RunSnapshot {
        let total = self.dataset.len();
        match &self.run {
            RunState::Idle { finished } => RunSnapshot {
                phase: RunPhase::Idle,
                is_generating: false,
                is_paused: false,
                current_index: 0,
                progress: if *finished { 100 } else { 0 },
                total,
            },
            RunState::Running {
                start_index,
                completed,
                ..
            } => RunSnapshot {
                phase: RunPhase::Running,
                is_generating: true,
                is_paused: false,
                current_index: start_index + completed,
                progress: progress_percent(start_index + completed, total),
                total,
            },
            RunState::Paused { checkpoint, .. } => RunSnapshot {
                phase: RunPhase::Paused,
                is_generating: false,
                is_paused: true,
                current_index: *checkpoint,
                progress: progress_percent(*checkpoint, total),
                total,
            },
        }
    }

    fn start_index(&self, mode: RunMode) -> Result<usize> {
        if self.dataset.is_empty() {
            return Err(Error::EmptyDataset);
        }
        if self.target_column.is_none() {
            return Err(Error::NoTargetColumn);
        }
        match (&self.run, mode) {
            (RunState::Running { .. }, _) => Err(Error::transition(mode.verb(), "running")),
            (RunState::Paused { checkpoint, .. }, RunMode::Resume) => Ok(*checkpoint),
            (RunState::Paused { .. }, RunMode::Start) => Ok(0),
            (RunState::Idle { .. }, RunMode::Start) => Ok(0),
            (RunState::Idle { .. }, RunMode::Resume) => Err(Error::transition("resume", "idle")),
        }
    }

    /// Close any signal still attached to the run state.
    fn release_signal(&self) {
        match &self.run {
            RunState::Running { signal, .. } | RunState::Paused { signal, .. } => signal.stop(),
            RunState::Idle { .. } => {}
        }
    }
}

/// The single owner of dataset and run state.
#[derive(Debug)]
pub struct SessionStore {
    inner: Mutex<Session>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_dataset(Dataset::default())
    }

    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            inner: Mutex::new(Session {
                dataset,
                target_column: None,
                run: RunState::Idle { finished: false },
            }),
        }
    }

    /// Replace the dataset wholesale. Clears the target column and any
    /// checkpoint. Rejected while a run is active.
    pub fn load_dataset(&self, dataset: Dataset) -> Result<()> {
        let mut session = self.inner.lock();
        if let RunState::Running { .. } = session.run {
            return Err(Error::transition("load a dataset", "running"));
        }
        session.release_signal();
        info!(
            file = %dataset.name(),
            rows = dataset.len(),
            columns = dataset.headers().len(),
            "Dataset loaded"
        );
        session.dataset = dataset;
        session.target_column = None;
        session.run = RunState::Idle { finished: false };
        Ok(())
    }

    /// Select (or clear) the column that receives generated comments.
    pub fn set_target_column(&self, column: Option<&str>) -> Result<()> {
        let mut session = self.inner.lock();
        if let RunState::Running { .. } = session.run {
            return Err(Error::transition("change the target column", "running"));
        }
        if let Some(column) = column {
            if !session.dataset.has_column(column) {
                return Err(Error::UnknownColumn(column.to_string()));
            }
        }
        session.target_column = column.map(str::to_string);
        Ok(())
    }

    pub fn target_column(&self) -> Option<String> {
        self.inner.lock().target_column.clone()
    }

    /// Overwrite one cell.
    pub fn update_cell(&self, index: usize, column: &str, value: impl Into<String>) -> Result<()> {
        self.inner
            .lock()
            .dataset
            .set_cell(index, column, value)
            .map_err(Error::from)
    }

    /// Clear dataset, target column and run state. Any active run is stopped.
    pub fn reset(&self) {
        let mut session = self.inner.lock();
        session.release_signal();
        session.dataset = Dataset::default();
        session.target_column = None;
        session.run = RunState::Idle { finished: false };
        debug!("Session reset");
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.lock().snapshot()
    }

    /// A copy of the current dataset.
    pub fn dataset(&self) -> Dataset {
        self.inner.lock().dataset.clone()
    }

    /// Borrow the dataset under the lock.
    pub fn with_dataset_ref<R>(&self, f: impl FnOnce(&Dataset) -> R) -> R {
        f(&self.inner.lock().dataset)
    }

    /// Validate that a run could begin in `mode` right now, without changing state.
    pub fn check_can_begin(&self, mode: RunMode) -> Result<()> {
        self.inner.lock().start_index(mode).map(|_| ())
    }

    /// Enter `Running` and capture what the run needs.
    pub fn begin_run(&self, mode: RunMode) -> Result<RunPlan> {
        let mut session = self.inner.lock();
        let start_index = session.start_index(mode)?;
        let Some(target_column) = session.target_column.clone() else {
            return Err(Error::NoTargetColumn);
        };

        session.release_signal();
        let signal = RunSignal::new();
        session.run = RunState::Running {
            start_index,
            completed: 0,
            signal: signal.clone(),
        };

        Ok(RunPlan {
            start_index,
            total: session.dataset.len(),
            target_column,
            records: session.dataset.records_from(start_index),
            signal,
        })
    }

    /// `Running → Paused`. The checkpoint is the number of rows completed so far.
    pub fn pause(&self) -> Result<RunSnapshot> {
        let mut session = self.inner.lock();
        let RunState::Running {
            start_index,
            completed,
            signal,
        } = &session.run
        else {
            return Err(Error::transition("pause", session.run.name()));
        };

        signal.pause();
        let checkpoint = start_index + completed;
        session.run = RunState::Paused {
            checkpoint,
            signal: signal.clone(),
        };
        info!(checkpoint, "Run paused");
        Ok(session.snapshot())
    }

    /// `Running | Paused → Idle`. Discards the checkpoint and any in-flight results.
    pub fn stop(&self) -> Result<RunSnapshot> {
        let mut session = self.inner.lock();
        if let RunState::Idle { .. } = session.run {
            return Err(Error::transition("stop", "idle"));
        }
        session.release_signal();
        session.run = RunState::Idle { finished: false };
        info!("Run stopped");
        Ok(session.snapshot())
    }

    /// Write a generated value for absolute row `index` and advance the
    /// checkpoint. Returns `None` if the run was stopped in the meantime.
    pub fn commit(&self, index: usize, column: &str, value: String) -> Option<RunSnapshot> {
        let mut session = self.inner.lock();
        if let RunState::Idle { .. } = session.run {
            debug!(index, "Dropping result for a run that is no longer active");
            return None;
        }

        if let Err(e) = session.dataset.set_cell(index, column, value) {
            warn!(index, column, error = %e, "Failed to write generated value");
            return None;
        }

        match &mut session.run {
            RunState::Running { completed, .. } => *completed += 1,
            RunState::Paused { checkpoint, .. } => *checkpoint += 1,
            RunState::Idle { .. } => {}
        }
        Some(session.snapshot())
    }

    /// Bookkeeping at the pool's join point. Only a run that is still
    /// `Running` completes naturally; a paused or stopped run is left as is.
    pub fn finish(&self) -> RunOutcome {
        let mut session = self.inner.lock();
        match &session.run {
            RunState::Running { signal, .. } => {
                signal.stop();
                session.run = RunState::Idle { finished: true };
                RunOutcome::Completed
            }
            RunState::Paused { checkpoint, .. } => RunOutcome::Paused {
                checkpoint: *checkpoint,
            },
            RunState::Idle { .. } => RunOutcome::Stopped,
        }
    }
}
