//! Drives one generation session: the run itself, the progress bar and the
//! interactive pause / resume / stop commands.

use autotutor_engine::{JobController, RunEvent, RunOutcome, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

type RunHandle = JoinHandle<autotutor_engine::Result<RunReport>>;

/// A control command typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "s" | "stop" => Some(Self::Stop),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

fn spawn_start(controller: &Arc<JobController>) -> RunHandle {
    let controller = controller.clone();
    tokio::spawn(async move { controller.start().await })
}

fn spawn_resume(controller: &Arc<JobController>) -> RunHandle {
    let controller = controller.clone();
    tokio::spawn(async move { controller.resume().await })
}

async fn join_active(
    active: &mut Option<RunHandle>,
) -> std::result::Result<autotutor_engine::Result<RunReport>, JoinError> {
    match active {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Mirror run events onto the progress bar until the controller goes away.
fn spawn_progress(controller: &JobController, bar: ProgressBar) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress display lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                RunEvent::Started { start_index, .. } => {
                    bar.set_position(start_index as u64);
                    bar.set_message("running  [p]ause [s]top [q]uit");
                }
                RunEvent::RowCompleted { current_index, .. } => {
                    bar.set_position(current_index as u64);
                }
                RunEvent::Paused { .. } => {
                    bar.set_message("pausing, waiting for in-flight rows");
                }
                RunEvent::Stopped => bar.set_message("stopping"),
                RunEvent::Finished { outcome } => match outcome {
                    RunOutcome::Completed => bar.finish_with_message("done"),
                    RunOutcome::Paused { checkpoint } => {
                        bar.set_position(checkpoint as u64);
                        bar.set_message("paused  [r]esume [s]top [q]uit");
                    }
                    RunOutcome::Stopped => bar.abandon_with_message("stopped"),
                },
            }
        }
    })
}

/// How a session ended.
#[derive(Debug, Clone, Copy)]
pub struct SessionOutcome {
    /// Report of the last run (a resume starts a new run).
    pub report: RunReport,
    /// Rows committed across every run of the session.
    pub committed: usize,
}

/// Run to completion, honouring stdin commands when `interactive` and
/// Ctrl-C at any time.
pub async fn drive(
    controller: Arc<JobController>,
    interactive: bool,
) -> anyhow::Result<SessionOutcome> {
    let bar = progress_bar(controller.snapshot().total);
    let progress = spawn_progress(&controller, bar.clone());

    let mut committed = 0;
    let result = control_loop(&controller, interactive, &mut committed).await;

    progress.abort();
    if !bar.is_finished() {
        bar.abandon();
    }
    result.map(|report| SessionOutcome { report, committed })
}

async fn control_loop(
    controller: &Arc<JobController>,
    interactive: bool,
    committed: &mut usize,
) -> anyhow::Result<RunReport> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = interactive;
    let mut active = Some(spawn_start(controller));
    let mut last: Option<RunReport> = None;
    let mut resume_requested = false;
    let mut quit_requested = false;

    loop {
        tokio::select! {
            joined = join_active(&mut active) => {
                active = None;
                let report = joined??;
                *committed += report.summary.committed;
                last = Some(report);
                match report.outcome {
                    RunOutcome::Paused { .. } if quit_requested || !stdin_open => return Ok(report),
                    RunOutcome::Paused { .. } if resume_requested => {
                        resume_requested = false;
                        active = Some(spawn_resume(controller));
                    }
                    RunOutcome::Paused { .. } => {}
                    RunOutcome::Completed | RunOutcome::Stopped => return Ok(report),
                }
            }

            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    stdin_open = false;
                    if active.is_none() {
                        if let Some(report) = last {
                            return Ok(report);
                        }
                    }
                    continue;
                };
                let Some(command) = Command::parse(&line) else {
                    if !line.trim().is_empty() {
                        eprintln!("Unknown command '{}'. Use p, r, s or q.", line.trim());
                    }
                    continue;
                };

                match command {
                    Command::Pause => {
                        if let Err(e) = controller.pause() {
                            eprintln!("{e}");
                        }
                    }
                    Command::Resume if active.is_some() => {
                        // The paused run is still draining; resume once it has.
                        if controller.snapshot().is_paused {
                            resume_requested = true;
                        } else {
                            eprintln!("Already running.");
                        }
                    }
                    Command::Resume => active = Some(spawn_resume(controller)),
                    Command::Stop => {
                        if let Err(e) = controller.stop() {
                            eprintln!("{e}");
                        }
                        if active.is_none() {
                            if let Some(report) = last {
                                return Ok(RunReport { outcome: RunOutcome::Stopped, ..report });
                            }
                        }
                    }
                    Command::Quit => {
                        quit_requested = true;
                        if active.is_none() {
                            if let Some(report) = last {
                                return Ok(report);
                            }
                        } else if controller.snapshot().is_generating {
                            if let Err(e) = controller.pause() {
                                warn!(error = %e, "Pause before quit failed");
                            }
                        }
                    }
                }
            }

            signal = tokio::signal::ctrl_c() => {
                signal?;
                eprintln!("Interrupted, stopping.");
                let _ = controller.stop();
                if active.is_none() {
                    if let Some(report) = last {
                        return Ok(RunReport { outcome: RunOutcome::Stopped, ..report });
                    }
                }
            }
        }
    }
}
