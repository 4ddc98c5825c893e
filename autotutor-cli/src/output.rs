//! Human-readable terminal output.

#[cfg(feature = "colored-output")]
use colored::*;

use autotutor_engine::{RunOutcome, RunReport};
use std::path::Path;

pub fn print_columns(file: &Path, headers: &[String], rows: usize) {
    println!("{} ({} rows)", file.display(), rows);
    for (index, header) in headers.iter().enumerate() {
        println!("  {:>3}  {}", index + 1, header);
    }
}

fn outcome_label(outcome: RunOutcome) -> String {
    let label = match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Paused { checkpoint } => format!("paused at row {checkpoint}"),
        RunOutcome::Stopped => "stopped".to_string(),
    };
    #[cfg(feature = "colored-output")]
    {
        match outcome {
            RunOutcome::Completed => label.green().bold().to_string(),
            RunOutcome::Paused { .. } => label.yellow().bold().to_string(),
            RunOutcome::Stopped => label.red().bold().to_string(),
        }
    }
    #[cfg(not(feature = "colored-output"))]
    {
        label
    }
}

pub fn print_summary(report: &RunReport, processed: usize, errors: usize, exported: &Path) {
    println!("Run {}", outcome_label(report.outcome));
    println!("  rows processed:     {processed}");
    if errors > 0 {
        #[cfg(feature = "colored-output")]
        println!("  {}", format!("rows with errors:   {errors}").red());
        #[cfg(not(feature = "colored-output"))]
        println!("  rows with errors:   {errors}");
    }
    println!("  exported to: {}", exported.display());
}
