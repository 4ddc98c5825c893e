use anyhow::Context;
use autotutor_engine::{EngineConfig, JobController, SessionStore, is_error_value};
use gradebook::Dataset;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::cli::RunArgs;
use crate::config::AppConfig;
use crate::error::CliError;
use crate::output;
use crate::session;

async fn load_workbook(file: &Path) -> anyhow::Result<Dataset> {
    let path = file.to_path_buf();
    let dataset = tokio::task::spawn_blocking(move || gradebook::read_path(&path))
        .await?
        .with_context(|| format!("Failed to read workbook {}", file.display()))?;
    Ok(dataset)
}

pub async fn list_columns(file: &Path) -> anyhow::Result<()> {
    let dataset = load_workbook(file).await?;
    output::print_columns(file, dataset.headers(), dataset.len());
    Ok(())
}

pub fn show_config(config: &AppConfig, path_only: bool) -> anyhow::Result<()> {
    if path_only {
        match AppConfig::default_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("No config directory on this platform"),
        }
    } else {
        print!("{}", config.show()?);
    }
    Ok(())
}

/// Load `dataset` into a fresh store targeting `column` and wire a controller.
fn prepare(
    dataset: Dataset,
    column: &str,
    engine: EngineConfig,
) -> crate::error::Result<(Arc<SessionStore>, Arc<JobController>)> {
    if !dataset.has_column(column) {
        return Err(CliError::UnknownColumn {
            name: column.to_string(),
            available: dataset.headers().join(", "),
        });
    }
    let store = Arc::new(SessionStore::new());
    store.load_dataset(dataset)?;
    store.set_target_column(Some(column))?;
    let controller = engine.build_controller(store.clone())?;
    Ok((store, Arc::new(controller)))
}

pub async fn run(mut config: AppConfig, args: RunArgs) -> anyhow::Result<PathBuf> {
    config.apply_run_args(&args);

    let dataset = load_workbook(&args.file).await?;
    if dataset.is_empty() {
        return Err(CliError::EmptyWorkbook(args.file.clone()).into());
    }
    if config.engine.generator.api_key.is_none() {
        eprintln!("Warning: no API key configured; every row will hold an error value.");
    }

    let output_dir = config.output_dir_for(&args.file);
    let (store, controller) = prepare(dataset, &args.column, config.engine)?;
    let interactive = !args.no_interactive && std::io::stdin().is_terminal();
    info!(
        file = %args.file.display(),
        column = %args.column,
        interactive,
        "Starting generation"
    );

    let outcome = session::drive(controller, interactive).await?;

    let snapshot = store.dataset();
    let errors = snapshot
        .column_values(&args.column)
        .map(|values| values.into_iter().filter(|value| is_error_value(value)).count())
        .unwrap_or(0);

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let exported = tokio::task::spawn_blocking(move || gradebook::save_workbook(&snapshot, &output_dir))
        .await?
        .map_err(CliError::from)?;

    output::print_summary(&outcome.report, outcome.committed, errors, &exported);
    Ok(exported)
}
