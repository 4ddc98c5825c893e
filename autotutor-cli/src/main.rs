mod cli;
mod commands;
mod config;
mod error;
mod output;
mod session;

use crate::cli::{Args, Commands};
use crate::config::AppConfig;
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "autotutor=info,autotutor_engine=info,gradebook=info";

#[tokio::main]
async fn main() {
    // A .env next to the workbook supplies AUTOTUTOR_* variables before clap reads them.
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {:#}", e);
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Columns { file } => commands::list_columns(&file).await?,
        Commands::Run(run_args) => {
            commands::run(config, run_args).await?;
        }
        Commands::Config { path } => commands::show_config(&config, path)?,
    }
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .init();
}
