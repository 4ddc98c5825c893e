use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "autotutor",
    version,
    about = "Fill a gradebook column with AI-written student comments",
    long_about = "Reads the first sheet of a workbook, asks a chat completions endpoint for one \
                  comment per student row and writes the results into the chosen column. \
                  While a run is active, type p (pause), r (resume), s (stop) or q (export and quit) \
                  followed by Enter."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to <config dir>/autotutor/config.toml)
    #[arg(short, long, global = true, env = "AUTOTUTOR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the columns of a workbook
    Columns {
        /// Workbook to inspect (xlsx, xls, xlsb, ods)
        file: PathBuf,
    },

    /// Generate comments for every row and export the result
    Run(RunArgs),

    /// Show the effective configuration
    Config {
        /// Print the configuration file path instead
        #[arg(long)]
        path: bool,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    /// Workbook to process (xlsx, xls, xlsb, ods)
    pub file: PathBuf,

    /// Column that receives the generated comments
    #[arg(short = 'k', long)]
    pub column: String,

    /// Directory for the exported workbook (defaults to the input's directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum concurrent requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Delay between request starts within a burst, in milliseconds
    #[arg(long)]
    pub stagger_ms: Option<u64>,

    /// Attempts per row, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Chat completions endpoint
    #[arg(long, env = "AUTOTUTOR_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Model name
    #[arg(long, env = "AUTOTUTOR_MODEL")]
    pub model: Option<String>,

    /// API key
    #[arg(long, env = "AUTOTUTOR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Do not read control commands from stdin
    #[arg(long)]
    pub no_interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "autotutor",
            "run",
            "grades.xlsx",
            "--column",
            "Weakness",
            "--concurrency",
            "3",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.file, PathBuf::from("grades.xlsx"));
        assert_eq!(run.column, "Weakness");
        assert_eq!(run.concurrency, Some(3));
        assert_eq!(run.stagger_ms, None);
    }

    #[test]
    fn test_run_requires_column() {
        assert!(Args::try_parse_from(["autotutor", "run", "grades.xlsx"]).is_err());
    }
}
