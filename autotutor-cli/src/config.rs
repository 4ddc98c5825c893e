//! Layered CLI configuration: defaults, then the TOML file, then flags and
//! environment variables (clap resolves those two).

use autotutor_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for exported workbooks.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autotutor").join("config.toml"))
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) if !path.exists() => return Err(CliError::ConfigNotFound(path.into())),
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text).map_err(|source| CliError::ConfigParse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Flags (and their environment fallbacks) win over the file.
    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(concurrency) = args.concurrency {
            self.engine.pool.concurrency = concurrency;
        }
        if let Some(stagger_ms) = args.stagger_ms {
            self.engine.pool.stagger_ms = stagger_ms;
        }
        if let Some(max_attempts) = args.max_attempts {
            self.engine.retry.max_attempts = max_attempts;
        }
        if let Some(endpoint) = &args.endpoint {
            self.engine.generator.endpoint = endpoint.clone();
        }
        if let Some(model) = &args.model {
            self.engine.generator.model = model.clone();
        }
        if let Some(api_key) = &args.api_key {
            self.engine.generator.api_key = Some(api_key.clone());
        }
        if let Some(dir) = &args.output {
            self.output.dir = Some(dir.clone());
        }
    }

    /// TOML rendering with the API key masked.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.engine.generator.api_key.is_some() {
            shown.engine.generator.api_key = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Where the export for `input` goes.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        if let Some(dir) = &self.output.dir {
            return dir.clone();
        }
        match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_overrides_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [pool]
            concurrency = 3

            [retry]
            max_attempts = 4

            [generator]
            model = "qwen-max"
            api_key = "sk-file"

            [output]
            dir = "/tmp/exports"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.pool.concurrency, 3);
        assert_eq!(config.engine.pool.stagger_ms, 200);
        assert_eq!(config.engine.retry.max_attempts, 4);
        assert_eq!(config.engine.retry.base_delay_ms, 500);
        assert_eq!(config.engine.generator.model, "qwen-max");
        assert_eq!(config.engine.generator.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.output.dir, Some(PathBuf::from("/tmp/exports")));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = AppConfig::from_toml("[pool]\nconcurrency = 3\n").unwrap();
        config.apply_run_args(&RunArgs {
            concurrency: Some(8),
            max_attempts: Some(2),
            model: Some("flag-model".into()),
            ..RunArgs::default()
        });
        assert_eq!(config.engine.pool.concurrency, 8);
        assert_eq!(config.engine.retry.max_attempts, 2);
        assert_eq!(config.engine.generator.model, "flag-model");
        assert_eq!(config.engine.pool.stagger_ms, 200);
    }

    #[test]
    fn test_show_masks_api_key() {
        let mut config = AppConfig::default();
        config.engine.generator.api_key = Some("sk-secret".into());
        let shown = config.show().unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(CliError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[generator]\nmodel = \"from-disk\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.generator.model, "from-disk");
    }

    #[test]
    fn test_output_dir_defaults_to_input_parent() {
        let config = AppConfig::default();
        assert_eq!(
            config.output_dir_for(Path::new("/data/grades.xlsx")),
            PathBuf::from("/data")
        );
        assert_eq!(config.output_dir_for(Path::new("grades.xlsx")), PathBuf::from("."));
    }
}
