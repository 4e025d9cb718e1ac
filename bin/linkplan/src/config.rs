//! Layered configuration: defaults, then Linkplan.toml, then LINKPLAN_* variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use linkplan_solver::{ExecutionMode, PROGRESS_FILENAME};
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

/// The default name for the linkplan configuration file.
pub const CONFIG_FILENAME: &str = "Linkplan.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "LINKPLAN_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where progress is stored between runs.
    pub progress_file: PathBuf,
    /// How `run` walks the plan.
    pub mode: ExecutionMode,
    /// Shell command run per step. Steps are only logged when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    /// How plans are printed.
    pub format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from(PROGRESS_FILENAME),
            mode: ExecutionMode::default(),
            exec: None,
            format: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Otherwise `Linkplan.toml` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(CONFIG_FILENAME),
        };

        Self::figment(&file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).only(&["progress_file", "mode", "exec", "format"]))
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let config = Config::figment(&temp_dir.path().join(CONFIG_FILENAME))
            .extract::<Config>()
            .expect("defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "mode = \"levels\"\nexec = \"forge create {contract}\"\n")
            .expect("Failed to write config");

        let config = Config::load(Some(&path)).expect("config");

        assert_eq!(config.mode, ExecutionMode::Levels);
        assert_eq!(config.exec.as_deref(), Some("forge create {contract}"));
        assert_eq!(config.format, OutputFormat::Table);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);

        let config = Config {
            progress_file: PathBuf::from("state/progress.json"),
            mode: ExecutionMode::Levels,
            exec: None,
            format: OutputFormat::Json,
        };
        config.save_to_file(&path).expect("save");

        assert_eq!(Config::load(Some(&path)).expect("load"), config);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        assert!(Config::load(Some(&temp_dir.path().join("absent.toml"))).is_err());
    }
}
