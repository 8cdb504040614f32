//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable overriding the API token
pub const TOKEN_ENV: &str = "FLEET_TOKEN";

/// Environment variable overriding the vault master password
pub const MASTER_PASSWORD_ENV: &str = "FLEET_MASTER_PASSWORD";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// External resource CLI settings
    #[serde(default)]
    pub collaborator: CollaboratorConfig,

    /// Scenario runner defaults
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Credentials handed to the collaborator
    #[serde(default)]
    pub auth: AuthConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// When tracked resources are torn down after a run
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Always run cleanup
    #[default]
    Always,
    /// Keep resources when any scenario failed, clean up otherwise
    KeepOnFailure,
    /// Never run cleanup
    Never,
}

/// Configuration for the external resource CLI
#[derive(Debug, Deserialize, Clone)]
pub struct CollaboratorConfig {
    /// Program name or path of the resource CLI
    #[serde(default = "default_program")]
    pub program: String,

    /// Extra arguments placed before every invocation
    #[serde(default)]
    pub args: Vec<String>,

    /// Run the collaborator in verbose mode
    #[serde(default)]
    pub verbose: bool,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            verbose: false,
        }
    }
}

fn default_program() -> String {
    "fleetctl".to_string()
}

/// Scenario runner defaults
#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// Maximum concurrent scenarios and collaborator calls
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Abandon remaining batches once a scenario failed
    #[serde(default = "default_stop_on_failure")]
    pub stop_on_failure: bool,

    /// Cleanup policy after the run
    #[serde(default)]
    pub cleanup: CleanupPolicy,

    /// Directories searched when no scenario path is given
    #[serde(default = "default_scenario_dirs")]
    pub scenario_dirs: Vec<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            stop_on_failure: default_stop_on_failure(),
            cleanup: CleanupPolicy::default(),
            scenario_dirs: default_scenario_dirs(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_stop_on_failure() -> bool {
    true
}
fn default_scenario_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("scenarios")]
}

/// Credentials for the remote service
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AuthConfig {
    /// API token
    pub token: Option<String>,
    /// Vault master password
    pub master_password: Option<String>,
}

/// Log output settings
#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write logs to the run log file in the data directory
    #[serde(default)]
    pub file: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist. Credentials from
    /// the environment take precedence over the file.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        if config.runner.workers == 0 {
            return Err(Error::Config("runner.workers must be at least 1".to_string()));
        }
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            self.auth.token = Some(token);
        }
        if let Ok(password) = std::env::var(MASTER_PASSWORD_ENV) {
            self.auth.master_password = Some(password);
        }
    }

    /// Resolve the collaborator program
    ///
    /// Paths are used as-is, bare names are searched in PATH.
    pub fn collaborator_program(&self) -> Result<PathBuf> {
        let program = Path::new(&self.collaborator.program);
        if program.components().count() > 1 {
            return Ok(program.to_path_buf());
        }
        which::which(&self.collaborator.program).map_err(|_| {
            Error::Config(format!(
                "Resource CLI '{}' not found in PATH. Set collaborator.program in {}",
                self.collaborator.program,
                config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "config.toml".to_string())
            ))
        })
    }
}
