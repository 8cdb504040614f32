//! Configuration and data paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/fleet-cli/`
//! - macOS: `~/Library/Application Support/fleet-cli/`
//! - Windows: `%APPDATA%\fleet-cli\`

use std::path::PathBuf;

/// Application directory name
const APP_NAME: &str = "fleet-cli";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Get the default path for a run log file
pub fn default_run_log() -> Option<PathBuf> {
    log_dir().map(|d| d.join("run.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_run_log_lives_in_log_dir() {
        if let (Some(log), Some(dir)) = (default_run_log(), log_dir()) {
            assert!(log.starts_with(dir));
        }
    }
}
