//! Common utilities shared across the CLI and the orchestrator

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Normalize a scenario name into an id fragment
///
/// Spaces become underscores and the result is lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Create Team Basic"), "create_team_basic");
        assert_eq!(normalize_name("  machine  "), "machine");
    }
}
