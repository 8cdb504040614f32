//! Error types for the fleet CLI
//!
//! Variants are grouped by how the orchestrator treats them: load errors drop
//! a scenario, cycle errors abort the run, step errors fail one scenario and
//! cleanup errors are only logged.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the fleet CLI
#[derive(Error, Debug)]
pub enum Error {
    // === Load Errors ===
    #[error("Failed to load scenario from '{source_path}': {message}")]
    Load {
        source_path: String,
        message: String,
    },

    #[error("Invalid scenario YAML in '{path}': {error}")]
    Yaml { path: String, error: String },

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Unknown entity type '{0}'")]
    UnknownEntity(String),

    // === Scheduling Errors ===
    #[error("Dependency cycle detected between scenarios: {}", .remaining.join(", "))]
    Cycle { remaining: Vec<String> },

    // === Step Errors ===
    #[error("Step failed: {0}")]
    Step(String),

    #[error("Variable '{name}' is not defined")]
    VariableResolution { name: String },

    #[error("{operation} {entity} failed: {message}")]
    Collaborator {
        operation: String,
        entity: String,
        message: String,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === Cleanup Errors ===
    #[error("Cleanup of {entity} '{name}' failed: {message}")]
    Cleanup {
        entity: String,
        name: String,
        message: String,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Run Control ===
    #[error("Run interrupted; resources created by the running batch were not cleaned up")]
    Interrupted,

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a load error for a scenario source
    pub fn load(source_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            source_path: source_path.into(),
            message: message.into(),
        }
    }

    /// Create a collaborator failure error
    pub fn collaborator(operation: &str, entity: &str, message: &str) -> Self {
        Self::Collaborator {
            operation: operation.to_string(),
            entity: entity.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a cleanup error
    pub fn cleanup(entity: &str, name: &str, message: &str) -> Self {
        Self::Cleanup {
            entity: entity.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    /// Taxonomy name reported alongside failed scenarios
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Load { .. }
            | Error::Yaml { .. }
            | Error::FileRead { .. }
            | Error::UnknownEntity(_) => "LoadError",
            Error::Cycle { .. } => "CycleError",
            Error::VariableResolution { .. } => "VariableResolutionError",
            Error::Step(_) | Error::Collaborator { .. } | Error::Assertion(_) => "StepError",
            Error::Cleanup { .. } => "CleanupError",
            Error::Config(_) | Error::ConfigParse(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Interrupted => "Interrupted",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Whether this error belongs to the step error family
    pub fn is_step_error(&self) -> bool {
        matches!(
            self,
            Error::Step(_)
                | Error::VariableResolution { .. }
                | Error::Collaborator { .. }
                | Error::Assertion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_resolution_is_step_error() {
        let err = Error::VariableResolution {
            name: "team".to_string(),
        };
        assert!(err.is_step_error());
        assert_eq!(err.kind(), "VariableResolutionError");
        assert_eq!(err.to_string(), "Variable 'team' is not defined");
    }

    #[test]
    fn test_cycle_message_lists_scenarios() {
        let err = Error::Cycle {
            remaining: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected between scenarios: a, b"
        );
        assert!(!err.is_step_error());
    }
}
