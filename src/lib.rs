//! fleet - scenario orchestration for a resource-management CLI
//!
//! Scenarios declare the entities they create and need. The orchestrator
//! orders them into parallel batches, runs their steps through a
//! collaborator that wraps the resource CLI, and cleans up in reverse
//! dependency order.

pub mod cli;
pub mod collaborator;
pub mod commands;
pub mod common;
pub mod orchestrator;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use orchestrator::{RunOptions, Runner, TestScenario};
