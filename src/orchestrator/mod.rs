//! Dependency-aware scenario orchestration
//!
//! Scenarios are loaded from YAML files or registered native modules,
//! ordered into batches by the entities they create and need, executed
//! against the resource CLI and torn down in reverse order.

pub mod context;
pub mod entity;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod result;
pub mod runner;
pub mod scenario;

pub use context::TestContext;
pub use entity::EntityType;
pub use graph::DependencyGraph;
pub use loader::{LoadReport, Loader, Selection};
pub use registry::{NativeScenario, ScenarioInfo, ScenarioRegistry};
pub use result::{CleanupSummary, RunReport, TestResult, TestStatus};
pub use runner::{RunOptions, Runner, ScenarioEnv};
pub use scenario::{TestScenario, TestStep};
