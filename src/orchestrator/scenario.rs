//! Scenario definitions and loaded scenario records
//!
//! `ScenarioDef`/`StepDef` mirror the YAML schema and are what validation
//! inspects. The loader turns them into immutable `TestScenario`/`TestStep`
//! records that the scheduler and runner consume.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::entity::{transitive_dependencies, EntityType};

/// A scenario as written in a YAML file
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioDef {
    /// Name of the scenario (required)
    pub name: Option<String>,
    /// Stable id; derived from the file name and `name` when absent
    pub id: Option<String>,
    /// What the scenario verifies
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Entity type -> variable holding the instance this scenario builds on
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Scenario ids that must run first
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub setup: Vec<SetupAction>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub cleanup: Vec<StepDef>,
    #[serde(default)]
    pub skip_cleanup: bool,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

/// A step as written in a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct StepDef {
    pub action: StepAction,
    /// Entity type name; kept raw so unknown names only warn
    pub entity: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub expect: Map<String, Value>,
    /// Variable name -> JSON path into the step response
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: u32,
    /// Timeout in seconds
    pub timeout: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Wait duration in seconds (`wait`)
    pub seconds: Option<f64>,
    /// Raw collaborator arguments (`execute_raw`)
    #[serde(default)]
    pub args: Vec<String>,
    /// Message to log (`log`)
    pub message: Option<String>,
    /// Variable to assign (`set_var`)
    pub var: Option<String>,
    /// Value to assign (`set_var`)
    pub value: Option<Value>,
}

/// Step action as named in scenario files
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Create,
    Update,
    Delete,
    Verify,
    Wait,
    ExecuteRaw,
    Log,
    SetVar,
}

impl StepAction {
    /// Actions that do not operate on an entity type
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            StepAction::Wait | StepAction::ExecuteRaw | StepAction::Log | StepAction::SetVar
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Create => "create",
            StepAction::Update => "update",
            StepAction::Delete => "delete",
            StepAction::Verify => "verify",
            StepAction::Wait => "wait",
            StepAction::ExecuteRaw => "execute_raw",
            StepAction::Log => "log",
            StepAction::SetVar => "set_var",
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action run before a scenario's steps
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SetupAction {
    /// Assign a unique resource name (`<prefix>-<random>`)
    UniqueName {
        var: String,
        #[serde(default = "default_name_prefix")]
        prefix: String,
    },
    /// Assign a unique e-mail address
    UniqueEmail {
        var: String,
        #[serde(default = "default_email_domain")]
        domain: String,
    },
    /// Assign a literal value
    Set { var: String, value: Value },
}

fn default_name_prefix() -> String {
    "e2e".to_string()
}

fn default_email_domain() -> String {
    "example.test".to_string()
}

/// What a loaded step does
///
/// Entity actions share the step's entity, params and expectations; the
/// special actions carry their own payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Create,
    Update,
    Delete,
    Verify,
    Wait { seconds: f64 },
    ExecuteRaw { args: Vec<String> },
    Log { message: String },
    SetVar { var: String, value: Value },
}

impl StepKind {
    pub fn action(&self) -> StepAction {
        match self {
            StepKind::Create => StepAction::Create,
            StepKind::Update => StepAction::Update,
            StepKind::Delete => StepAction::Delete,
            StepKind::Verify => StepAction::Verify,
            StepKind::Wait { .. } => StepAction::Wait,
            StepKind::ExecuteRaw { .. } => StepAction::ExecuteRaw,
            StepKind::Log { .. } => StepAction::Log,
            StepKind::SetVar { .. } => StepAction::SetVar,
        }
    }
}

/// A loaded, immutable test step
#[derive(Debug, Clone, PartialEq)]
pub struct TestStep {
    pub kind: StepKind,
    /// Absent for special actions and for unknown entity names
    pub entity: Option<EntityType>,
    pub params: Map<String, Value>,
    pub expect: Map<String, Value>,
    pub capture: BTreeMap<String, String>,
    /// Parsed but not consulted by the runner
    pub retry: u32,
    /// Advisory only
    pub timeout: Option<Duration>,
    pub continue_on_error: bool,
}

impl TestStep {
    /// Build an entity step with no expectations or captures
    pub fn entity(kind: StepKind, entity: EntityType, params: Map<String, Value>) -> Self {
        Self {
            kind,
            entity: Some(entity),
            params,
            expect: Map::new(),
            capture: BTreeMap::new(),
            retry: 0,
            timeout: None,
            continue_on_error: false,
        }
    }

    /// Whether the step asserts that the collaborator call fails
    pub fn expects_failure(&self) -> bool {
        self.expect.get("success").and_then(Value::as_bool) == Some(false)
    }

    /// Short human-readable label, e.g. `create team`
    pub fn label(&self) -> String {
        match self.entity {
            Some(entity) => format!("{} {}", self.kind.action(), entity),
            None => self.kind.action().to_string(),
        }
    }
}

/// Where a scenario was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum ScenarioSource {
    File(PathBuf),
    Module(String),
}

impl fmt::Display for ScenarioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioSource::File(path) => write!(f, "{}", path.display()),
            ScenarioSource::Module(group) => write!(f, "module:{}", group),
        }
    }
}

/// How a scenario executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Steps from a scenario file
    Declarative,
    /// Custom logic registered in a `ScenarioRegistry`
    Native { key: String },
}

/// A loaded scenario; never mutated after loading
#[derive(Debug, Clone, PartialEq)]
pub struct TestScenario {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: BTreeMap<EntityType, String>,
    pub depends_on: Vec<String>,
    pub setup: Vec<SetupAction>,
    pub steps: Vec<TestStep>,
    pub cleanup: Vec<TestStep>,
    pub skip_cleanup: bool,
    pub parallel: bool,
    pub source: ScenarioSource,
    pub kind: ScenarioKind,
    /// Entity types a native scenario creates
    pub provides: BTreeSet<EntityType>,
}

impl TestScenario {
    /// Minimal declarative scenario, mostly useful when building scenarios in code
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            dependencies: BTreeMap::new(),
            depends_on: Vec::new(),
            setup: Vec::new(),
            steps: Vec::new(),
            cleanup: Vec::new(),
            skip_cleanup: false,
            parallel: true,
            source: ScenarioSource::Module("inline".to_string()),
            kind: ScenarioKind::Declarative,
            provides: BTreeSet::new(),
            id,
        }
    }

    /// Entity types this scenario creates
    pub fn produces(&self) -> BTreeSet<EntityType> {
        let mut produced = self.provides.clone();
        produced.extend(
            self.steps
                .iter()
                .filter(|s| s.kind == StepKind::Create && !s.expects_failure())
                .filter_map(|s| s.entity),
        );
        produced
    }

    /// Entity types that must exist before this scenario runs
    ///
    /// Declared dependencies plus everything the created entity types
    /// transitively depend on, except types the scenario creates itself.
    pub fn requires(&self) -> BTreeSet<EntityType> {
        let produced = self.produces();
        let mut required: BTreeSet<EntityType> = self.dependencies.keys().copied().collect();
        for entity in &produced {
            required.extend(
                transitive_dependencies(*entity)
                    .into_iter()
                    .filter(|dep| !produced.contains(dep)),
            );
        }
        required
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, ScenarioKind::Native { .. })
    }
}
