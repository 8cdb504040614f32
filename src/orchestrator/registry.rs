//! In-language scenarios
//!
//! Scenarios whose logic does not fit the YAML step schema implement
//! `NativeScenario` and are registered explicitly under a module group.
//! Loading a group turns every registered scenario into a `TestScenario`
//! with no steps; the runner calls back into the registry to execute it.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use super::entity::EntityType;
use super::runner::ScenarioEnv;
use super::scenario::{ScenarioKind, ScenarioSource, TestScenario};
use crate::collaborator::Request;
use crate::common::{normalize_name, Error, Result};

/// Group holding the built-in scenarios
pub const SMOKE_GROUP: &str = "smoke";

/// Metadata describing a native scenario
#[derive(Debug, Clone)]
pub struct ScenarioInfo {
    /// Explicit id; derived from `source` and `name` when absent
    pub id: Option<&'static str>,
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    /// Entity types the scenario creates
    pub provides: &'static [EntityType],
    pub parallel: bool,
    /// Source file, normally `file!()`
    pub source: &'static str,
}

impl ScenarioInfo {
    /// `<source file stem>_<normalized name>` unless an id is given
    pub fn scenario_id(&self) -> String {
        if let Some(id) = self.id {
            return id.to_string();
        }
        let stem = Path::new(self.source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("native");
        format!("{}_{}", stem, normalize_name(self.name))
    }
}

/// A scenario implemented in Rust
#[async_trait]
pub trait NativeScenario: Send + Sync {
    /// Scenario metadata
    fn info(&self) -> &ScenarioInfo;

    /// Run the scenario; an error fails it
    async fn run(&self, env: &ScenarioEnv) -> Result<()>;
}

/// Native scenarios grouped by module name
#[derive(Default, Clone)]
pub struct ScenarioRegistry {
    groups: BTreeMap<String, Vec<Arc<dyn NativeScenario>>>,
}

impl ScenarioRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `smoke` group
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SMOKE_GROUP, Arc::new(Connectivity));
        registry.register(SMOKE_GROUP, Arc::new(CompanyRoundTrip));
        registry
    }

    pub fn register(&mut self, group: &str, scenario: Arc<dyn NativeScenario>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(scenario);
    }

    /// Registered group names
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Look up a scenario by its `<group>::<id>` key
    pub fn get(&self, key: &str) -> Option<Arc<dyn NativeScenario>> {
        let (group, id) = key.split_once("::")?;
        self.groups
            .get(group)?
            .iter()
            .find(|s| s.info().scenario_id() == id)
            .cloned()
    }

    /// Convert a group into scenario records
    pub fn load_group(&self, group: &str) -> Result<Vec<TestScenario>> {
        let scenarios = self.groups.get(group).ok_or_else(|| {
            Error::load(
                format!("module:{}", group),
                format!(
                    "no scenario module named '{}' (available: {})",
                    group,
                    self.groups().collect::<Vec<_>>().join(", ")
                ),
            )
        })?;

        Ok(scenarios
            .iter()
            .map(|native| {
                let info = native.info();
                let id = info.scenario_id();
                let mut scenario = TestScenario::new(id.clone(), info.name);
                scenario.description = Some(info.description.to_string())
                    .filter(|d| !d.is_empty());
                scenario.tags = info.tags.iter().map(|t| t.to_string()).collect();
                scenario.parallel = info.parallel;
                scenario.provides = info.provides.iter().copied().collect::<BTreeSet<_>>();
                scenario.source = ScenarioSource::Module(group.to_string());
                scenario.kind = ScenarioKind::Native {
                    key: format!("{}::{}", group, id),
                };
                scenario
            })
            .collect())
    }
}

/// Lists companies to prove the resource CLI is reachable and authenticated
struct Connectivity;

static CONNECTIVITY: ScenarioInfo = ScenarioInfo {
    id: Some("smoke_connectivity"),
    name: "Connectivity",
    description: "List companies through the resource CLI",
    tags: &["smoke"],
    provides: &[],
    parallel: true,
    source: file!(),
};

#[async_trait]
impl NativeScenario for Connectivity {
    fn info(&self) -> &ScenarioInfo {
        &CONNECTIVITY
    }

    async fn run(&self, env: &ScenarioEnv) -> Result<()> {
        let response = env
            .call(Request::List {
                entity: EntityType::Company,
                params: Default::default(),
            })
            .await?;
        let count = response.data().as_array().map(Vec::len).unwrap_or(0);
        let mode = if env.is_authenticated().await {
            "authenticated"
        } else {
            "no token configured"
        };
        env.log(format!(
            "resource CLI reachable ({}), {} companies visible",
            mode, count
        ));
        Ok(())
    }
}

/// Creates a company, reads it back and leaves it to cleanup
struct CompanyRoundTrip;

static COMPANY_ROUND_TRIP: ScenarioInfo = ScenarioInfo {
    id: Some("smoke_company_round_trip"),
    name: "Company round trip",
    description: "Create a company and read it back",
    tags: &["smoke"],
    provides: &[EntityType::Company],
    parallel: true,
    source: file!(),
};

#[async_trait]
impl NativeScenario for CompanyRoundTrip {
    fn info(&self) -> &ScenarioInfo {
        &COMPANY_ROUND_TRIP
    }

    async fn run(&self, env: &ScenarioEnv) -> Result<()> {
        let name = env.unique_name("e2e-company");
        let mut params = serde_json::Map::new();
        params.insert("companyName".to_string(), json!(name));
        env.create(EntityType::Company, params).await?;

        let fetched = env
            .call(Request::Get {
                entity: EntityType::Company,
                name: name.clone(),
                params: Default::default(),
            })
            .await?;
        if fetched.data()["companyName"] != json!(name) {
            return Err(Error::Assertion(format!(
                "company '{}' read back as {}",
                name,
                fetched.data()
            )));
        }

        env.set_var("smoke_company", json!(name)).await;
        env.log(format!("company '{}' created and read back", name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_group_loads() {
        let registry = ScenarioRegistry::with_builtins();
        let scenarios = registry.load_group(SMOKE_GROUP).unwrap();
        assert_eq!(scenarios.len(), 2);

        let round_trip = scenarios
            .iter()
            .find(|s| s.id == "smoke_company_round_trip")
            .unwrap();
        assert!(round_trip.is_native());
        assert!(round_trip.steps.is_empty());
        assert!(round_trip.produces().contains(&EntityType::Company));
        assert_eq!(round_trip.source.to_string(), "module:smoke");
        assert!(registry.get("smoke::smoke_company_round_trip").is_some());
    }

    #[test]
    fn test_unknown_group_is_load_error() {
        let registry = ScenarioRegistry::with_builtins();
        let err = registry.load_group("nightly").unwrap_err();
        assert_eq!(err.kind(), "LoadError");
        assert!(err.to_string().contains("available: smoke"));
    }

    #[test]
    fn test_derived_id_uses_source_stem() {
        let info = ScenarioInfo {
            id: None,
            name: "Team Lifecycle",
            description: "",
            tags: &[],
            provides: &[],
            parallel: false,
            source: "tests/native/teams.rs",
        };
        assert_eq!(info.scenario_id(), "teams_team_lifecycle");
    }

    #[test]
    fn test_get_rejects_malformed_key() {
        let registry = ScenarioRegistry::with_builtins();
        assert!(registry.get("smoke_connectivity").is_none());
        assert!(registry.get("other::smoke_connectivity").is_none());
    }
}
