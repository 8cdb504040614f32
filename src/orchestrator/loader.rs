//! Scenario loading
//!
//! Reads YAML scenario files (a single mapping or a sequence of them) and
//! registered native scenarios into `TestScenario` records. A malformed
//! scenario is reported and dropped; the rest of the input still loads.
//! Validation is a separate pass whose findings callers act on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::entity::EntityType;
use super::registry::ScenarioRegistry;
use super::scenario::{
    ScenarioDef, ScenarioKind, ScenarioSource, StepAction, StepDef, StepKind, TestScenario,
    TestStep,
};
use crate::common::{normalize_name, Error, Result};

/// Validation finding for one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub scenario_id: String,
    pub source: String,
    pub message: String,
}

/// Everything a load produced
#[derive(Debug, Default)]
pub struct LoadReport {
    pub scenarios: Vec<TestScenario>,
    pub warnings: Vec<String>,
    /// Scenarios or files that could not be loaded
    pub errors: Vec<Error>,
    /// Validation findings for loaded scenarios
    pub issues: Vec<ValidationIssue>,
}

impl LoadReport {
    /// Merge another report; a scenario whose id is already loaded is
    /// dropped together with its validation issues
    pub fn extend(&mut self, other: LoadReport) {
        let mut seen: HashSet<String> = self.scenarios.iter().map(|s| s.id.clone()).collect();
        let mut rejected: HashSet<String> = HashSet::new();
        for scenario in other.scenarios {
            if seen.insert(scenario.id.clone()) {
                self.scenarios.push(scenario);
            } else {
                self.errors.push(Error::load(
                    scenario.source.to_string(),
                    format!("duplicate scenario id '{}'", scenario.id),
                ));
                rejected.insert(scenario.id);
            }
        }
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        self.issues.extend(
            other
                .issues
                .into_iter()
                .filter(|issue| !rejected.contains(&issue.scenario_id)),
        );
    }

    /// Drop scenarios with validation findings, returning their messages
    pub fn exclude_invalid(&mut self) -> Vec<String> {
        let invalid: HashSet<&str> = self.issues.iter().map(|i| i.scenario_id.as_str()).collect();
        self.scenarios.retain(|s| !invalid.contains(s.id.as_str()));
        self.issues
            .iter()
            .map(|i| format!("{} ({}): {}", i.scenario_id, i.source, i.message))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.issues.is_empty()
    }
}

/// Loads scenarios from files and registered modules
pub struct Loader<'a> {
    registry: &'a ScenarioRegistry,
}

impl<'a> Loader<'a> {
    pub fn new(registry: &'a ScenarioRegistry) -> Self {
        Self { registry }
    }

    /// Load every scenario file under `paths`
    pub fn load_paths(&self, paths: &[PathBuf]) -> LoadReport {
        let mut report = LoadReport::default();
        let files = match discover(paths) {
            Ok(files) => files,
            Err(e) => {
                report.errors.push(e);
                return report;
            }
        };

        for file in files {
            report.extend(load_file(&file));
        }
        report
    }

    /// Load a registered module group
    pub fn load_module(&self, group: &str) -> LoadReport {
        let mut report = LoadReport::default();
        match self.registry.load_group(group) {
            Ok(scenarios) => report.scenarios = scenarios,
            Err(e) => report.errors.push(e),
        }
        report
    }
}

/// Find scenario files, recursing into directories
///
/// Files named explicitly are taken as-is; directories contribute their
/// `*.yaml` and `*.yml` files. The result is sorted.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut files)?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::FileRead {
        path: dir.display().to_string(),
        error: e.to_string(),
    })?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if is_scenario_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_scenario_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load all scenarios of one file
pub fn load_file(path: &Path) -> LoadReport {
    let mut report = LoadReport::default();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            report.errors.push(Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            });
            return report;
        }
    };

    let definitions = match parse_definitions(path, &content) {
        Ok(definitions) => definitions,
        Err(e) => {
            report.errors.push(e);
            return report;
        }
    };

    for definition in definitions {
        let def = match definition {
            Ok(def) => def,
            Err(e) => {
                report.errors.push(e);
                continue;
            }
        };

        let issues = validate_definition(&def);
        match build_scenario(def, path, &mut report.warnings) {
            Ok(scenario) => {
                let issues = issues
                    .into_iter()
                    .map(|message| ValidationIssue {
                        scenario_id: scenario.id.clone(),
                        source: path.display().to_string(),
                        message,
                    })
                    .collect();
                tracing::debug!(id = %scenario.id, path = %path.display(), "loaded scenario");
                report.extend(LoadReport {
                    scenarios: vec![scenario],
                    issues,
                    ..LoadReport::default()
                });
            }
            Err(e) => report.errors.push(e),
        }
    }
    report
}

/// Parse a file into scenario definitions
///
/// Invalid YAML fails the whole file; a sequence entry that does not match
/// the schema only fails that entry.
pub fn parse_definitions(path: &Path, content: &str) -> Result<Vec<Result<ScenarioDef>>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| Error::Yaml {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

    let entries = match document {
        serde_yaml::Value::Sequence(items) => items,
        serde_yaml::Value::Null => Vec::new(),
        other => vec![other],
    };

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_yaml::from_value::<ScenarioDef>(entry).map_err(|e| {
                Error::load(
                    path.display().to_string(),
                    format!("scenario #{}: {}", index + 1, e),
                )
            })
        })
        .collect())
}

/// Scenario id derived from the file stem and scenario name
pub fn derive_id(path: &Path, name: &str) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scenario");
    format!("{}_{}", stem, normalize_name(name))
}

/// Turn a definition into a scenario record
pub fn build_scenario(
    def: ScenarioDef,
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<TestScenario> {
    let source = path.display().to_string();
    let name = def
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::load(&source, "scenario is missing required field 'name'"))?;
    let id = def.id.unwrap_or_else(|| derive_id(path, &name));

    let mut dependencies = std::collections::BTreeMap::new();
    for (key, var) in def.dependencies {
        match key.parse::<EntityType>() {
            Ok(entity) => {
                dependencies.insert(entity, var);
            }
            Err(_) => warnings.push(format!(
                "{}: dependency on unknown entity type '{}' ignored",
                id, key
            )),
        }
    }

    let steps = convert_steps(&id, "step", def.steps, warnings)?;
    let cleanup = convert_steps(&id, "cleanup step", def.cleanup, warnings)?;

    Ok(TestScenario {
        name,
        description: def.description,
        tags: def.tags,
        dependencies,
        depends_on: def.depends_on,
        setup: def.setup,
        steps,
        cleanup,
        skip_cleanup: def.skip_cleanup,
        parallel: def.parallel,
        source: ScenarioSource::File(path.to_path_buf()),
        kind: ScenarioKind::Declarative,
        provides: Default::default(),
        id,
    })
}

fn convert_steps(
    scenario_id: &str,
    label: &str,
    defs: Vec<StepDef>,
    warnings: &mut Vec<String>,
) -> Result<Vec<TestStep>> {
    defs.into_iter()
        .enumerate()
        .map(|(index, def)| {
            convert_step(def, warnings, &format!("{} {} #{}", scenario_id, label, index + 1))
        })
        .collect()
}

fn convert_step(def: StepDef, warnings: &mut Vec<String>, location: &str) -> Result<TestStep> {
    let missing = |field: &str| {
        Error::load(
            location,
            format!("'{}' step requires '{}'", def.action, field),
        )
    };

    let kind = match def.action {
        StepAction::Create => StepKind::Create,
        StepAction::Update => StepKind::Update,
        StepAction::Delete => StepKind::Delete,
        StepAction::Verify => StepKind::Verify,
        StepAction::Wait => StepKind::Wait {
            seconds: def.seconds.ok_or_else(|| missing("seconds"))?,
        },
        StepAction::ExecuteRaw => {
            if def.args.is_empty() {
                return Err(missing("args"));
            }
            StepKind::ExecuteRaw {
                args: def.args.clone(),
            }
        }
        StepAction::Log => StepKind::Log {
            message: def.message.clone().ok_or_else(|| missing("message"))?,
        },
        StepAction::SetVar => StepKind::SetVar {
            var: def.var.clone().ok_or_else(|| missing("var"))?,
            value: def.value.clone().ok_or_else(|| missing("value"))?,
        },
    };

    let entity = if def.action.is_special() {
        None
    } else {
        match def.entity.as_deref().map(str::parse::<EntityType>) {
            Some(Ok(entity)) => Some(entity),
            Some(Err(_)) => {
                warnings.push(format!(
                    "{}: unknown entity type '{}'",
                    location,
                    def.entity.as_deref().unwrap_or_default()
                ));
                None
            }
            None => {
                warnings.push(format!("{}: '{}' step has no entity", location, def.action));
                None
            }
        }
    };

    Ok(TestStep {
        kind,
        entity,
        params: def.params,
        expect: def.expect,
        capture: def.capture,
        retry: def.retry,
        timeout: def.timeout.map(Duration::from_secs),
        continue_on_error: def.continue_on_error,
    })
}

/// Check a definition, returning human-readable problems
pub fn validate_definition(def: &ScenarioDef) -> Vec<String> {
    let mut errors = Vec::new();

    if def.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        errors.push("missing required field 'name'".to_string());
    }
    if def.steps.is_empty() {
        errors.push("scenario has no steps".to_string());
    }

    for key in def.dependencies.keys() {
        if key.parse::<EntityType>().is_err() {
            errors.push(format!("dependency on unknown entity type '{}'", key));
        }
    }

    let all_steps = def
        .steps
        .iter()
        .map(|s| ("step", s))
        .chain(def.cleanup.iter().map(|s| ("cleanup step", s)));
    for (index, (label, step)) in all_steps.enumerate() {
        if step.action.is_special() {
            continue;
        }
        match step.entity.as_deref() {
            None => errors.push(format!("{} {}: '{}' needs an entity", label, index + 1, step.action)),
            Some(entity) if entity.parse::<EntityType>().is_err() => errors.push(format!(
                "{} {}: unknown entity type '{}'",
                label,
                index + 1,
                entity
            )),
            Some(_) => {}
        }
    }

    errors
}

/// Scenario selection by id, tag and source
///
/// Empty criteria match everything; given criteria must all match.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub ids: Vec<String>,
    /// A scenario matches when it carries any of these tags
    pub tags: Vec<String>,
    /// File/directory paths or module group names
    pub sources: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.tags.is_empty() && self.sources.is_empty()
    }

    pub fn matches(&self, scenario: &TestScenario) -> bool {
        let id_ok = self.ids.is_empty() || self.ids.iter().any(|id| id == &scenario.id);
        let tag_ok = self.tags.is_empty() || self.tags.iter().any(|t| scenario.has_tag(t));
        let source_ok =
            self.sources.is_empty() || self.sources.iter().any(|s| source_matches(&scenario.source, s));
        id_ok && tag_ok && source_ok
    }

    /// Keep only matching scenarios
    pub fn apply(&self, scenarios: Vec<TestScenario>) -> Vec<TestScenario> {
        scenarios.into_iter().filter(|s| self.matches(s)).collect()
    }
}

fn source_matches(source: &ScenarioSource, wanted: &str) -> bool {
    match source {
        ScenarioSource::File(path) => path.starts_with(wanted),
        ScenarioSource::Module(group) => group == wanted || format!("module:{}", group) == wanted,
    }
}
