//! End-to-end tests for the scenario orchestrator
//!
//! Library tests drive the runner against the in-memory collaborator.
//! Binary tests run the `fleet` executable with an isolated config
//! directory and only use `--dry-run`, so no resource CLI is needed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use fleet::collaborator::MemoryCollaborator;
use fleet::orchestrator::entity::EntityType;
use fleet::orchestrator::loader::{build_scenario, Loader};
use fleet::orchestrator::{DependencyGraph, ScenarioRegistry, TestStatus};
use fleet::{RunOptions, Runner, TestScenario};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn scenario(yaml: &str) -> TestScenario {
    let def = serde_yaml::from_str(yaml).expect("scenario yaml");
    build_scenario(def, Path::new("inline.yaml"), &mut Vec::new()).expect("scenario")
}

fn load_fixture(name: &str) -> Vec<TestScenario> {
    let registry = ScenarioRegistry::new();
    let report = Loader::new(&registry).load_paths(&[fixtures_dir().join(name)]);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    report.scenarios
}

#[tokio::test]
async fn test_fixture_chain_runs_and_cleans_up_in_reverse() {
    let scenarios = load_fixture("chain.yaml");
    assert_eq!(scenarios.len(), 2);

    let memory = MemoryCollaborator::new();
    let runner = Runner::new(Arc::new(memory.clone()), RunOptions::default());
    let report = runner.run(scenarios).await.unwrap();

    let ids: Vec<&str> = report.results.iter().map(|r| r.scenario_id.as_str()).collect();
    assert_eq!(ids, vec!["chain_team", "chain_machine"]);
    assert!(
        report.results.iter().all(|r| r.status == TestStatus::Passed),
        "{:?}",
        report.results
    );

    let deleted = memory.deleted();
    assert_eq!(deleted.len(), 2);
    assert!(deleted[0].starts_with("machine-"));
    assert!(deleted[1].starts_with("team-"));
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_failed_team_skips_machine() {
    let memory = MemoryCollaborator::new();
    memory.fail_on("create", EntityType::Team);
    let options = RunOptions {
        stop_on_failure: false,
        ..RunOptions::default()
    };
    let report = Runner::new(Arc::new(memory.clone()), options)
        .run(load_fixture("chain.yaml"))
        .await
        .unwrap();

    assert_eq!(report.result("chain_team").unwrap().status, TestStatus::Failed);
    let machine = report.result("chain_machine").unwrap();
    assert_eq!(machine.status, TestStatus::Skipped);
    assert!(machine.message.as_deref().unwrap_or("").contains("chain_team"));

    let summary = report.summary();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn test_disjoint_scenarios_share_first_batch() {
    let scenarios: Vec<TestScenario> = ["a", "b", "c"]
        .iter()
        .map(|id| {
            scenario(&format!(
                "id: {id}\nname: Log {id}\nsteps:\n  - action: log\n    message: hi\n"
            ))
        })
        .collect();

    let batches = DependencyGraph::new(&scenarios).execution_order().unwrap();
    assert_eq!(batches, vec![vec!["a", "b", "c"]]);
}

#[test]
fn test_depends_on_cycle_is_reported() {
    let a = scenario("id: a\nname: A\ndepends_on: [b]\nsteps:\n  - action: log\n    message: a\n");
    let b = scenario("id: b\nname: B\ndepends_on: [a]\nsteps:\n  - action: log\n    message: b\n");

    let err = DependencyGraph::new(&[a, b]).execution_order().unwrap_err();
    assert_eq!(err.kind(), "CycleError");
}

/// Output of one binary invocation
#[derive(Debug)]
struct FleetOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

fn run_fleet(args: &[&str]) -> FleetOutput {
    let config_home = tempfile::tempdir().expect("temp config dir");
    let output = Command::new(env!("CARGO_BIN_EXE_fleet"))
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env("NO_COLOR", "1")
        .env_remove("CLICOLOR_FORCE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run fleet");

    FleetOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

#[test]
fn test_entities_command_prints_creation_order() {
    let output = run_fleet(&["entities"]);
    assert!(output.success, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("machine"));
    assert!(output.stdout.contains("Creation order:"));
}

#[test]
fn test_validate_accepts_good_and_rejects_broken_files() {
    let output = run_fleet(&["validate", "tests/fixtures/chain.yaml"]);
    assert!(output.success, "stdout: {}\nstderr: {}", output.stdout, output.stderr);
    assert!(output.stdout.contains("2 scenario(s) valid"));

    let output = run_fleet(&["validate", "tests/fixtures/broken.yaml"]);
    assert!(!output.success);
    assert!(output.stdout.contains("planet"));
}

#[test]
fn test_plan_shows_batches() {
    let output = run_fleet(&["plan", "tests/fixtures/chain.yaml"]);
    assert!(output.success, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("1. chain_team"));
    assert!(output.stdout.contains("2. chain_machine"));
    assert!(output.stdout.contains("chain_machine → chain_team"));
}

#[test]
fn test_dry_run_reports_json() {
    let output = run_fleet(&[
        "run",
        "--dry-run",
        "--format",
        "json",
        "tests/fixtures/chain.yaml",
    ]);
    assert!(output.success, "stdout: {}\nstderr: {}", output.stdout, output.stderr);

    let report: serde_json::Value = serde_json::from_str(&output.stdout).expect("json report");
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["passed"], 2);
    assert_eq!(report["cleanup"]["deleted"], 2);
}

#[test]
fn test_dry_run_smoke_module() {
    let output = run_fleet(&["run", "--dry-run", "--module", "smoke"]);
    assert!(output.success, "stdout: {}\nstderr: {}", output.stdout, output.stderr);
    assert!(output.stdout.contains("2 passed"));
}

#[test]
fn test_unknown_module_fails_validation() {
    let output = run_fleet(&["validate", "--module", "nope"]);
    assert!(!output.success);
    assert!(output.stdout.contains("smoke"));
}

#[test]
fn test_source_filter_keeps_only_matching_scenarios() {
    let output = run_fleet(&[
        "run",
        "--dry-run",
        "--format",
        "json",
        "--module",
        "smoke",
        "--source",
        "module:smoke",
        "tests/fixtures/chain.yaml",
    ]);
    assert!(output.success, "stdout: {}\nstderr: {}", output.stdout, output.stderr);

    let report: serde_json::Value = serde_json::from_str(&output.stdout).expect("json report");
    assert_eq!(report["summary"]["total"], 2);
    let ids: Vec<&str> = report["results"]
        .as_array()
        .expect("results")
        .iter()
        .filter_map(|r| r["scenario_id"].as_str())
        .collect();
    assert!(ids.iter().all(|id| id.starts_with("smoke_")), "{:?}", ids);
}

#[test]
fn test_plan_ignores_expected_failure_creates() {
    let output = run_fleet(&["plan", "scenarios"]);
    assert!(output.success, "stderr: {}", output.stderr);
    let machine_line = output
        .stdout
        .lines()
        .find(|line| line.trim_start().starts_with("infra_machine after"))
        .expect("infra_machine dependencies");
    assert!(!machine_line.contains("negative_duplicate_team"), "{}", machine_line);
}
