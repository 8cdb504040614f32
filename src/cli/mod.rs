//! CLI command handling
//!
//! Loads scenarios, drives the runner and formats output.

pub mod report;

use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collaborator::{Collaborator, MemoryCollaborator, ProcessCollaborator};
use crate::commands::{Commands, ReportFormat};
use crate::common::config::{CleanupPolicy, Config};
use crate::common::{Error, Result};
use crate::orchestrator::entity::{global_topological_order, EntityType, LookupMethod};
use crate::orchestrator::graph::DependencyGraph;
use crate::orchestrator::loader::{LoadReport, Loader, Selection};
use crate::orchestrator::registry::ScenarioRegistry;
use crate::orchestrator::runner::{RunOptions, Runner};
use crate::orchestrator::scenario::ScenarioKind;
use crate::orchestrator::TestContext;

/// Dispatch a CLI command
///
/// Returns `false` when the command ran but should exit with a failure
/// status (failed scenarios, invalid scenario files).
pub async fn dispatch(command: Commands, config: Config, verbose: bool) -> Result<bool> {
    let registry = ScenarioRegistry::with_builtins();

    match command {
        Commands::Run {
            paths,
            ids,
            tags,
            sources,
            modules,
            workers,
            continue_on_failure,
            skip_cleanup,
            keep_on_failure,
            format,
            output,
            diagnose,
            dry_run,
        } => {
            let mut load = load_sources(&registry, &config, &paths, &modules);
            let mut errors = log_load_problems(&load);
            for excluded in load.exclude_invalid() {
                tracing::warn!("excluding invalid scenario {}", excluded);
                errors.push(excluded);
            }

            let selection = Selection { ids, tags, sources };
            let scenarios = selection.apply(std::mem::take(&mut load.scenarios));
            if scenarios.is_empty() {
                tracing::warn!("no scenarios selected");
            }

            let mut options = RunOptions::from_config(&config.runner);
            if let Some(workers) = workers {
                if workers == 0 {
                    return Err(Error::Config("--workers must be at least 1".to_string()));
                }
                options.workers = workers;
            }
            if continue_on_failure {
                options.stop_on_failure = false;
            }
            if skip_cleanup {
                options.cleanup = CleanupPolicy::Never;
            } else if keep_on_failure {
                options.cleanup = CleanupPolicy::KeepOnFailure;
            }
            options.diagnose = diagnose;

            let context = TestContext::from_env()
                .with_credentials(config.auth.token.clone(), config.auth.master_password.clone());

            let collaborator: Arc<dyn Collaborator> = if dry_run {
                tracing::info!("dry run against the in-memory collaborator");
                Arc::new(MemoryCollaborator::new())
            } else {
                Arc::new(
                    ProcessCollaborator::from_config(&config)?
                        .with_credentials(
                            context.auth_token.clone(),
                            context.master_password.clone(),
                        )
                        .with_verbose(verbose || config.collaborator.verbose),
                )
            };

            let runner = Runner::new(collaborator, options)
                .with_registry(Arc::new(registry))
                .with_context(context);

            let mut report = tokio::select! {
                report = runner.run(scenarios) => report?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupted, resources created by the running batch were not cleaned up");
                    return Err(Error::Interrupted);
                }
            };
            report.errors.extend(errors);

            if output.is_some() || format != ReportFormat::Table {
                colored::control::set_override(false);
            }
            let rendered = report::render(&report, format)?;
            colored::control::unset_override();

            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Report written to {}", path.display());
                }
                None => print!("{}", rendered),
            }

            Ok(!report.has_failures())
        }

        Commands::List { paths, modules } => {
            let load = load_sources(&registry, &config, &paths, &modules);
            log_load_problems(&load);

            if load.scenarios.is_empty() {
                println!("No scenarios found");
                return Ok(true);
            }

            println!(
                "{}",
                format!("{:<40}  {:<8}  {:<24}  {}", "ID", "KIND", "TAGS", "SOURCE").bold()
            );
            for scenario in &load.scenarios {
                let kind = match scenario.kind {
                    ScenarioKind::Declarative => "yaml",
                    ScenarioKind::Native { .. } => "native",
                };
                println!(
                    "{:<40}  {:<8}  {:<24}  {}",
                    scenario.id,
                    kind,
                    scenario.tags.join(","),
                    scenario.source.to_string().dimmed()
                );
            }
            println!("\n{} scenario(s)", load.scenarios.len());
            Ok(true)
        }

        Commands::Validate { paths, modules } => {
            let load = load_sources(&registry, &config, &paths, &modules);

            for warning in &load.warnings {
                println!("  {} {}", "!".yellow(), warning);
            }
            for error in &load.errors {
                println!("  {} {} [{}]", "✗".red(), error, error.kind());
            }
            for issue in &load.issues {
                println!(
                    "  {} {} ({}): {}",
                    "✗".red(),
                    issue.scenario_id,
                    issue.source.dimmed(),
                    issue.message
                );
            }

            let invalid = load.errors.len() + load.issues.len();
            if invalid == 0 {
                println!(
                    "{} {} scenario(s) valid",
                    "✓".green().bold(),
                    load.scenarios.len()
                );
                Ok(true)
            } else {
                println!("{} {} problem(s) found", "✗".red().bold(), invalid);
                Ok(false)
            }
        }

        Commands::Plan {
            paths,
            ids,
            tags,
            sources,
            modules,
        } => {
            let mut load = load_sources(&registry, &config, &paths, &modules);
            log_load_problems(&load);
            for excluded in load.exclude_invalid() {
                println!("  {} excluded: {}", "!".yellow(), excluded);
            }

            let selection = Selection { ids, tags, sources };
            let scenarios = selection.apply(std::mem::take(&mut load.scenarios));
            let graph = DependencyGraph::new(&scenarios);
            let batches = graph.execution_order()?;

            println!("{}", "Execution batches:".cyan());
            for (index, batch) in batches.iter().enumerate() {
                println!("  {} {}", format!("{}.", index + 1).bold(), batch.join(", "));
                for id in batch {
                    let deps: Vec<&str> = graph.edges_of(id).collect();
                    if !deps.is_empty() {
                        println!("     {} after {}", id.dimmed(), deps.join(", ").dimmed());
                    }
                }
            }

            println!("\n{}", "Cleanup order:".cyan());
            println!("  {}", graph.cleanup_order()?.join(" → "));
            Ok(true)
        }

        Commands::Entities => {
            println!(
                "{}",
                format!(
                    "{:<12}  {:<22}  {:<16}  {}",
                    "ENTITY", "DEPENDS ON", "NAME FIELD", "LOOKUP"
                )
                .bold()
            );
            for entity in EntityType::ALL {
                let deps: Vec<&str> = entity.direct_dependencies().iter().map(|e| e.as_str()).collect();
                let lookup = entity.lookup();
                let method = match lookup.method {
                    LookupMethod::Get => "get".to_string(),
                    LookupMethod::List if lookup.context_params.is_empty() => "list".to_string(),
                    LookupMethod::List => format!("list by {}", lookup.context_params.join(", ")),
                };
                println!(
                    "{:<12}  {:<22}  {:<16}  {}",
                    entity.as_str(),
                    if deps.is_empty() { "-".to_string() } else { deps.join(", ") },
                    lookup.name_field,
                    method
                );
            }

            let order: Vec<&str> = global_topological_order()?
                .into_iter()
                .map(|e| e.as_str())
                .collect();
            println!("\n{} {}", "Creation order:".cyan(), order.join(" → "));
            Ok(true)
        }
    }
}

/// Load scenario files and modules
///
/// With neither paths nor modules, the configured scenario directories that
/// exist are used.
fn load_sources(
    registry: &ScenarioRegistry,
    config: &Config,
    paths: &[PathBuf],
    modules: &[String],
) -> LoadReport {
    let loader = Loader::new(registry);
    let paths: Vec<PathBuf> = if paths.is_empty() && modules.is_empty() {
        config
            .runner
            .scenario_dirs
            .iter()
            .filter(|dir| dir.exists())
            .cloned()
            .collect()
    } else {
        paths.to_vec()
    };

    let mut report = LoadReport::default();
    if !paths.is_empty() {
        report.extend(loader.load_paths(&paths));
    }
    for module in modules {
        report.extend(loader.load_module(module));
    }
    report
}

/// Log warnings and load errors, returning the errors as messages
fn log_load_problems(load: &LoadReport) -> Vec<String> {
    for warning in &load.warnings {
        tracing::warn!("{}", warning);
    }
    load.errors
        .iter()
        .map(|error| {
            tracing::error!(kind = error.kind(), "{}", error);
            error.to_string()
        })
        .collect()
}
