//! Scenario execution
//!
//! Runs the scheduled batches against a collaborator pool. Batches are
//! separated by a hard barrier; inside a batch, parallel-eligible scenarios
//! are driven concurrently on the calling task and every collaborator call
//! goes through the pool. After the batches come the optional diagnostic
//! re-run and then cleanup in reverse dependency order.

use futures_util::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::context::{extract_path, value_to_string, TestContext, TrackedResource};
use super::entity::{EntityType, LookupMethod};
use super::graph::{cleanup_order_of, DependencyGraph};
use super::registry::ScenarioRegistry;
use super::result::{CleanupSummary, RunReport, TestResult, TestStatus};
use super::scenario::{ScenarioKind, SetupAction, StepKind, TestScenario, TestStep};
use crate::collaborator::{CliResponse, Collaborator, CollaboratorPool, Request};
use crate::common::config::{CleanupPolicy, RunnerConfig};
use crate::common::{Error, Result};

type SharedContext = Arc<Mutex<TestContext>>;

/// Run policy
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrent scenarios per batch and concurrent collaborator calls
    pub workers: usize,
    /// Abandon the remaining batches after a failure
    pub stop_on_failure: bool,
    pub cleanup: CleanupPolicy,
    /// Re-run failed scenarios against the verbose collaborator
    pub diagnose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            stop_on_failure: true,
            cleanup: CleanupPolicy::Always,
            diagnose: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            stop_on_failure: config.stop_on_failure,
            cleanup: config.cleanup,
            diagnose: false,
        }
    }
}

/// Executes scenarios and owns the run's context
pub struct Runner {
    pool: CollaboratorPool,
    registry: Arc<ScenarioRegistry>,
    context: SharedContext,
    options: RunOptions,
}

impl Runner {
    pub fn new(collaborator: Arc<dyn Collaborator>, options: RunOptions) -> Self {
        Self {
            pool: CollaboratorPool::new(collaborator, options.workers),
            registry: Arc::new(ScenarioRegistry::with_builtins()),
            context: Arc::new(Mutex::new(TestContext::new())),
            options,
        }
    }

    /// Use a registry other than the built-in one for native scenarios
    pub fn with_registry(mut self, registry: Arc<ScenarioRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Start from a prepared context, e.g. one seeded from the environment
    pub fn with_context(mut self, context: TestContext) -> Self {
        self.context = Arc::new(Mutex::new(context));
        self
    }

    pub fn context(&self) -> SharedContext {
        Arc::clone(&self.context)
    }

    /// Run scenarios to completion
    ///
    /// Fails only when no schedule can be computed; scenario failures are
    /// recorded in the report.
    pub async fn run(&self, scenarios: Vec<TestScenario>) -> Result<RunReport> {
        let started = Instant::now();
        let graph = DependencyGraph::new(&scenarios);
        let batches = graph.execution_order()?;
        let by_id: HashMap<&str, &TestScenario> =
            scenarios.iter().map(|s| (s.id.as_str(), s)).collect();

        tracing::info!(
            scenarios = scenarios.len(),
            batches = batches.len(),
            workers = self.options.workers,
            "starting run"
        );

        let mut report = RunReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && self.options.stop_on_failure && report.has_failures() {
                report.not_run = batches[index..].iter().flatten().cloned().collect();
                tracing::warn!(
                    not_run = report.not_run.len(),
                    "stopping after failure, remaining batches abandoned"
                );
                break;
            }

            tracing::debug!(batch = index, scenarios = ?batch, "running batch");
            let results = self.run_batch(batch, &graph, &by_id, &mut blocked).await;
            report.results.extend(results);
        }

        if self.options.diagnose {
            report.diagnostics = self.diagnose(&report.results, &by_id).await;
        }

        if self.should_clean_up(&report) {
            let ran: HashSet<String> = report
                .results
                .iter()
                .filter(|r| r.status != TestStatus::Skipped)
                .map(|r| r.scenario_id.clone())
                .collect();
            report.cleanup = Some(
                self.cleanup(&cleanup_order_of(&batches), &by_id, &ran)
                    .await,
            );
        } else {
            tracing::info!(policy = ?self.options.cleanup, "cleanup skipped");
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    async fn run_batch(
        &self,
        batch: &[String],
        graph: &DependencyGraph,
        by_id: &HashMap<&str, &TestScenario>,
        blocked: &mut HashSet<String>,
    ) -> Vec<TestResult> {
        let mut results: HashMap<String, TestResult> = HashMap::new();
        let mut concurrent = Vec::new();
        let mut sequential = Vec::new();

        for id in batch {
            let Some(scenario) = by_id.get(id.as_str()).copied() else {
                continue;
            };
            if let Some(dependency) = graph.dependencies_of(id).find(|d| blocked.contains(*d)) {
                tracing::info!(scenario = %id, dependency, "skipping scenario, dependency did not pass");
                results.insert(
                    id.clone(),
                    TestResult::skipped(
                        id,
                        &scenario.name,
                        format!("dependency '{}' did not pass", dependency),
                    ),
                );
            } else if scenario.parallel && self.options.workers > 1 {
                concurrent.push(scenario);
            } else {
                sequential.push(scenario);
            }
        }
        blocked.extend(results.keys().cloned());

        let finished: Vec<TestResult> = stream::iter(concurrent)
            .map(|scenario| self.run_scenario(scenario, &self.pool, false))
            .buffer_unordered(self.options.workers.max(1))
            .collect()
            .await;
        for result in finished {
            results.insert(result.scenario_id.clone(), result);
        }

        for scenario in sequential {
            let result = self.run_scenario(scenario, &self.pool, false).await;
            results.insert(result.scenario_id.clone(), result);
        }

        blocked.extend(
            results
                .values()
                .filter(|r| r.status.is_failure())
                .map(|r| r.scenario_id.clone()),
        );

        batch.iter().filter_map(|id| results.remove(id)).collect()
    }

    async fn run_scenario(
        &self,
        scenario: &TestScenario,
        pool: &CollaboratorPool,
        diagnostic: bool,
    ) -> TestResult {
        let started = Instant::now();
        let mut result = TestResult::new(&scenario.id, &scenario.name);
        result.diagnostic = diagnostic;
        result.steps_total = scenario.steps.len();

        if let Err(e) = result.transition(TestStatus::Running) {
            tracing::error!(scenario = %scenario.id, error = %e, "cannot start scenario");
            return result;
        }
        tracing::debug!(scenario = %scenario.id, diagnostic, "running scenario");

        let outcome = match &scenario.kind {
            ScenarioKind::Declarative => self.run_declarative(scenario, pool, &mut result).await,
            ScenarioKind::Native { key } => self.run_native(scenario, key, pool, &mut result).await,
        };

        let finished = match &outcome {
            Ok(()) => result.transition(TestStatus::Passed),
            Err(e) => result.fail(e),
        };
        if let Err(e) = finished {
            tracing::error!(scenario = %scenario.id, error = %e, "invalid result transition");
        }
        result.duration = started.elapsed();

        match &outcome {
            Ok(()) => tracing::info!(
                scenario = %scenario.id,
                duration_ms = result.duration.as_millis() as u64,
                "scenario passed"
            ),
            Err(e) => tracing::warn!(
                scenario = %scenario.id,
                kind = e.kind(),
                error = %e,
                "scenario failed"
            ),
        }
        result
    }

    async fn run_declarative(
        &self,
        scenario: &TestScenario,
        pool: &CollaboratorPool,
        result: &mut TestResult,
    ) -> Result<()> {
        {
            let mut ctx = self.context.lock().await;
            for action in &scenario.setup {
                apply_setup(&mut ctx, action, result)?;
            }
            for (entity, var) in &scenario.dependencies {
                if ctx.get_var(var).is_none() {
                    tracing::debug!(scenario = %scenario.id, %entity, var = %var, "dependency variable missing");
                    return Err(Error::VariableResolution { name: var.clone() });
                }
            }
        }

        for (index, step) in scenario.steps.iter().enumerate() {
            result.steps_run += 1;
            match self.run_step(&scenario.id, step, pool, result).await {
                Ok(()) => result.log(format!("step {}: {} ok", index + 1, step.label())),
                Err(e) if step.continue_on_error => {
                    tracing::warn!(
                        scenario = %scenario.id,
                        step = index + 1,
                        error = %e,
                        "step failed, continuing"
                    );
                    result.log(format!(
                        "step {}: {} failed, continuing: {}",
                        index + 1,
                        step.label(),
                        e
                    ));
                }
                Err(e) => {
                    result.log(format!("step {}: {} failed: {}", index + 1, step.label(), e));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn run_native(
        &self,
        scenario: &TestScenario,
        key: &str,
        pool: &CollaboratorPool,
        result: &mut TestResult,
    ) -> Result<()> {
        let native = self.registry.get(key).ok_or_else(|| {
            Error::Internal(format!("native scenario '{}' is not registered", key))
        })?;
        let env = ScenarioEnv::new(&scenario.id, pool.clone(), self.context());
        let outcome = native.run(&env).await;
        result.output.extend(env.into_output());
        outcome
    }

    async fn run_step(
        &self,
        scenario_id: &str,
        step: &TestStep,
        pool: &CollaboratorPool,
        result: &mut TestResult,
    ) -> Result<()> {
        if let Some(timeout) = step.timeout {
            tracing::debug!(
                step = %step.label(),
                timeout_secs = timeout.as_secs(),
                "step timeout is advisory and not enforced"
            );
        }

        let response = match &step.kind {
            StepKind::Create => Some(self.create(scenario_id, step, pool).await?),
            StepKind::Update => Some(self.update(step, pool).await?),
            StepKind::Delete => Some(self.delete(step, pool).await?),
            StepKind::Verify => Some(self.verify(step, pool).await?),
            StepKind::Wait { seconds } => {
                let duration = Duration::try_from_secs_f64(*seconds).unwrap_or(Duration::ZERO);
                tokio::time::sleep(duration).await;
                None
            }
            StepKind::ExecuteRaw { args } => {
                let (args, expect) = {
                    let ctx = self.context.lock().await;
                    let args = args
                        .iter()
                        .map(|arg| ctx.interpolate(arg))
                        .collect::<Result<Vec<_>>>()?;
                    (args, ctx.interpolate_map(&step.expect)?)
                };
                let target = args.join(" ");
                let response = pool.call(Request::ExecuteRaw { args }).await?;
                Some(check_response(response, &expect, "execute_raw", &target)?)
            }
            StepKind::Log { message } => {
                let text = self.context.lock().await.interpolate(message)?;
                tracing::info!(scenario = %scenario_id, "{}", text);
                result.log(text);
                None
            }
            StepKind::SetVar { var, value } => {
                let mut ctx = self.context.lock().await;
                let value = ctx.interpolate_value(value)?;
                ctx.set_var(var.clone(), value.clone());
                result.captured.insert(var.clone(), value);
                None
            }
        };

        if let Some(response) = response {
            self.capture(step, &response, result).await;
        }
        Ok(())
    }

    /// Entity type plus interpolated params and expectations of a step
    async fn prepare(
        &self,
        step: &TestStep,
    ) -> Result<(EntityType, Map<String, Value>, Map<String, Value>)> {
        let entity = step.entity.ok_or_else(|| {
            Error::Step(format!(
                "'{}' step has no known entity type",
                step.kind.action()
            ))
        })?;
        let ctx = self.context.lock().await;
        Ok((
            entity,
            ctx.interpolate_map(&step.params)?,
            ctx.interpolate_map(&step.expect)?,
        ))
    }

    async fn create(
        &self,
        scenario_id: &str,
        step: &TestStep,
        pool: &CollaboratorPool,
    ) -> Result<CliResponse> {
        let (entity, params, expect) = self.prepare(step).await?;
        let response = pool
            .call(Request::Create {
                entity,
                params: params.clone(),
            })
            .await?;
        let response = check_response(response, &expect, "create", entity.as_str())?;

        if response.success {
            match resource_name(entity, &params, response.data()) {
                Some(name) => {
                    tracing::debug!(scenario = %scenario_id, %entity, name = %name, "tracking resource");
                    self.context.lock().await.track(TrackedResource {
                        scenario_id: scenario_id.to_string(),
                        entity,
                        name,
                        response: response.body.clone(),
                    });
                }
                None => tracing::warn!(
                    scenario = %scenario_id,
                    %entity,
                    "created resource has no name or id and will not be cleaned up"
                ),
            }
        }
        Ok(response)
    }

    async fn update(&self, step: &TestStep, pool: &CollaboratorPool) -> Result<CliResponse> {
        let (entity, mut params, expect) = self.prepare(step).await?;
        let name = target_name(entity, &params)?;
        params.remove(entity.name_field());
        params.remove("name");

        let response = pool
            .call(Request::Update {
                entity,
                name: name.clone(),
                params,
            })
            .await?;
        check_response(response, &expect, "update", &format!("{} '{}'", entity, name))
    }

    async fn delete(&self, step: &TestStep, pool: &CollaboratorPool) -> Result<CliResponse> {
        let (entity, params, expect) = self.prepare(step).await?;
        let name = target_name(entity, &params)?;

        let response = pool
            .call(Request::Delete {
                entity,
                name: name.clone(),
            })
            .await?;
        let response =
            check_response(response, &expect, "delete", &format!("{} '{}'", entity, name))?;
        if response.success {
            self.context.lock().await.untrack(entity, &name);
        }
        Ok(response)
    }

    /// Look an entity up and compare it with the expectations
    ///
    /// `expect.success: false` asserts that the entity does not exist.
    async fn verify(&self, step: &TestStep, pool: &CollaboratorPool) -> Result<CliResponse> {
        let (entity, params, expect) = self.prepare(step).await?;
        let lookup = entity.lookup();
        let name = target_name(entity, &params)?;
        let target = format!("{} '{}'", entity, name);

        let mut scope = Map::new();
        for key in lookup.context_params {
            let value = params.get(*key).ok_or_else(|| {
                Error::Step(format!("verify {} requires '{}' in params", entity, key))
            })?;
            scope.insert(key.to_string(), value.clone());
        }

        let expect_absent = expect.get("success").and_then(Value::as_bool) == Some(false);

        let found = match lookup.method {
            LookupMethod::Get => {
                let response = pool
                    .call(Request::Get {
                        entity,
                        name: name.clone(),
                        params: scope,
                    })
                    .await?;
                if response.success {
                    Some(response.data().clone())
                } else if expect_absent {
                    None
                } else {
                    return Err(Error::collaborator(
                        "verify",
                        &target,
                        &response.error_message(),
                    ));
                }
            }
            LookupMethod::List => {
                let response = pool
                    .call(Request::List {
                        entity,
                        params: scope,
                    })
                    .await?
                    .into_result("verify", &target)?;
                response.data().as_array().and_then(|items| {
                    items
                        .iter()
                        .find(|item| {
                            item.get(lookup.name_field).map(value_to_string).as_deref()
                                == Some(name.as_str())
                        })
                        .cloned()
                })
            }
        };

        match (found, expect_absent) {
            (None, true) => Ok(CliResponse::ok(Value::Null)),
            (Some(_), true) => Err(Error::Assertion(format!("{} still exists", target))),
            (None, false) => Err(Error::Assertion(format!("{} not found", target))),
            (Some(record), false) => {
                compare_expected(&record, &expect)?;
                Ok(CliResponse::ok(record))
            }
        }
    }

    /// Store captured response values in the context
    async fn capture(&self, step: &TestStep, response: &CliResponse, result: &mut TestResult) {
        if step.capture.is_empty() {
            return;
        }
        let mut ctx = self.context.lock().await;
        for (var, path) in &step.capture {
            match extract_path(&response.body, path) {
                Some(value) => {
                    ctx.set_var(var.clone(), value.clone());
                    result.captured.insert(var.clone(), value);
                }
                None => {
                    tracing::warn!(variable = %var, path = %path, "capture path not found in response");
                    result.log(format!("capture '{}': nothing at {}", var, path));
                }
            }
        }
    }

    /// Re-run failed declarative scenarios against the verbose collaborator
    async fn diagnose(
        &self,
        results: &[TestResult],
        by_id: &HashMap<&str, &TestScenario>,
    ) -> Vec<TestResult> {
        if self.pool.is_verbose() {
            tracing::info!("collaborator is already verbose, diagnostic pass skipped");
            return Vec::new();
        }
        let Some(verbose) = self.pool.verbose() else {
            tracing::warn!("collaborator has no verbose variant, diagnostic pass skipped");
            return Vec::new();
        };

        let failed: Vec<&TestScenario> = results
            .iter()
            .filter(|r| r.status.is_failure())
            .filter_map(|r| by_id.get(r.scenario_id.as_str()).copied())
            .filter(|s| !s.is_native())
            .collect();

        let mut diagnostics = Vec::with_capacity(failed.len());
        for scenario in failed {
            tracing::info!(scenario = %scenario.id, "re-running failed scenario with verbose output");
            diagnostics.push(self.run_scenario(scenario, &verbose, true).await);
        }
        diagnostics
    }

    fn should_clean_up(&self, report: &RunReport) -> bool {
        match self.options.cleanup {
            CleanupPolicy::Always => true,
            CleanupPolicy::KeepOnFailure => !report.has_failures(),
            CleanupPolicy::Never => false,
        }
    }

    /// Tear down in `order`; failures are logged and never stop the queue
    async fn cleanup(
        &self,
        order: &[String],
        by_id: &HashMap<&str, &TestScenario>,
        ran: &HashSet<String>,
    ) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        for id in order {
            let Some(scenario) = by_id.get(id.as_str()).copied() else {
                continue;
            };
            if !ran.contains(id) {
                continue;
            }

            if scenario.skip_cleanup {
                let kept = self.context.lock().await.resources_for(id).len();
                tracing::info!(scenario = %id, resources = kept, "skip_cleanup set, keeping resources");
                summary.skipped += kept + scenario.cleanup.len();
                continue;
            }

            for step in &scenario.cleanup {
                summary.attempted += 1;
                let mut scratch = TestResult::new(id, &scenario.name);
                match self.run_step(id, step, &self.pool, &mut scratch).await {
                    Ok(()) => summary.deleted += 1,
                    Err(Error::VariableResolution { name }) => {
                        tracing::debug!(scenario = %id, variable = %name, "cleanup step skipped");
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        let entity = step.entity.map(|entity| entity.as_str()).unwrap_or("step");
                        let error = Error::cleanup(entity, &step.label(), &e.to_string());
                        tracing::warn!(scenario = %id, error = %error, "cleanup step failed");
                    }
                }
            }

            let resources = self.context.lock().await.resources_for(id);
            for resource in resources.iter().rev() {
                summary.attempted += 1;
                let target = format!("{} '{}'", resource.entity, resource.name);
                let outcome = self
                    .pool
                    .call(Request::Delete {
                        entity: resource.entity,
                        name: resource.name.clone(),
                    })
                    .await
                    .and_then(|response| response.into_result("delete", &target));

                match outcome {
                    Ok(_) => {
                        summary.deleted += 1;
                        self.context
                            .lock()
                            .await
                            .untrack(resource.entity, &resource.name);
                        tracing::debug!(scenario = %id, resource = %target, "deleted");
                    }
                    Err(e) => {
                        summary.failed += 1;
                        let error =
                            Error::cleanup(resource.entity.as_str(), &resource.name, &e.to_string());
                        tracing::warn!(scenario = %id, error = %error, "cleanup failed");
                    }
                }
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            deleted = summary.deleted,
            skipped = summary.skipped,
            failed = summary.failed,
            "cleanup finished"
        );
        summary
    }
}

/// Handle given to native scenarios
///
/// Calls go through the run's collaborator pool and created resources are
/// tracked for cleanup like those of declarative steps.
pub struct ScenarioEnv {
    scenario_id: String,
    pool: CollaboratorPool,
    context: SharedContext,
    output: std::sync::Mutex<Vec<String>>,
}

impl ScenarioEnv {
    fn new(scenario_id: &str, pool: CollaboratorPool, context: SharedContext) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            pool,
            context,
            output: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    /// Make a collaborator call; a failed response is an error
    pub async fn call(&self, request: Request) -> Result<CliResponse> {
        let operation = request.operation();
        let target = request.target();
        self.pool
            .call(request)
            .await?
            .into_result(operation, &target)
    }

    /// Create an entity and track it for cleanup
    pub async fn create(
        &self,
        entity: EntityType,
        params: Map<String, Value>,
    ) -> Result<CliResponse> {
        let response = self
            .call(Request::Create {
                entity,
                params: params.clone(),
            })
            .await?;
        if let Some(name) = resource_name(entity, &params, response.data()) {
            self.context.lock().await.track(TrackedResource {
                scenario_id: self.scenario_id.clone(),
                entity,
                name,
                response: response.body.clone(),
            });
        }
        Ok(response)
    }

    pub async fn get_var(&self, name: &str) -> Option<Value> {
        self.context.lock().await.get_var(name).cloned()
    }

    pub async fn set_var(&self, name: &str, value: Value) {
        self.context.lock().await.set_var(name, value);
    }

    pub fn unique_name(&self, prefix: &str) -> String {
        unique_name(prefix)
    }

    /// Whether the run carries an API token
    pub async fn is_authenticated(&self) -> bool {
        self.context.lock().await.auth_token.is_some()
    }

    /// Add a line to the scenario output
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(scenario = %self.scenario_id, "{}", line);
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    fn into_output(self) -> Vec<String> {
        self.output
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// `<prefix>-<8 random hex digits>`
pub fn unique_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

fn apply_setup(ctx: &mut TestContext, action: &SetupAction, result: &mut TestResult) -> Result<()> {
    let (var, value) = match action {
        SetupAction::UniqueName { var, prefix } => (var, json!(unique_name(prefix))),
        SetupAction::UniqueEmail { var, domain } => {
            (var, json!(format!("{}@{}", unique_name("e2e"), domain)))
        }
        SetupAction::Set { var, value } => (var, ctx.interpolate_value(value)?),
    };
    result.log(format!("setup: {} = {}", var, value_to_string(&value)));
    ctx.set_var(var.clone(), value);
    Ok(())
}

/// Name an update, delete or verify step targets
fn target_name(entity: EntityType, params: &Map<String, Value>) -> Result<String> {
    params
        .get(entity.name_field())
        .or_else(|| params.get("name"))
        .map(value_to_string)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::Step(format!(
                "{} step needs '{}' or 'name' in params",
                entity,
                entity.name_field()
            ))
        })
}

/// Name used to delete a created resource
fn resource_name(entity: EntityType, params: &Map<String, Value>, data: &Value) -> Option<String> {
    target_name(entity, params)
        .ok()
        .or_else(|| data.get(entity.name_field()).map(value_to_string))
        .or_else(|| data.get("id").map(value_to_string))
        .filter(|name| !name.is_empty())
}

/// Check a response against the step's expectations
///
/// `success: false` inverts the success check; other keys are compared
/// with the response data.
fn check_response(
    response: CliResponse,
    expect: &Map<String, Value>,
    operation: &str,
    target: &str,
) -> Result<CliResponse> {
    let expect_success = expect
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    match (response.success, expect_success) {
        (true, true) => {
            compare_expected(response.data(), expect)?;
            Ok(response)
        }
        (false, false) => Ok(response),
        (false, true) => Err(Error::collaborator(
            operation,
            target,
            &response.error_message(),
        )),
        (true, false) => Err(Error::Assertion(format!(
            "expected {} {} to fail, but it succeeded",
            operation, target
        ))),
    }
}

/// Compare expected keys (or `$` paths) with an actual value
fn compare_expected(actual: &Value, expect: &Map<String, Value>) -> Result<()> {
    for (key, expected) in expect {
        if key == "success" {
            continue;
        }
        let found = if key.starts_with('$') {
            extract_path(actual, key)
        } else {
            actual.get(key).cloned()
        };
        match found {
            Some(value) if values_match(&value, expected) => {}
            Some(value) => {
                return Err(Error::Assertion(format!(
                    "expected '{}' to be {}, got {}",
                    key, expected, value
                )))
            }
            None => {
                return Err(Error::Assertion(format!(
                    "expected '{}' to be {}, but it is missing",
                    key, expected
                )))
            }
        }
    }
    Ok(())
}

fn values_match(actual: &Value, expected: &Value) -> bool {
    actual == expected || value_to_string(actual) == value_to_string(expected)
}
