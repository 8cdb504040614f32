//! Scenario results and the aggregated run report

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::common::{Error, Result};

/// Execution state of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Error,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Skipped | TestStatus::Error
        )
    }

    /// Failed or errored
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Error)
    }

    fn can_transition_to(&self, next: TestStatus) -> bool {
        use TestStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Skipped) | (Running, Passed | Failed | Skipped | Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a scenario did not pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    /// Error taxonomy name, e.g. `StepError`
    pub kind: String,
    pub message: String,
}

impl From<&Error> for FailureCause {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one scenario in one run
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub scenario_id: String,
    pub name: String,
    pub status: TestStatus,
    pub message: Option<String>,
    pub cause: Option<FailureCause>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub steps_run: usize,
    pub steps_total: usize,
    /// Step log lines
    pub output: Vec<String>,
    /// Variables captured by this scenario's steps
    pub captured: BTreeMap<String, Value>,
    /// Produced by the diagnostic re-run
    pub diagnostic: bool,
}

fn serialize_duration<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl TestResult {
    pub fn new(scenario_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            name: name.into(),
            status: TestStatus::Pending,
            message: None,
            cause: None,
            duration: Duration::ZERO,
            steps_run: 0,
            steps_total: 0,
            output: Vec::new(),
            captured: BTreeMap::new(),
            diagnostic: false,
        }
    }

    /// Move to `next`, rejecting transitions out of terminal states
    pub fn transition(&mut self, next: TestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "scenario '{}' cannot go from {} to {}",
                self.scenario_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Pending scenario skipped without running
    pub fn skipped(
        scenario_id: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(scenario_id, name);
        result.status = TestStatus::Skipped;
        result.message = Some(reason.into());
        result
    }

    /// Record a failure cause; step errors fail, anything else errors
    pub fn fail(&mut self, error: &Error) -> Result<()> {
        let next = if error.is_step_error() {
            TestStatus::Failed
        } else {
            TestStatus::Error
        };
        self.transition(next)?;
        self.message = Some(error.to_string());
        self.cause = Some(FailureCause::from(error));
        Ok(())
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Name used in reports; diagnostic results carry a label
    pub fn display_name(&self) -> String {
        if self.diagnostic {
            format!("[diagnostic] {}", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Counts of what cleanup did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub attempted: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Status counts over the primary results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub error: usize,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One result per executed or skipped scenario, in execution order
    pub results: Vec<TestResult>,
    /// Results of the diagnostic re-run
    pub diagnostics: Vec<TestResult>,
    /// Scenarios that were never reached because the run stopped early
    pub not_run: Vec<String>,
    /// Load and validation errors of excluded scenarios
    pub errors: Vec<String>,
    pub cleanup: Option<CleanupSummary>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

impl RunReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.results.len(),
            ..Summary::default()
        };
        for result in &self.results {
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
                TestStatus::Error => summary.error += 1,
                TestStatus::Pending | TestStatus::Running => {}
            }
        }
        summary
    }

    /// Whether any primary result failed or errored
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status.is_failure())
    }

    pub fn result(&self, scenario_id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.scenario_id == scenario_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let mut result = TestResult::new("a", "A");
        assert!(result.transition(TestStatus::Passed).is_err());
        result.transition(TestStatus::Running).unwrap();
        result.transition(TestStatus::Passed).unwrap();
        assert!(result.transition(TestStatus::Failed).is_err());
        assert!(result.transition(TestStatus::Running).is_err());
        assert_eq!(result.status, TestStatus::Passed);
    }

    #[test]
    fn test_skip_directly_from_pending() {
        let mut result = TestResult::new("a", "A");
        result.transition(TestStatus::Skipped).unwrap();
        assert!(result.status.is_terminal());
    }

    #[test]
    fn test_fail_classifies_errors() {
        let mut failed = TestResult::new("a", "A");
        failed.transition(TestStatus::Running).unwrap();
        failed
            .fail(&Error::VariableResolution {
                name: "team".to_string(),
            })
            .unwrap();
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(
            failed.cause.as_ref().map(|c| c.kind.as_str()),
            Some("VariableResolutionError")
        );

        let mut errored = TestResult::new("b", "B");
        errored.transition(TestStatus::Running).unwrap();
        errored.fail(&Error::Internal("boom".to_string())).unwrap();
        assert_eq!(errored.status, TestStatus::Error);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::default();
        let mut passed = TestResult::new("a", "A");
        passed.status = TestStatus::Passed;
        let mut failed = TestResult::new("b", "B");
        failed.status = TestStatus::Failed;
        report.results = vec![passed, failed, TestResult::skipped("c", "C", "dependency failed")];

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(report.has_failures());
    }

    #[test]
    fn test_diagnostic_display_name() {
        let mut result = TestResult::new("a", "Create team");
        result.diagnostic = true;
        assert_eq!(result.display_name(), "[diagnostic] Create team");
    }
}
