//! Run report rendering
//!
//! Three formats: a colored summary table for people, an aggregated JSON
//! document for tooling and JUnit XML for CI systems.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;

use crate::commands::ReportFormat;
use crate::common::Result;
use crate::orchestrator::result::{RunReport, Summary, TestResult, TestStatus};

/// Render a report in the requested format
pub fn render(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(report)),
        ReportFormat::Json => render_json(report),
        ReportFormat::Junit => Ok(render_junit(report)),
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Summary,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub fn render_json(report: &RunReport) -> Result<String> {
    let document = JsonReport {
        summary: report.summary(),
        report,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

fn status_cell(status: TestStatus) -> String {
    let label = format!("{:<8}", status.as_str().to_uppercase());
    match status {
        TestStatus::Passed => label.green().to_string(),
        TestStatus::Failed | TestStatus::Error => label.red().to_string(),
        TestStatus::Skipped => label.yellow().to_string(),
        TestStatus::Pending | TestStatus::Running => label.dimmed().to_string(),
    }
}

fn table_row(out: &mut String, result: &TestResult) {
    let _ = writeln!(
        out,
        "{}  {:<40}  {:>8.2}s  {:>3}/{:<3}  {}",
        status_cell(result.status),
        result.display_name(),
        result.duration.as_secs_f64(),
        result.steps_run,
        result.steps_total,
        result.message.as_deref().unwrap_or("").dimmed()
    );
}

pub fn render_table(report: &RunReport) -> String {
    let mut out = String::new();
    let summary = report.summary();

    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:<8}  {:<40}  {:>9}  {:>7}  {}",
            "STATUS", "SCENARIO", "DURATION", "STEPS", "MESSAGE"
        )
        .bold()
    );
    for result in &report.results {
        table_row(&mut out, result);
    }

    if !report.diagnostics.is_empty() {
        let _ = writeln!(out, "\n{}", "Diagnostics:".cyan());
        for result in &report.diagnostics {
            table_row(&mut out, result);
            for line in &result.output {
                let _ = writeln!(out, "    {}", line.dimmed());
            }
        }
    }

    let failures: Vec<&TestResult> = report
        .results
        .iter()
        .filter(|r| r.status.is_failure())
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\n{}", "Failures:".red().bold());
        for result in failures {
            let (kind, message) = result
                .cause
                .as_ref()
                .map(|c| (c.kind.as_str(), c.message.as_str()))
                .unwrap_or(("Error", result.message.as_deref().unwrap_or("")));
            let _ = writeln!(
                out,
                "  {} {} [{}]: {}",
                "✗".red(),
                result.name.bold(),
                kind,
                message
            );
        }
    }

    if !report.not_run.is_empty() {
        let _ = writeln!(
            out,
            "\n{} {}",
            "Not run:".yellow(),
            report.not_run.join(", ")
        );
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n{}", "Load errors:".red());
        for error in &report.errors {
            let _ = writeln!(out, "  {} {}", "✗".red(), error);
        }
    }

    if let Some(cleanup) = &report.cleanup {
        let _ = writeln!(
            out,
            "\n{} {} attempted, {} done, {} skipped, {} failed",
            "Cleanup:".cyan(),
            cleanup.attempted,
            cleanup.deleted,
            cleanup.skipped,
            cleanup.failed
        );
    }

    let verdict = if summary.failed + summary.error == 0 {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    let _ = writeln!(
        out,
        "\n{} {} passed, {} failed, {} skipped, {} error ({} total) in {:.2}s",
        verdict,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.error,
        summary.total,
        report.duration.as_secs_f64()
    );

    out
}

/// Escape text for XML attributes and character data
fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn junit_case(out: &mut String, result: &TestResult) {
    let _ = write!(
        out,
        "    <testcase classname=\"fleet\" name=\"{}\" time=\"{:.3}\"",
        xml_escape(&result.display_name()),
        result.duration.as_secs_f64()
    );

    let message = xml_escape(result.message.as_deref().unwrap_or(""));
    let kind = result
        .cause
        .as_ref()
        .map(|c| xml_escape(&c.kind))
        .unwrap_or_default();

    match result.status {
        TestStatus::Failed => {
            let _ = writeln!(
                out,
                ">\n      <failure message=\"{}\" type=\"{}\">{}</failure>",
                message,
                kind,
                xml_escape(&result.output.join("\n"))
            );
        }
        TestStatus::Error => {
            let _ = writeln!(
                out,
                ">\n      <error message=\"{}\" type=\"{}\"/>",
                message, kind
            );
        }
        TestStatus::Skipped => {
            let _ = writeln!(out, ">\n      <skipped message=\"{}\"/>", message);
        }
        _ => {
            let _ = writeln!(out, "/>");
            return;
        }
    }
    let _ = writeln!(out, "    </testcase>");
}

pub fn render_junit(report: &RunReport) -> String {
    let summary = report.summary();
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<testsuites tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">",
        summary.total,
        summary.failed,
        summary.error,
        summary.skipped,
        report.duration.as_secs_f64()
    );
    let _ = writeln!(
        out,
        "  <testsuite name=\"fleet\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\">",
        summary.total, summary.failed, summary.error, summary.skipped
    );
    for result in &report.results {
        junit_case(&mut out, result);
    }
    let _ = writeln!(out, "  </testsuite>");
    let _ = writeln!(out, "</testsuites>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use std::time::Duration;

    fn sample_report() -> RunReport {
        let mut passed = TestResult::new("a", "Create team");
        passed.status = TestStatus::Passed;
        passed.duration = Duration::from_millis(1500);

        let mut failed = TestResult::new("b", "Machine <bar> & co");
        failed.transition(TestStatus::Running).unwrap();
        failed
            .fail(&Error::collaborator("create", "machine", "team 'foo' not found"))
            .unwrap();

        RunReport {
            results: vec![
                passed,
                failed,
                TestResult::skipped("c", "Repository", "dependency 'b' did not pass"),
            ],
            ..RunReport::default()
        }
    }

    #[test]
    fn test_json_report_has_summary_and_results() {
        let rendered = render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["summary"]["passed"], 1);
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["results"][1]["status"], "failed");
        assert_eq!(value["results"][1]["cause"]["kind"], "StepError");
        assert_eq!(value["results"][0]["duration"], 1.5);
    }

    #[test]
    fn test_junit_escapes_and_counts() {
        let xml = render_junit(&sample_report());
        assert!(xml.contains("tests=\"3\" failures=\"1\" errors=\"0\" skipped=\"1\""));
        assert!(xml.contains("name=\"Machine &lt;bar&gt; &amp; co\""));
        assert!(xml.contains("<failure message=\"create machine failed: team &apos;foo&apos; not found\""));
        assert!(xml.contains("<skipped message=\"dependency &apos;b&apos; did not pass\"/>"));
        assert!(xml.contains("<testcase classname=\"fleet\" name=\"Create team\" time=\"1.500\"/>"));
    }

    #[test]
    fn test_table_lists_failures_with_kind() {
        colored::control::set_override(false);
        let table = render_table(&sample_report());
        assert!(table.contains("FAILED"));
        assert!(table.contains("[StepError]: create machine failed"));
        assert!(table.contains("1 passed, 1 failed, 1 skipped, 0 error (3 total)"));
    }
}
