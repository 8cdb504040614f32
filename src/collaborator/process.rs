//! Collaborator backed by the external resource CLI binary
//!
//! Every operation becomes one child process:
//! `<program> [base args] --output json [--token T] [--verbose] <verb> <entity> [name] [--key value..]`.
//! The master password is passed through the environment, never argv.

use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use super::{CliResponse, Collaborator};
use crate::common::config::{Config, MASTER_PASSWORD_ENV};
use crate::common::Result;
use crate::orchestrator::context::value_to_string;
use crate::orchestrator::entity::EntityType;

/// Runs the resource CLI as a blocking child process
#[derive(Debug, Clone)]
pub struct ProcessCollaborator {
    program: PathBuf,
    base_args: Vec<String>,
    token: Option<String>,
    master_password: Option<String>,
    verbose: bool,
}

impl ProcessCollaborator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            token: None,
            master_password: None,
            verbose: false,
        }
    }

    /// Build from configuration, resolving the program on PATH
    ///
    /// Credentials are attached separately with `with_credentials`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            program: config.collaborator_program()?,
            base_args: config.collaborator.args.clone(),
            token: None,
            master_password: None,
            verbose: config.collaborator.verbose,
        })
    }

    pub fn with_credentials(
        mut self,
        token: Option<String>,
        master_password: Option<String>,
    ) -> Self {
        self.token = token;
        self.master_password = master_password;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Full argument list for one invocation
    fn command_args(&self, operation_args: Vec<String>) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("--output".to_string());
        args.push("json".to_string());
        if let Some(token) = &self.token {
            args.push("--token".to_string());
            args.push(token.clone());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args.extend(operation_args);
        args
    }

    fn run(&self, operation_args: Vec<String>) -> CliResponse {
        let args = self.command_args(operation_args);
        tracing::debug!(
            program = %self.program.display(),
            args = ?redacted(&args),
            "running resource CLI"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.verbose {
                Stdio::inherit()
            } else {
                Stdio::piped()
            });
        if let Some(password) = &self.master_password {
            command.env(MASTER_PASSWORD_ENV, password);
        }

        match command.output() {
            Ok(output) => parse_output(
                output.status.success(),
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            ),
            Err(e) => CliResponse::failed(format!(
                "failed to run '{}': {}",
                self.program.display(),
                e
            )),
        }
    }
}

/// Arguments with the token value masked for logging
fn redacted(args: &[String]) -> Vec<&str> {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        masked.push(if hide_next { "***" } else { arg.as_str() });
        hide_next = arg == "--token";
    }
    masked
}

/// Entity name as the resource CLI spells it
fn entity_arg(entity: EntityType) -> String {
    entity.as_str().replace('_', "-")
}

/// Turn a parameter mapping into `--key value` flags
///
/// `true` becomes a bare flag, `false` and null are dropped and arrays
/// repeat the flag per item.
pub fn param_args(params: &Map<String, Value>) -> Vec<String> {
    let mut args = Vec::with_capacity(params.len() * 2);
    for (key, value) in params {
        let flag = format!("--{}", key);
        match value {
            Value::Bool(true) => args.push(flag),
            Value::Bool(false) | Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    args.push(flag.clone());
                    args.push(value_to_string(item));
                }
            }
            other => {
                args.push(flag);
                args.push(value_to_string(other));
            }
        }
    }
    args
}

/// Interpret the output of one resource CLI invocation
///
/// stdout should hold a JSON document. A non-zero exit status or
/// `"success": false` marks the response failed.
pub fn parse_output(exit_ok: bool, stdout: &str, stderr: &str) -> CliResponse {
    let trimmed = stdout.trim();
    let parsed = if trimmed.is_empty() {
        json!({})
    } else {
        serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| json!({ "output": trimmed }))
    };

    let reported = parsed.get("success").and_then(Value::as_bool);
    let success = exit_ok && reported.unwrap_or(true);

    let body = match parsed {
        Value::Object(map) if map.contains_key("success") || map.contains_key("data") => {
            Value::Object(map)
        }
        other => json!({ "success": success, "data": other }),
    };

    let error = if success {
        None
    } else {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|m| !m.is_empty())
            .or_else(|| Some(stderr.trim().to_string()).filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "resource CLI exited with failure".to_string());
        Some(message)
    };

    CliResponse {
        success,
        body,
        error,
    }
}

impl Collaborator for ProcessCollaborator {
    fn create(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse {
        let mut args = vec!["create".to_string(), entity_arg(entity)];
        args.extend(param_args(params));
        self.run(args)
    }

    fn list(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse {
        let mut args = vec!["list".to_string(), entity_arg(entity)];
        args.extend(param_args(params));
        self.run(args)
    }

    fn get(&self, entity: EntityType, name: &str, params: &Map<String, Value>) -> CliResponse {
        let mut args = vec!["get".to_string(), entity_arg(entity), name.to_string()];
        args.extend(param_args(params));
        self.run(args)
    }

    fn update(
        &self,
        entity: EntityType,
        name: &str,
        params: &Map<String, Value>,
    ) -> CliResponse {
        let mut args = vec!["update".to_string(), entity_arg(entity), name.to_string()];
        args.extend(param_args(params));
        self.run(args)
    }

    fn delete(&self, entity: EntityType, name: &str) -> CliResponse {
        self.run(vec![
            "delete".to_string(),
            entity_arg(entity),
            name.to_string(),
            "--force".to_string(),
        ])
    }

    fn execute_raw(&self, args: &[String]) -> CliResponse {
        self.run(args.to_vec())
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn verbose(&self) -> Option<Arc<dyn Collaborator>> {
        Some(Arc::new(self.clone().with_verbose(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_param_args() {
        let args = param_args(&params(json!({
            "teamName": "Acme",
            "force": true,
            "dryRun": false,
            "port": 22,
            "tags": ["a", "b"],
            "note": null
        })));
        // serde_json maps iterate in key order
        assert_eq!(
            args,
            vec![
                "--force", "--port", "22", "--tags", "a", "--tags", "b", "--teamName", "Acme"
            ]
        );
    }

    #[test]
    fn test_parse_output_success() {
        let response = parse_output(true, r#"{"success": true, "data": {"id": "x"}}"#, "");
        assert!(response.success);
        assert_eq!(response.data()["id"], "x");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_parse_output_reported_failure() {
        let response = parse_output(true, r#"{"success": false, "error": "denied"}"#, "");
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("denied"));
    }

    #[test]
    fn test_parse_output_exit_failure_uses_stderr() {
        let response = parse_output(false, "", "unauthorized\n");
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("unauthorized"));
    }

    #[test]
    fn test_parse_output_wraps_bare_arrays() {
        let response = parse_output(true, r#"[{"teamName": "Acme"}]"#, "");
        assert!(response.success);
        assert_eq!(response.data()[0]["teamName"], "Acme");
    }

    #[test]
    fn test_parse_output_non_json_stdout() {
        let response = parse_output(true, "done", "");
        assert!(response.success);
        assert_eq!(response.data()["output"], "done");
    }

    #[test]
    fn test_command_args_include_token_and_output() {
        let collaborator =
            ProcessCollaborator::new("fleetctl").with_credentials(Some("t0k".to_string()), None);
        let args = collaborator.command_args(vec!["list".to_string(), "team".to_string()]);
        assert_eq!(args, vec!["--output", "json", "--token", "t0k", "list", "team"]);
        assert!(collaborator.verbose().unwrap().is_verbose());
        assert_eq!(redacted(&args)[3], "***");
    }

    #[test]
    fn test_missing_program_is_failed_response() {
        let collaborator = ProcessCollaborator::new("/nonexistent/fleetctl-missing");
        let response = collaborator.delete(EntityType::Team, "foo");
        assert!(!response.success);
        assert!(response.error_message().contains("failed to run"));
    }
}
