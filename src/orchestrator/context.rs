//! Per-run execution context
//!
//! Holds context variables and the resources created during the run. One
//! context exists per run; concurrently running scenarios share it through
//! a mutex and the last writer of a variable wins.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::entity::EntityType;
use crate::common::{Error, Result};

/// Environment variables with this prefix seed the context variables
pub const VAR_ENV_PREFIX: &str = "FLEET_VAR_";

/// A resource created by a `create` step
#[derive(Debug, Clone, Serialize)]
pub struct TrackedResource {
    /// Scenario that created the resource
    pub scenario_id: String,
    pub entity: EntityType,
    /// Name or id used to delete the resource
    pub name: String,
    /// Full collaborator response
    pub response: Value,
}

/// Mutable state for one run
#[derive(Debug, Default)]
pub struct TestContext {
    variables: HashMap<String, Value>,
    resources: Vec<TrackedResource>,
    /// API token handed to the collaborator
    pub auth_token: Option<String>,
    /// Vault master password handed to the collaborator
    pub master_password: Option<String>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded from `FLEET_VAR_*` environment variables
    pub fn from_env() -> Self {
        Self::with_env_vars(std::env::vars())
    }

    /// Create a context seeded from prefixed variables
    ///
    /// The prefix is stripped and the remaining name lower-cased, so
    /// `FLEET_VAR_TEAM_NAME` becomes `team_name`.
    pub fn with_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut context = Self::new();
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                if !name.is_empty() {
                    context.set_var(name.to_lowercase(), Value::String(value));
                }
            }
        }
        context
    }

    /// Attach collaborator credentials
    pub fn with_credentials(
        mut self,
        auth_token: Option<String>,
        master_password: Option<String>,
    ) -> Self {
        self.auth_token = auth_token;
        self.master_password = master_password;
        self
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Get a variable, falling back to `default` when unset
    pub fn get_var_or(&self, name: &str, default: Value) -> Value {
        self.variables.get(name).cloned().unwrap_or(default)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Replace every `{{ name }}` with the variable's string form
    pub fn interpolate(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let name = after_open[..end].trim();
            let value = self
                .variables
                .get(name)
                .ok_or_else(|| Error::VariableResolution {
                    name: name.to_string(),
                })?;
            out.push_str(&value_to_string(value));
            rest = &after_open[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Interpolate every string inside a JSON value
    ///
    /// A string that is exactly one placeholder takes the variable's value
    /// with its JSON type intact. Non-string leaves are left untouched.
    pub fn interpolate_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => {
                if let Some(name) = sole_placeholder(s) {
                    return self.variables.get(name).cloned().ok_or_else(|| {
                        Error::VariableResolution {
                            name: name.to_string(),
                        }
                    });
                }
                Ok(Value::String(self.interpolate(s)?))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.interpolate_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => self.interpolate_map(map).map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    /// Interpolate every value of a mapping
    pub fn interpolate_map(&self, map: &Map<String, Value>) -> Result<Map<String, Value>> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.interpolate_value(v)?)))
            .collect()
    }

    /// Record a created resource
    pub fn track(&mut self, resource: TrackedResource) {
        self.resources.push(resource);
    }

    /// Forget a resource that was deleted explicitly
    pub fn untrack(&mut self, entity: EntityType, name: &str) {
        self.resources
            .retain(|r| !(r.entity == entity && r.name == name));
    }

    /// All tracked resources in creation order
    pub fn resources(&self) -> &[TrackedResource] {
        &self.resources
    }

    /// Resources created by one scenario, in creation order
    pub fn resources_for(&self, scenario_id: &str) -> Vec<TrackedResource> {
        self.resources
            .iter()
            .filter(|r| r.scenario_id == scenario_id)
            .cloned()
            .collect()
    }
}

/// Name inside a string that is nothing but one `{{ name }}`
fn sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// String form used when a value is spliced into text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extract a value with a JSON path such as `$.data.items[0].name`
///
/// Supports `$`, `.field`, `['field']` and `[index]`. Any missing segment or
/// malformed path yields `None`.
pub fn extract_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    let path = path.trim();
    let mut rest = path.strip_prefix('$').unwrap_or(path);

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot.find(|c: char| c == '.' || c == '[').unwrap_or(after_dot.len());
            let key = &after_dot[..end];
            if key.is_empty() {
                return None;
            }
            current = current.get(key)?;
            rest = &after_dot[end..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let end = after_bracket.find(']')?;
            let segment = after_bracket[..end].trim();
            current = if let Some(quoted) = strip_quotes(segment) {
                current.get(quoted)?
            } else {
                let index: usize = segment.parse().ok()?;
                current.get(index)?
            };
            rest = &after_bracket[end + 1..];
        } else {
            // Bare leading key, e.g. `data.id`
            let end = rest.find(|c: char| c == '.' || c == '[').unwrap_or(rest.len());
            current = current.get(&rest[..end])?;
            rest = &rest[end..];
        }
    }

    Some(current.clone())
}

fn strip_quotes(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| segment.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(vars: &[(&str, Value)]) -> TestContext {
        let mut ctx = TestContext::new();
        for (name, value) in vars {
            ctx.set_var(*name, value.clone());
        }
        ctx
    }

    #[test]
    fn test_interpolate_replaces_placeholder() {
        let ctx = context_with(&[("team", json!("Acme"))]);
        assert_eq!(ctx.interpolate("{{team}}-sub").unwrap(), "Acme-sub");
        assert_eq!(ctx.interpolate("{{ team }}/{{team}}").unwrap(), "Acme/Acme");
    }

    #[test]
    fn test_interpolate_missing_variable_fails() {
        let ctx = TestContext::new();
        let err = ctx.interpolate("{{team}}-sub").unwrap_err();
        assert!(matches!(err, Error::VariableResolution { ref name } if name == "team"));
    }

    #[test]
    fn test_interpolate_leaves_unclosed_braces() {
        let ctx = TestContext::new();
        assert_eq!(ctx.interpolate("literal {{ text").unwrap(), "literal {{ text");
    }

    #[test]
    fn test_interpolate_stringifies_numbers() {
        let ctx = context_with(&[("port", json!(2222))]);
        assert_eq!(ctx.interpolate("port={{port}}").unwrap(), "port=2222");
    }

    #[test]
    fn test_interpolate_value_recurses() {
        let ctx = context_with(&[("team", json!("Acme")), ("size", json!(3))]);
        let value = json!({
            "teamName": "{{team}}",
            "nested": {"labels": ["{{team}}-a", "b"]},
            "count": "{{size}}",
            "enabled": true,
            "limit": 10
        });
        let resolved = ctx.interpolate_value(&value).unwrap();
        assert_eq!(
            resolved,
            json!({
                "teamName": "Acme",
                "nested": {"labels": ["Acme-a", "b"]},
                "count": 3,
                "enabled": true,
                "limit": 10
            })
        );
    }

    #[test]
    fn test_env_vars_seed_context() {
        let ctx = TestContext::with_env_vars(vec![
            ("FLEET_VAR_TEAM_NAME".to_string(), "Acme".to_string()),
            ("HOME".to_string(), "/root".to_string()),
            ("FLEET_VAR_".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(ctx.get_var("team_name"), Some(&json!("Acme")));
        assert_eq!(ctx.variables().len(), 1);
    }

    #[test]
    fn test_get_var_or_default() {
        let ctx = TestContext::new();
        assert_eq!(ctx.get_var_or("missing", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_extract_path_found() {
        let response = json!({"data": {"id": "x"}});
        assert_eq!(extract_path(&response, "$.data.id"), Some(json!("x")));
    }

    #[test]
    fn test_extract_path_missing_is_none() {
        let response = json!({"data": {"id": "x"}});
        assert_eq!(extract_path(&response, "$.data.missing"), None);
        assert_eq!(extract_path(&response, "$.nothing.deeper"), None);
    }

    #[test]
    fn test_extract_path_indexes_and_quotes() {
        let response = json!({"data": [{"machineName": "bar"}, {"machineName": "baz"}]});
        assert_eq!(
            extract_path(&response, "$.data[1].machineName"),
            Some(json!("baz"))
        );
        assert_eq!(
            extract_path(&response, "$['data'][0]['machineName']"),
            Some(json!("bar"))
        );
        assert_eq!(extract_path(&response, "$.data[5]"), None);
        assert_eq!(extract_path(&response, "$.data[x]"), None);
        assert_eq!(extract_path(&response, "$"), Some(response.clone()));
    }

    #[test]
    fn test_resources_for_scenario_keep_creation_order() {
        let mut ctx = TestContext::new();
        for (scenario, name) in [("a", "foo"), ("b", "bar"), ("a", "foo2")] {
            ctx.track(TrackedResource {
                scenario_id: scenario.to_string(),
                entity: EntityType::Team,
                name: name.to_string(),
                response: json!({}),
            });
        }
        let names: Vec<String> = ctx.resources_for("a").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["foo", "foo2"]);
        assert_eq!(ctx.resources().len(), 3);
    }
}
