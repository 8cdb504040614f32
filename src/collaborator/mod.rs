//! Resource CLI collaborator
//!
//! The orchestrator never talks to the remote service itself. Every step is
//! forwarded to a `Collaborator`, whose operations are blocking and report a
//! success flag plus the JSON document the resource CLI printed.

pub mod memory;
pub mod pool;
pub mod process;

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::orchestrator::entity::EntityType;

pub use memory::MemoryCollaborator;
pub use pool::{CollaboratorPool, Request};
pub use process::ProcessCollaborator;

/// Outcome of one collaborator operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CliResponse {
    pub success: bool,
    /// Full JSON document returned by the operation
    pub body: Value,
    /// Error message when `success` is false
    pub error: Option<String>,
}

impl CliResponse {
    /// Successful response carrying `data`
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            body: json!({ "success": true, "data": data }),
            error: None,
        }
    }

    /// Failed response with a message
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            body: json!({ "success": false, "error": message }),
            error: Some(message),
        }
    }

    /// The `data` member of the body, or null
    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&Value::Null)
    }

    /// Error message, or a generic one
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "operation reported failure".to_string())
    }

    /// Turn a failed response into a collaborator error
    pub fn into_result(self, operation: &str, target: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::collaborator(operation, target, &self.error_message()))
        }
    }
}

/// Operations the orchestrator expects from the resource CLI
///
/// Calls are blocking; the runner dispatches them onto a bounded pool of
/// blocking threads.
pub trait Collaborator: Send + Sync {
    fn create(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse;

    fn list(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse;

    fn get(&self, entity: EntityType, name: &str, params: &Map<String, Value>) -> CliResponse;

    fn update(&self, entity: EntityType, name: &str, params: &Map<String, Value>)
        -> CliResponse;

    fn delete(&self, entity: EntityType, name: &str) -> CliResponse;

    /// Forward an arbitrary argument list
    fn execute_raw(&self, args: &[String]) -> CliResponse;

    /// Whether the collaborator already produces verbose output
    fn is_verbose(&self) -> bool {
        false
    }

    /// A verbose variant used to re-run failed scenarios for diagnosis
    fn verbose(&self) -> Option<Arc<dyn Collaborator>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response_exposes_data() {
        let response = CliResponse::ok(json!({"id": "x"}));
        assert!(response.success);
        assert_eq!(response.data()["id"], "x");
        assert_eq!(response.body["success"], true);
    }

    #[test]
    fn test_failed_response_into_result() {
        let err = CliResponse::failed("team exists")
            .into_result("create", "team")
            .unwrap_err();
        assert_eq!(err.to_string(), "create team failed: team exists");
        assert_eq!(err.kind(), "StepError");
    }
}
