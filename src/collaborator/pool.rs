//! Bounded dispatch of blocking collaborator calls
//!
//! Scenario tasks run cooperatively; each collaborator call is moved onto a
//! blocking thread so the scheduler never waits on process I/O. A semaphore
//! caps how many calls are in flight.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{CliResponse, Collaborator};
use crate::common::{Error, Result};
use crate::orchestrator::entity::EntityType;

/// One collaborator operation with owned arguments
#[derive(Debug, Clone)]
pub enum Request {
    Create {
        entity: EntityType,
        params: Map<String, Value>,
    },
    List {
        entity: EntityType,
        params: Map<String, Value>,
    },
    Get {
        entity: EntityType,
        name: String,
        params: Map<String, Value>,
    },
    Update {
        entity: EntityType,
        name: String,
        params: Map<String, Value>,
    },
    Delete {
        entity: EntityType,
        name: String,
    },
    ExecuteRaw {
        args: Vec<String>,
    },
}

impl Request {
    /// Operation name used in logs and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::List { .. } => "list",
            Request::Get { .. } => "get",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
            Request::ExecuteRaw { .. } => "execute_raw",
        }
    }

    /// What the operation targets, e.g. `team` or `machine 'bar'`
    pub fn target(&self) -> String {
        match self {
            Request::Create { entity, .. } | Request::List { entity, .. } => entity.to_string(),
            Request::Get { entity, name, .. }
            | Request::Update { entity, name, .. }
            | Request::Delete { entity, name } => format!("{} '{}'", entity, name),
            Request::ExecuteRaw { args } => args.join(" "),
        }
    }

    fn dispatch(self, collaborator: &dyn Collaborator) -> CliResponse {
        match self {
            Request::Create { entity, params } => collaborator.create(entity, &params),
            Request::List { entity, params } => collaborator.list(entity, &params),
            Request::Get {
                entity,
                name,
                params,
            } => collaborator.get(entity, &name, &params),
            Request::Update {
                entity,
                name,
                params,
            } => collaborator.update(entity, &name, &params),
            Request::Delete { entity, name } => collaborator.delete(entity, &name),
            Request::ExecuteRaw { args } => collaborator.execute_raw(&args),
        }
    }
}

/// Shared handle dispatching calls to a blocking collaborator
#[derive(Clone)]
pub struct CollaboratorPool {
    collaborator: Arc<dyn Collaborator>,
    permits: Arc<Semaphore>,
}

impl CollaboratorPool {
    /// Create a pool allowing `workers` concurrent calls
    pub fn new(collaborator: Arc<dyn Collaborator>, workers: usize) -> Self {
        Self {
            collaborator,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run a request on a blocking thread and wait for its response
    pub async fn call(&self, request: Request) -> Result<CliResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("collaborator pool closed: {}", e)))?;

        let operation = request.operation();
        let target = request.target();
        tracing::debug!(operation, target = %target, "dispatching collaborator call");

        let collaborator = Arc::clone(&self.collaborator);
        let response = tokio::task::spawn_blocking(move || request.dispatch(collaborator.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("collaborator call panicked: {}", e)))?;

        if !response.success {
            tracing::debug!(
                operation,
                target = %target,
                error = %response.error_message(),
                "collaborator call failed"
            );
        }

        Ok(response)
    }

    pub fn is_verbose(&self) -> bool {
        self.collaborator.is_verbose()
    }

    /// Single-worker pool over the verbose collaborator variant
    pub fn verbose(&self) -> Option<Self> {
        self.collaborator
            .verbose()
            .map(|collaborator| Self::new(collaborator, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::MemoryCollaborator;
    use serde_json::json;

    #[tokio::test]
    async fn test_pool_dispatches_to_collaborator() {
        let memory = Arc::new(MemoryCollaborator::new());
        let pool = CollaboratorPool::new(memory.clone(), 2);

        let mut params = Map::new();
        params.insert("companyName".to_string(), json!("Acme"));
        let response = pool
            .call(Request::Create {
                entity: EntityType::Company,
                params,
            })
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(memory.calls().len(), 1);
    }

    #[test]
    fn test_request_target_labels() {
        let request = Request::Delete {
            entity: EntityType::Machine,
            name: "bar".to_string(),
        };
        assert_eq!(request.operation(), "delete");
        assert_eq!(request.target(), "machine 'bar'");
    }

    #[test]
    fn test_verbose_pool_requires_verbose_variant() {
        let pool = CollaboratorPool::new(Arc::new(MemoryCollaborator::new()), 1);
        assert!(!pool.is_verbose());
        let verbose = pool.verbose().unwrap();
        assert!(verbose.is_verbose());
    }
}
