//! In-process collaborator
//!
//! Keeps entities in memory and enforces the parent/child relations of the
//! entity table: a create fails when a referenced parent does not exist and a
//! delete fails while children still reference the entity. Used for
//! `--dry-run` rehearsals of scenario files and by the test suite.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{CliResponse, Collaborator};
use crate::orchestrator::context::value_to_string;
use crate::orchestrator::entity::EntityType;

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: &'static str,
    pub entity: Option<EntityType>,
    pub name: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<(EntityType, String), Map<String, Value>>,
    calls: Vec<CallRecord>,
    failures: HashSet<(&'static str, EntityType)>,
    next_id: u64,
}

/// Collaborator storing entities in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCollaborator {
    state: Arc<Mutex<MemoryState>>,
    verbose: bool,
}

impl MemoryCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entity without recording a call
    pub fn seed(&self, entity: EntityType, name: &str, fields: Value) {
        let mut record = fields.as_object().cloned().unwrap_or_default();
        record.insert(entity.name_field().to_string(), json!(name));
        self.state().records.insert((entity, name.to_string()), record);
    }

    /// Make every `operation` on `entity` fail
    pub fn fail_on(&self, operation: &'static str, entity: EntityType) {
        self.state().failures.insert((operation, entity));
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state().calls.clone()
    }

    /// Names passed to delete, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == "delete")
            .filter_map(|c| c.name.clone())
            .collect()
    }

    pub fn contains(&self, entity: EntityType, name: &str) -> bool {
        self.state()
            .records
            .contains_key(&(entity, name.to_string()))
    }

    /// Record a call and return the injected failure, if any
    fn begin(
        &self,
        state: &mut MemoryState,
        operation: &'static str,
        entity: Option<EntityType>,
        name: Option<&str>,
    ) -> Option<CliResponse> {
        state.calls.push(CallRecord {
            operation,
            entity,
            name: name.map(str::to_string),
        });
        entity
            .filter(|e| state.failures.contains(&(operation, *e)))
            .map(|e| CliResponse::failed(format!("injected failure: {} {}", operation, e)))
    }
}

/// Name carried by create params: the entity's name field, else `name`
fn name_from_params(entity: EntityType, params: &Map<String, Value>) -> Option<String> {
    params
        .get(entity.name_field())
        .or_else(|| params.get("name"))
        .map(value_to_string)
        .filter(|n| !n.is_empty())
}

fn field_matches(record: &Map<String, Value>, key: &str, expected: &Value) -> bool {
    record
        .get(key)
        .map(|actual| value_to_string(actual) == value_to_string(expected))
        .unwrap_or(false)
}

impl Collaborator for MemoryCollaborator {
    fn create(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse {
        let mut state = self.state();
        let name = name_from_params(entity, params);
        if let Some(failure) = self.begin(&mut state, "create", Some(entity), name.as_deref()) {
            return failure;
        }

        let Some(name) = name else {
            return CliResponse::failed(format!(
                "missing required parameter '{}'",
                entity.name_field()
            ));
        };
        if state.records.contains_key(&(entity, name.clone())) {
            return CliResponse::failed(format!("{} '{}' already exists", entity, name));
        }

        for parent in entity.direct_dependencies() {
            if let Some(parent_name) = params.get(parent.name_field()).map(value_to_string) {
                if !state.records.contains_key(&(*parent, parent_name.clone())) {
                    return CliResponse::failed(format!(
                        "{} '{}' not found",
                        parent, parent_name
                    ));
                }
            }
        }

        state.next_id += 1;
        let mut record = params.clone();
        record.remove("name");
        record.insert(entity.name_field().to_string(), json!(name));
        record.insert(
            "id".to_string(),
            json!(format!("{}-{}", entity.as_str(), state.next_id)),
        );
        state.records.insert((entity, name), record.clone());

        CliResponse::ok(Value::Object(record))
    }

    fn list(&self, entity: EntityType, params: &Map<String, Value>) -> CliResponse {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, "list", Some(entity), None) {
            return failure;
        }

        let items: Vec<Value> = state
            .records
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .filter(|(_, record)| {
                params
                    .iter()
                    .all(|(key, expected)| field_matches(record, key, expected))
            })
            .map(|(_, record)| Value::Object(record.clone()))
            .collect();

        CliResponse::ok(Value::Array(items))
    }

    fn get(&self, entity: EntityType, name: &str, _params: &Map<String, Value>) -> CliResponse {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, "get", Some(entity), Some(name)) {
            return failure;
        }

        match state.records.get(&(entity, name.to_string())) {
            Some(record) => CliResponse::ok(Value::Object(record.clone())),
            None => CliResponse::failed(format!("{} '{}' not found", entity, name)),
        }
    }

    fn update(
        &self,
        entity: EntityType,
        name: &str,
        params: &Map<String, Value>,
    ) -> CliResponse {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, "update", Some(entity), Some(name)) {
            return failure;
        }

        match state.records.get_mut(&(entity, name.to_string())) {
            Some(record) => {
                for (key, value) in params {
                    if key != entity.name_field() && key != "name" {
                        record.insert(key.clone(), value.clone());
                    }
                }
                CliResponse::ok(Value::Object(record.clone()))
            }
            None => CliResponse::failed(format!("{} '{}' not found", entity, name)),
        }
    }

    fn delete(&self, entity: EntityType, name: &str) -> CliResponse {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, "delete", Some(entity), Some(name)) {
            return failure;
        }

        let key = (entity, name.to_string());
        if !state.records.contains_key(&key) {
            return CliResponse::failed(format!("{} '{}' not found", entity, name));
        }

        let child = state.records.iter().find(|((child_entity, _), record)| {
            child_entity.direct_dependencies().contains(&entity)
                && field_matches(record, entity.name_field(), &json!(name))
        });
        if let Some(((child_entity, child_name), _)) = child {
            return CliResponse::failed(format!(
                "{} '{}' is still referenced by {} '{}'",
                entity, name, child_entity, child_name
            ));
        }

        state.records.remove(&key);
        CliResponse::ok(json!({ "deleted": name }))
    }

    fn execute_raw(&self, args: &[String]) -> CliResponse {
        let mut state = self.state();
        self.begin(&mut state, "execute_raw", None, None);
        CliResponse::ok(json!({ "args": args }))
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn verbose(&self) -> Option<Arc<dyn Collaborator>> {
        Some(Arc::new(Self {
            state: Arc::clone(&self.state),
            verbose: true,
        }))
    }
}
