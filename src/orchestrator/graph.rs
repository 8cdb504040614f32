//! Scenario dependency graph and batch scheduling
//!
//! Scenario B depends on scenario A when A creates an entity type that B
//! needs: one of B's declared dependencies, or something an entity B creates
//! depends on. An explicit `depends_on` entry adds an edge as well.

use std::collections::{BTreeMap, BTreeSet};

use super::scenario::TestScenario;
use crate::common::{Error, Result};

/// Directed graph over scenario ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node -> nodes it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Node -> nodes it depends on through declared dependencies or `depends_on`
    declared: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new(scenarios: &[TestScenario]) -> Self {
        let mut graph = Self::default();
        for scenario in scenarios {
            graph.edges.entry(scenario.id.clone()).or_default();
            graph.declared.entry(scenario.id.clone()).or_default();
        }

        let produced: Vec<_> = scenarios.iter().map(|s| s.produces()).collect();

        for b in scenarios {
            let required = b.requires();
            for (a, a_produces) in scenarios.iter().zip(&produced) {
                if a.id == b.id {
                    continue;
                }
                if a_produces.iter().any(|e| required.contains(e)) {
                    graph.add_edge(&b.id, &a.id);
                }
                if a_produces.iter().any(|e| b.dependencies.contains_key(e)) {
                    graph.add_declared(&b.id, &a.id);
                }
            }

            for target in &b.depends_on {
                if target == &b.id {
                    continue;
                }
                if graph.edges.contains_key(target) {
                    graph.add_edge(&b.id, target);
                    graph.add_declared(&b.id, target);
                } else {
                    tracing::warn!(
                        scenario = %b.id,
                        depends_on = %target,
                        "depends_on names a scenario that is not loaded; ignoring"
                    );
                }
            }
        }

        graph
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    fn add_declared(&mut self, from: &str, to: &str) {
        self.declared
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every scenario `id` depends on
    pub fn edges_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.edges.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Scenarios `id` depends on through declared dependencies or `depends_on`
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.declared.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Batches in execution order
    ///
    /// Each batch holds every scenario whose dependencies are all in earlier
    /// batches, sorted by id.
    pub fn execution_order(&self) -> Result<Vec<Vec<String>>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(node, deps)| (node.as_str(), deps.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (node, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(node.as_str());
            }
        }

        let mut batches = Vec::new();
        let mut placed = 0;

        loop {
            // BTreeMap iteration keeps each batch sorted by id
            let ready: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(node, _)| *node)
                .collect();
            if ready.is_empty() {
                break;
            }

            for node in &ready {
                in_degree.remove(node);
                for dependent in dependents.get(node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                    }
                }
            }

            placed += ready.len();
            batches.push(ready.into_iter().map(str::to_string).collect());
        }

        if placed != self.edges.len() {
            let remaining = in_degree.keys().map(|id| id.to_string()).collect();
            return Err(Error::Cycle { remaining });
        }

        Ok(batches)
    }

    /// Teardown order: batches reversed, each batch reversed
    pub fn cleanup_order(&self) -> Result<Vec<String>> {
        Ok(cleanup_order_of(&self.execution_order()?))
    }
}

/// Flatten batches into teardown order
pub fn cleanup_order_of(batches: &[Vec<String>]) -> Vec<String> {
    batches
        .iter()
        .rev()
        .flat_map(|batch| batch.iter().rev().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::entity::EntityType;
    use crate::orchestrator::scenario::{StepKind, TestStep};
    use serde_json::{json, Map, Value};

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn creating(id: &str, entity: EntityType) -> TestScenario {
        let mut scenario = TestScenario::new(id, id);
        scenario
            .steps
            .push(TestStep::entity(StepKind::Create, entity, Map::new()));
        scenario
    }

    fn team_then_machine() -> Vec<TestScenario> {
        let mut team = TestScenario::new("a_team", "Team");
        team.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Team,
            params(json!({"teamName": "foo"})),
        ));

        let mut machine = TestScenario::new("b_machine", "Machine");
        machine
            .dependencies
            .insert(EntityType::Team, "team_name".to_string());
        machine.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Machine,
            params(json!({"machineName": "bar", "teamName": "foo"})),
        ));

        // Loaded in reverse on purpose
        vec![machine, team]
    }

    #[test]
    fn test_team_runs_before_machine() {
        let graph = DependencyGraph::new(&team_then_machine());
        let batches = graph.execution_order().unwrap();
        assert_eq!(batches, vec![vec!["a_team"], vec!["b_machine"]]);
        assert_eq!(graph.dependencies_of("b_machine").collect::<Vec<_>>(), vec!["a_team"]);
        assert_eq!(graph.dependencies_of("a_team").count(), 0);
    }

    #[test]
    fn test_cleanup_order_reverses_batches() {
        let graph = DependencyGraph::new(&team_then_machine());
        assert_eq!(graph.cleanup_order().unwrap(), vec!["b_machine", "a_team"]);

        let batches = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ];
        assert_eq!(cleanup_order_of(&batches), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_disjoint_scenarios_share_first_batch() {
        let scenarios = vec![
            TestScenario::new("z", "Z"),
            TestScenario::new("x", "X"),
            TestScenario::new("y", "Y"),
        ];
        let batches = DependencyGraph::new(&scenarios).execution_order().unwrap();
        assert_eq!(batches, vec![vec!["x", "y", "z"]]);
    }

    #[test]
    fn test_every_scenario_after_its_dependencies() {
        let scenarios = vec![
            creating("company", EntityType::Company),
            creating("region", EntityType::Region),
            creating("bridge", EntityType::Bridge),
            creating("team", EntityType::Team),
            creating("machine", EntityType::Machine),
            creating("repo", EntityType::Repository),
            creating("storage", EntityType::Storage),
        ];
        let graph = DependencyGraph::new(&scenarios);
        let batches = graph.execution_order().unwrap();

        let position = |id: &str| batches.iter().position(|b| b.iter().any(|x| x == id));
        let flat: Vec<&String> = batches.iter().flatten().collect();
        assert_eq!(flat.len(), scenarios.len());

        for scenario in &scenarios {
            for dep in graph.edges_of(&scenario.id) {
                assert!(position(dep) < position(&scenario.id), "{} before {}", dep, scenario.id);
            }
        }
        assert_eq!(batches[0], vec!["company"]);
        assert_eq!(batches.last().unwrap(), &vec!["repo"]);
    }

    #[test]
    fn test_same_entity_producers_do_not_depend_on_each_other() {
        let scenarios = vec![
            creating("t1", EntityType::Team),
            creating("t2", EntityType::Team),
        ];
        let batches = DependencyGraph::new(&scenarios).execution_order().unwrap();
        assert_eq!(batches, vec![vec!["t1", "t2"]]);
    }

    #[test]
    fn test_self_contained_scenarios_share_a_batch() {
        let mut machine = TestScenario::new("a", "Team and machine");
        machine.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Team,
            params(json!({"teamName": "t1"})),
        ));
        machine.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Machine,
            params(json!({"machineName": "m1", "teamName": "t1"})),
        ));

        let mut storage = TestScenario::new("b", "Team and storage");
        storage.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Team,
            params(json!({"teamName": "t2"})),
        ));
        storage.steps.push(TestStep::entity(
            StepKind::Create,
            EntityType::Storage,
            params(json!({"storageName": "s1", "teamName": "t2"})),
        ));

        let batches = DependencyGraph::new(&[machine, storage])
            .execution_order()
            .unwrap();
        assert_eq!(batches, vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_expected_failure_create_is_not_a_producer() {
        let mut duplicate = TestScenario::new("negative", "Duplicate team");
        duplicate
            .dependencies
            .insert(EntityType::Team, "team_name".to_string());
        let mut step = TestStep::entity(
            StepKind::Create,
            EntityType::Team,
            params(json!({"teamName": "{{team_name}}"})),
        );
        step.expect.insert("success".to_string(), json!(false));
        duplicate.steps.push(step);

        let mut scenarios = team_then_machine();
        scenarios.push(duplicate);
        let graph = DependencyGraph::new(&scenarios);

        assert_eq!(graph.edges_of("b_machine").collect::<Vec<_>>(), vec!["a_team"]);
        assert_eq!(graph.dependencies_of("b_machine").collect::<Vec<_>>(), vec!["a_team"]);
        assert_eq!(graph.edges_of("negative").collect::<Vec<_>>(), vec!["a_team"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut a = TestScenario::new("a", "A");
        a.depends_on.push("b".to_string());
        let mut b = TestScenario::new("b", "B");
        b.depends_on.push("a".to_string());
        let free = TestScenario::new("c", "C");

        let err = DependencyGraph::new(&[a, b, free])
            .execution_order()
            .unwrap_err();
        match err {
            Error::Cycle { remaining } => assert_eq!(remaining, vec!["a", "b"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_depends_on_unknown_scenario_is_ignored() {
        let mut a = TestScenario::new("a", "A");
        a.depends_on.push("missing".to_string());
        let graph = DependencyGraph::new(&[a]);
        assert_eq!(graph.execution_order().unwrap(), vec![vec!["a"]]);
    }
}
