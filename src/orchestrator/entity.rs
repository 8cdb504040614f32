//! Entity dependency model
//!
//! A static table of which remote resource types must exist before another
//! can be created. The table is acyclic by construction; the topological
//! order check exists to catch mistakes when it is edited.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::common::{Error, Result};

/// Category of remote resource managed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    User,
    Team,
    Region,
    Bridge,
    Machine,
    Repository,
    Storage,
    Schedule,
    QueueItem,
}

/// How `verify` steps retrieve an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMethod {
    /// Direct lookup by name
    Get,
    /// List the collection and match on the name field
    List,
}

/// Per-entity retrieval configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLookup {
    pub method: LookupMethod,
    /// Record field holding the entity's name
    pub name_field: &'static str,
    /// Parameters the listing call cannot do without
    pub context_params: &'static [&'static str],
}

impl EntityType {
    /// All entity types in declaration order
    pub const ALL: [EntityType; 10] = [
        EntityType::Company,
        EntityType::User,
        EntityType::Team,
        EntityType::Region,
        EntityType::Bridge,
        EntityType::Machine,
        EntityType::Repository,
        EntityType::Storage,
        EntityType::Schedule,
        EntityType::QueueItem,
    ];

    /// Wire name of the entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::User => "user",
            EntityType::Team => "team",
            EntityType::Region => "region",
            EntityType::Bridge => "bridge",
            EntityType::Machine => "machine",
            EntityType::Repository => "repository",
            EntityType::Storage => "storage",
            EntityType::Schedule => "schedule",
            EntityType::QueueItem => "queue_item",
        }
    }

    /// Entity types that must exist before this one can be created
    pub fn direct_dependencies(&self) -> &'static [EntityType] {
        use EntityType::*;
        match self {
            Company => &[],
            User => &[Company],
            Team => &[Company],
            Region => &[Company],
            Bridge => &[Region],
            Machine => &[Team, Bridge],
            Repository => &[Team, Machine],
            Storage => &[Team],
            Schedule => &[Team],
            QueueItem => &[Team, Machine],
        }
    }

    /// Parameter and record key naming an instance of this entity
    pub fn name_field(&self) -> &'static str {
        self.lookup().name_field
    }

    /// Retrieval configuration used by `verify`
    pub fn lookup(&self) -> EntityLookup {
        use EntityType::*;
        const TEAM_SCOPED: &[&str] = &["teamName"];
        let (method, name_field, context_params): (LookupMethod, &'static str, &'static [&'static str]) =
            match self {
                Company => (LookupMethod::Get, "companyName", &[]),
                User => (LookupMethod::Get, "userEmail", &[]),
                Team => (LookupMethod::Get, "teamName", &[]),
                Region => (LookupMethod::Get, "regionName", &[]),
                Bridge => (LookupMethod::List, "bridgeName", &["regionName"]),
                Machine => (LookupMethod::List, "machineName", TEAM_SCOPED),
                Repository => (LookupMethod::List, "repositoryName", TEAM_SCOPED),
                Storage => (LookupMethod::List, "storageName", TEAM_SCOPED),
                Schedule => (LookupMethod::List, "scheduleName", TEAM_SCOPED),
                QueueItem => (LookupMethod::List, "taskId", TEAM_SCOPED),
            };
        EntityLookup {
            method,
            name_field,
            context_params,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        EntityType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == normalized)
            .ok_or_else(|| Error::UnknownEntity(s.to_string()))
    }
}

/// Direct dependencies of an entity type
pub fn direct_dependencies(entity: EntityType) -> BTreeSet<EntityType> {
    entity.direct_dependencies().iter().copied().collect()
}

/// Breadth-first closure over direct dependencies, excluding the entity itself
pub fn transitive_dependencies(entity: EntityType) -> BTreeSet<EntityType> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<EntityType> = entity.direct_dependencies().iter().copied().collect();

    while let Some(next) = queue.pop_front() {
        if next == entity || !seen.insert(next) {
            continue;
        }
        queue.extend(next.direct_dependencies().iter().copied());
    }

    seen
}

/// Order nodes so every node follows all of its dependencies
///
/// Each round places every node whose dependencies are already placed. A
/// round that places nothing means the dependency table contains a cycle.
pub fn topological_order<T, F>(nodes: &[T], dependencies: F) -> Result<Vec<T>>
where
    T: Copy + Eq + std::hash::Hash + fmt::Debug,
    F: Fn(T) -> Vec<T>,
{
    let mut placed: HashSet<T> = HashSet::with_capacity(nodes.len());
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let ready: Vec<T> = nodes
            .iter()
            .copied()
            .filter(|n| !placed.contains(n))
            .filter(|n| dependencies(*n).iter().all(|d| placed.contains(d)))
            .collect();

        if ready.is_empty() {
            let stuck: Vec<String> = nodes
                .iter()
                .filter(|n| !placed.contains(n))
                .map(|n| format!("{:?}", n))
                .collect();
            return Err(Error::Config(format!(
                "entity dependency table contains a cycle among: {}",
                stuck.join(", ")
            )));
        }

        for node in ready {
            placed.insert(node);
            order.push(node);
        }
    }

    Ok(order)
}

/// Creation order over all entity types
pub fn global_topological_order() -> Result<Vec<EntityType>> {
    topological_order(&EntityType::ALL, |e| e.direct_dependencies().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_names() {
        assert_eq!("team".parse::<EntityType>().unwrap(), EntityType::Team);
        assert_eq!(
            "queue_item".parse::<EntityType>().unwrap(),
            EntityType::QueueItem
        );
        assert_eq!(
            "Queue-Item".parse::<EntityType>().unwrap(),
            EntityType::QueueItem
        );
        assert!(matches!(
            "spaceship".parse::<EntityType>(),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for entity in EntityType::ALL {
            assert_eq!(entity.to_string().parse::<EntityType>().unwrap(), entity);
        }
    }

    #[test]
    fn test_transitive_dependencies_of_machine() {
        let deps = transitive_dependencies(EntityType::Machine);
        let expected: BTreeSet<_> = [
            EntityType::Team,
            EntityType::Bridge,
            EntityType::Company,
            EntityType::Region,
        ]
        .into_iter()
        .collect();
        assert_eq!(deps, expected);
        assert!(!deps.contains(&EntityType::Machine));
    }

    #[test]
    fn test_company_has_no_dependencies() {
        assert!(direct_dependencies(EntityType::Company).is_empty());
        assert!(transitive_dependencies(EntityType::Company).is_empty());
    }

    #[test]
    fn test_global_order_places_dependencies_first() {
        let order = global_topological_order().unwrap();
        assert_eq!(order.len(), EntityType::ALL.len());
        assert_eq!(order[0], EntityType::Company);

        let position = |e: EntityType| order.iter().position(|x| *x == e).unwrap();
        for entity in EntityType::ALL {
            for dep in entity.direct_dependencies() {
                assert!(
                    position(*dep) < position(entity),
                    "{} must come before {}",
                    dep,
                    entity
                );
            }
        }
    }

    #[test]
    fn test_topological_order_detects_stall() {
        // 1 -> 2 -> 3 -> 2
        let deps = |n: u8| match n {
            2 => vec![3],
            3 => vec![2],
            _ => vec![],
        };
        let err = topological_order(&[1u8, 2, 3], deps).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_list_lookups_carry_context_params() {
        let machine = EntityType::Machine.lookup();
        assert_eq!(machine.method, LookupMethod::List);
        assert_eq!(machine.context_params, &["teamName"]);

        let team = EntityType::Team.lookup();
        assert_eq!(team.method, LookupMethod::Get);
        assert_eq!(team.name_field, "teamName");
    }
}
