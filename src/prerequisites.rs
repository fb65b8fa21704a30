//! Prerequisite resolution: order the topics a requested topic depends on.
//!
//! The catalog hands back the dependency graph around a topic; resolution is a
//! Kahn topological sort over it. Cycles are catalog data bugs and are reported
//! with the offending loop, never broken up silently.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, error};

use crate::config::CatalogEntry;
use crate::domain::{Level, TopicId};
use crate::error::EngineError;

/// topic -> topics it directly depends on.
pub type DependencyGraph = BTreeMap<TopicId, BTreeSet<TopicId>>;

pub trait PrerequisiteCatalog: Send + Sync {
  /// Every topic reachable from `topic` through dependency edges (including `topic`
  /// itself), each with its direct dependencies.
  fn prerequisites_of(&self, topic: &str, level: Level) -> DependencyGraph;
}

/// Catalog backed by a fixed list of entries (usually the `[[catalog]]` TOML table).
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
  entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
  pub fn new(entries: Vec<CatalogEntry>) -> Self {
    Self { entries }
  }

  fn direct_dependencies(&self, topic: &str, level: Level) -> BTreeSet<TopicId> {
    self
      .entries
      .iter()
      .filter(|e| e.topic == topic && e.level.map_or(true, |l| l == level))
      .flat_map(|e| e.depends_on.iter().cloned())
      .collect()
  }
}

impl PrerequisiteCatalog for StaticCatalog {
  fn prerequisites_of(&self, topic: &str, level: Level) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let mut queue: VecDeque<TopicId> = VecDeque::from([topic.to_string()]);
    while let Some(current) = queue.pop_front() {
      if graph.contains_key(&current) {
        continue;
      }
      let deps = self.direct_dependencies(&current, level);
      queue.extend(deps.iter().filter(|d| !graph.contains_key(*d)).cloned());
      graph.insert(current, deps);
    }
    graph
  }
}

/// Prerequisites of a topic, in an order where every topic follows its dependencies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedPrerequisites {
  /// Excludes the requested topic itself.
  pub order: Vec<TopicId>,
  pub depends_on: DependencyGraph,
}

impl ResolvedPrerequisites {
  pub fn dependencies_of(&self, topic: &str) -> BTreeSet<TopicId> {
    self.depends_on.get(topic).cloned().unwrap_or_default()
  }
}

pub fn resolve(catalog: &dyn PrerequisiteCatalog, topic: &str, level: Level) -> Result<ResolvedPrerequisites, EngineError> {
  let graph = catalog.prerequisites_of(topic, level);
  match topological_order(&graph) {
    Ok(order) => {
      let order: Vec<TopicId> = order.into_iter().filter(|t| t != topic).collect();
      debug!(target: "pathway", %topic, %level, prerequisites = ?order, "Resolved prerequisites");
      Ok(ResolvedPrerequisites { order, depends_on: graph })
    }
    Err(cycle) => {
      error!(target: "pathway", %topic, %level, cycle = %cycle.join(" -> "), "Prerequisite catalog contains a cycle");
      Err(EngineError::CyclicPrerequisite { cycle })
    }
  }
}

/// Kahn's algorithm; ties are broken alphabetically so the order is stable.
/// On failure returns one dependency loop, first topic repeated at the end.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<TopicId>, Vec<TopicId>> {
  let mut nodes: BTreeSet<&str> = graph.keys().map(String::as_str).collect();
  for deps in graph.values() {
    nodes.extend(deps.iter().map(String::as_str));
  }

  let mut pending: BTreeMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
  let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
  for (topic, deps) in graph {
    for dep in deps {
      *pending.entry(topic.as_str()).or_default() += 1;
      dependents.entry(dep.as_str()).or_default().push(topic.as_str());
    }
  }

  let mut ready: BTreeSet<&str> = pending.iter().filter(|(_, n)| **n == 0).map(|(t, _)| *t).collect();
  let mut order = Vec::with_capacity(nodes.len());
  while let Some(next) = ready.pop_first() {
    order.push(next.to_string());
    for dependent in dependents.get(next).into_iter().flatten() {
      if let Some(n) = pending.get_mut(dependent) {
        *n -= 1;
        if *n == 0 {
          ready.insert(*dependent);
        }
      }
    }
  }

  if order.len() == nodes.len() {
    return Ok(order);
  }

  let remaining: BTreeSet<&str> = pending.iter().filter(|(_, n)| **n > 0).map(|(t, _)| *t).collect();
  Err(find_cycle(graph, &remaining))
}

/// Every remaining node still waits on another remaining node, so walking
/// those edges must revisit a node.
fn find_cycle(graph: &DependencyGraph, remaining: &BTreeSet<&str>) -> Vec<TopicId> {
  let Some(start) = remaining.first() else { return Vec::new() };
  let mut walk: Vec<&str> = vec![*start];
  let mut current = *start;
  loop {
    let next = graph
      .get(current)
      .and_then(|deps| deps.iter().map(String::as_str).find(|d| remaining.contains(d)));
    let Some(next) = next else { return walk.iter().map(|s| s.to_string()).collect() };
    if let Some(pos) = walk.iter().position(|n| *n == next) {
      let mut cycle: Vec<TopicId> = walk[pos..].iter().map(|s| s.to_string()).collect();
      cycle.push(next.to_string());
      return cycle;
    }
    walk.push(next);
    current = next;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert_matches::assert_matches;

  fn entry(topic: &str, deps: &[&str]) -> CatalogEntry {
    CatalogEntry { topic: topic.into(), level: None, depends_on: deps.iter().map(|d| d.to_string()).collect() }
  }

  #[test]
  fn dependencies_come_before_dependents() {
    let catalog = StaticCatalog::new(vec![
      entry("async", &["closures", "traits"]),
      entry("closures", &["functions"]),
      entry("traits", &["functions", "structs"]),
    ]);
    let resolved = resolve(&catalog, "async", Level::Intermediate).unwrap();
    let pos = |t: &str| resolved.order.iter().position(|o| o == t).unwrap();

    assert_eq!(resolved.order.len(), 4);
    assert!(!resolved.order.contains(&"async".to_string()));
    assert!(pos("functions") < pos("closures"));
    assert!(pos("functions") < pos("traits"));
    assert!(pos("structs") < pos("traits"));
    assert_eq!(resolved.dependencies_of("async").len(), 2);
  }

  #[test]
  fn unknown_topic_has_no_prerequisites() {
    let resolved = resolve(&StaticCatalog::default(), "anything", Level::Beginner).unwrap();
    assert!(resolved.order.is_empty());
  }

  #[test]
  fn level_specific_entries_only_apply_to_their_level() {
    let mut advanced = entry("async", &["pinning"]);
    advanced.level = Some(Level::Advanced);
    let catalog = StaticCatalog::new(vec![entry("async", &["closures"]), advanced]);

    let beginner = resolve(&catalog, "async", Level::Beginner).unwrap();
    assert_eq!(beginner.order, vec!["closures".to_string()]);
    let adv = resolve(&catalog, "async", Level::Advanced).unwrap();
    assert_eq!(adv.order, vec!["closures".to_string(), "pinning".to_string()]);
  }

  #[test]
  fn cycles_are_reported_with_the_loop() {
    let catalog = StaticCatalog::new(vec![
      entry("a", &["b"]),
      entry("b", &["c"]),
      entry("c", &["a"]),
    ]);
    let err = resolve(&catalog, "a", Level::Beginner).unwrap_err();
    assert_matches!(err, EngineError::CyclicPrerequisite { ref cycle } => {
      assert_eq!(cycle.first(), cycle.last());
      assert_eq!(cycle.len(), 4);
    });
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let catalog = StaticCatalog::new(vec![entry("recursion", &["recursion"])]);
    let err = resolve(&catalog, "recursion", Level::Beginner).unwrap_err();
    assert_matches!(err, EngineError::CyclicPrerequisite { cycle } if cycle == vec!["recursion".to_string(), "recursion".to_string()]);
  }

  #[test]
  fn cycle_downstream_of_a_valid_prefix_is_still_found() {
    let graph: DependencyGraph = BTreeMap::from([
      ("top".to_string(), BTreeSet::from(["x".to_string(), "base".to_string()])),
      ("x".to_string(), BTreeSet::from(["y".to_string()])),
      ("y".to_string(), BTreeSet::from(["x".to_string()])),
    ]);
    let cycle = topological_order(&graph).unwrap_err();
    assert!(cycle.contains(&"x".to_string()) && cycle.contains(&"y".to_string()));
    assert!(!cycle.contains(&"base".to_string()));
  }
}
