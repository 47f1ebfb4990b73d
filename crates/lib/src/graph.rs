//! Dependency graph of declared resources.
//!
//! Declaring a seeder populates a [`ResourceGraph`]; deploy and destroy walk
//! it in topological order. Ordering lives entirely in explicit edges, never
//! in declaration-order side effects.

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::resource::{LogicalId, ResourceDef};
use crate::util::hash::Hashable;

/// Error raised while building or ordering the resource graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  #[error("resource {id} is already declared")]
  DuplicateResource { id: LogicalId },

  #[error("dependency edge references unknown resource {id}")]
  UnknownResource { id: LogicalId },

  #[error("dependency cycle detected among declared resources")]
  CycleDetected,
}

/// Serialized form of a declared stack.
///
/// Resources are keyed by logical id and edges are sorted, so two identical
/// declarations synthesize byte-identical manifests with the same hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackManifest {
  pub resources: BTreeMap<LogicalId, ResourceDef>,
  /// Dependency edges as `(dependency, dependent)` pairs.
  pub edges: Vec<(LogicalId, LogicalId)>,
}

impl Hashable for StackManifest {}

/// A DAG of declared resources and their ordering constraints.
///
/// Edges run from dependency to dependent, so a topological sort yields a
/// valid creation order and its reverse a valid teardown order.
pub struct ResourceGraph {
  /// The underlying graph; node weights are logical ids.
  graph: DiGraph<LogicalId, ()>,

  /// Map from logical id to node index.
  nodes: HashMap<LogicalId, NodeIndex>,

  /// Definitions keyed by logical id.
  defs: BTreeMap<LogicalId, ResourceDef>,
}

impl ResourceGraph {
  pub fn new() -> Self {
    Self {
      graph: DiGraph::new(),
      nodes: HashMap::new(),
      defs: BTreeMap::new(),
    }
  }

  /// Declare a resource.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateResource` if `id` is already declared.
  pub fn insert(&mut self, id: LogicalId, def: ResourceDef) -> Result<(), GraphError> {
    if self.nodes.contains_key(&id) {
      return Err(GraphError::DuplicateResource { id });
    }

    let idx = self.graph.add_node(id.clone());
    self.nodes.insert(id.clone(), idx);
    self.defs.insert(id, def);
    Ok(())
  }

  /// Declare that `dependent` must be materialized after `dependency`.
  ///
  /// # Errors
  ///
  /// Returns `UnknownResource` if either endpoint has not been declared.
  pub fn depends_on(&mut self, dependent: &LogicalId, dependency: &LogicalId) -> Result<(), GraphError> {
    let &dependent_idx = self.nodes.get(dependent).ok_or_else(|| GraphError::UnknownResource {
      id: dependent.clone(),
    })?;
    let &dependency_idx = self.nodes.get(dependency).ok_or_else(|| GraphError::UnknownResource {
      id: dependency.clone(),
    })?;

    // Edge from dependency to dependent
    self.graph.add_edge(dependency_idx, dependent_idx, ());
    Ok(())
  }

  /// Get a resource definition by id.
  pub fn get(&self, id: &LogicalId) -> Option<&ResourceDef> {
    self.defs.get(id)
  }

  /// Whether a resource with this id has been declared.
  pub fn contains(&self, id: &LogicalId) -> bool {
    self.nodes.contains_key(id)
  }

  /// Number of declared resources.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Resources in a valid creation order (dependencies before dependents).
  ///
  /// # Errors
  ///
  /// Returns `CycleDetected` if the declared edges contain a cycle.
  pub fn deploy_order(&self) -> Result<Vec<LogicalId>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|_| GraphError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Resources in a valid teardown order (dependents before dependencies).
  ///
  /// # Errors
  ///
  /// Returns `CycleDetected` if the declared edges contain a cycle.
  pub fn destroy_order(&self) -> Result<Vec<LogicalId>, GraphError> {
    let mut order = self.deploy_order()?;
    order.reverse();
    Ok(order)
  }

  /// Direct dependencies of a resource.
  pub fn dependencies_of(&self, id: &LogicalId) -> Vec<LogicalId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect()
  }

  /// Direct dependents of a resource.
  pub fn dependents_of(&self, id: &LogicalId) -> Vec<LogicalId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect()
  }

  /// Whether `dependent` has a direct edge from `dependency`.
  pub fn has_dependency(&self, dependent: &LogicalId, dependency: &LogicalId) -> bool {
    self.dependencies_of(dependent).contains(dependency)
  }

  /// Synthesize the serializable manifest of everything declared.
  pub fn manifest(&self) -> StackManifest {
    let mut edges: Vec<(LogicalId, LogicalId)> = self
      .graph
      .edge_indices()
      .filter_map(|e| self.graph.edge_endpoints(e))
      .map(|(from, to)| (self.graph[from].clone(), self.graph[to].clone()))
      .collect();
    edges.sort();
    edges.dedup();

    StackManifest {
      resources: self.defs.clone(),
      edges,
    }
  }
}

impl Default for ResourceGraph {
  fn default() -> Self {
    Self::new()
  }
}
