// SPDX-License-Identifier: MIT

//! Graph builder - declares nodes and their dependencies, then compiles
//! them against a store and a checkpointer.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::compiled::CompiledGraph;
use super::node::Node;
use super::state::{GraphState, StateSchema};
use crate::adk::error::GraphError;
use crate::adk::memory::{BaseStore, Checkpointer};

/// Predicate gating whether a ready node runs
pub type Predicate = Arc<dyn Fn(&GraphState) -> bool + Send + Sync>;

/// How to wait for dependencies
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Wait for ALL dependencies to complete (default)
    #[default]
    All,
    /// Run when ANY dependency completes
    Any,
}

/// A node plus its scheduling rules
#[derive(Clone)]
pub struct GraphNode {
    pub id: String,
    pub node: Arc<dyn Node>,
    pub depends_on: Vec<String>,
    pub wait_mode: WaitMode,
    pub when: Option<Predicate>,
}

/// Mutable graph definition.
///
/// Nodes are scheduled by dependency: a node without dependencies is an
/// entry node; others become ready once their dependencies have completed
/// (all or any, per [`WaitMode`]) and their `when` predicate holds.
pub struct StateGraph {
    name: String,
    schema: Arc<StateSchema>,
    nodes: Vec<GraphNode>,
}

/// Fluent handle returned by [`StateGraph::add_node`]
pub struct NodeBuilder<'a> {
    node: &'a mut GraphNode,
}

impl NodeBuilder<'_> {
    /// Run after the given node
    pub fn after(self, id: &str) -> Self {
        self.node.depends_on.push(id.to_string());
        self
    }

    /// Run after every node in `ids`
    pub fn depends_on(self, ids: &[&str]) -> Self {
        self.node
            .depends_on
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn wait_for(self, mode: WaitMode) -> Self {
        self.node.wait_mode = mode;
        self
    }

    /// Only run when `predicate` holds on the current state
    pub fn when<P>(self, predicate: P) -> Self
    where
        P: Fn(&GraphState) -> bool + Send + Sync + 'static,
    {
        self.node.when = Some(Arc::new(predicate));
        self
    }
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            name: "StateGraph".to_string(),
            schema: Arc::new(schema),
            nodes: Vec::new(),
        }
    }

    /// Default display name for graphs compiled from this definition
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Register a node. Dependencies and conditions are set on the returned builder.
    pub fn add_node<N>(&mut self, id: impl Into<String>, node: N) -> NodeBuilder<'_>
    where
        N: Node + 'static,
    {
        let index = self.nodes.len();
        self.nodes.push(GraphNode {
            id: id.into(),
            node: Arc::new(node),
            depends_on: Vec::new(),
            wait_mode: WaitMode::All,
            when: None,
        });
        NodeBuilder {
            node: &mut self.nodes[index],
        }
    }

    /// Bind the definition to a store and a checkpointer.
    ///
    /// Compiling only validates and clones `Arc`s; it opens nothing, so it
    /// is cheap enough to do per request.
    pub fn compile(
        &self,
        store: Arc<dyn BaseStore>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledGraph, GraphError> {
        let order = self.validate()?;
        let by_id: HashMap<&str, &GraphNode> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let nodes = order
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|n| (*n).clone()))
            .collect();

        Ok(CompiledGraph::new(
            self.name.clone(),
            self.schema.clone(),
            nodes,
            store,
            checkpointer,
        ))
    }

    /// Check ids and dependencies; return node ids in topological order
    pub fn validate(&self) -> Result<Vec<String>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        for node in &self.nodes {
            if let Some(missing) = node.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
                return Err(GraphError::UnknownDependency {
                    node: node.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        topological_order(&self.nodes)
    }
}

/// Kahn's algorithm, keeping insertion order among independent nodes
fn topological_order(nodes: &[GraphNode]) -> Result<Vec<String>, GraphError> {
    let mut indegree: HashMap<&str, usize> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.depends_on.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        for dep in &node.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(node.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .filter(|n| n.depends_on.is_empty())
        .map(|n| n.id.as_str())
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let mut stuck: Vec<String> = nodes
            .iter()
            .filter(|n| !order.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        stuck.sort();
        return Err(GraphError::CircularDependency(stuck));
    }

    Ok(order)
}
