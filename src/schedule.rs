//! Dependency graph and modifier scheduling
//!
//! Each entity gets a bipartite graph of ports and modifiers. Ports only act
//! as synchronization points: an update, influence or subentity that reads
//! a port is ordered after every modifier that writes it. The schedule is a
//! topological order of the graph filtered down to modifiers.

use std::collections::VecDeque;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::debug;

use crate::cache::BodyCache;
use crate::model::{EntityId, Model, Modifier, PortId, UpdateId};
use crate::parser::{accessed_ports, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Port(PortId),
    Modifier(Modifier),
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Port(p) => write!(f, "{}", p),
            GraphNode::Modifier(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    /// The modifiers of an entity depend on each other in a cycle. This is
    /// a modelling error, not a runtime condition.
    #[error("dependency graph of `{entity}` is not acyclic (involved: {})", involved.join(", "))]
    Cycle { entity: String, involved: Vec<String> },

    #[error("cannot read the body of update `{update}`: {source}")]
    Parse {
        update: String,
        #[source]
        source: ParseError,
    },
}

/// Directed graph in insertion order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: IndexMap<GraphNode, IndexSet<GraphNode>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) {
        self.edges.entry(node).or_default();
    }

    pub fn add_edge(&mut self, from: GraphNode, to: GraphNode) {
        self.add_node(to);
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn nodes(&self) -> impl Iterator<Item = GraphNode> + '_ {
        self.edges.keys().copied()
    }

    pub fn successors(&self, node: GraphNode) -> impl Iterator<Item = GraphNode> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn contains_edge(&self, from: GraphNode, to: GraphNode) -> bool {
        self.edges.get(&from).is_some_and(|s| s.contains(&to))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Topological order (Kahn's algorithm). On a cycle, returns every node
    /// that could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<GraphNode>, Vec<GraphNode>> {
        let mut in_degree: IndexMap<GraphNode, usize> = self.nodes().map(|n| (n, 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree += 1;
                }
            }
        }

        let mut ready: VecDeque<GraphNode> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for next in self.successors(node) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }

        if order.len() != in_degree.len() {
            return Err(in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(node, _)| node)
                .collect());
        }
        Ok(order)
    }
}

/// Build the dependency graph of one entity. Only updates of the entity's
/// current state take part.
pub fn build_graph(model: &Model, entity: EntityId, cache: &mut BodyCache) -> Result<DependencyGraph, ScheduleError> {
    let mut graph = DependencyGraph::new();

    for &influence in model.influences(entity) {
        let record = model.influence(influence);
        let node = GraphNode::Modifier(Modifier::Influence(influence));
        graph.add_edge(GraphNode::Port(record.source), node);
        graph.add_edge(node, GraphNode::Port(record.target));
    }

    for update in model.active_updates(entity) {
        let record = model.update(update);
        let node = GraphNode::Modifier(Modifier::Update(update));
        graph.add_edge(node, GraphNode::Port(record.target));
        for port in read_ports(model, update, cache)? {
            if port != record.target {
                graph.add_edge(GraphNode::Port(port), node);
            }
        }
    }

    for &sub in model.entities(entity) {
        let node = GraphNode::Modifier(Modifier::Subentity(sub));
        graph.add_node(node);
        for port in model.inputs(sub) {
            graph.add_edge(GraphNode::Port(port), node);
        }
        for port in model.outputs(sub) {
            graph.add_edge(node, GraphNode::Port(port));
        }
    }

    Ok(graph)
}

fn read_ports(model: &Model, update: UpdateId, cache: &mut BodyCache) -> Result<IndexSet<PortId>, ScheduleError> {
    let record = model.update(update);
    let function = cache.parse(&record.function).map_err(|source| ScheduleError::Parse {
        update: model.modifier_name(Modifier::Update(update)),
        source,
    })?;
    Ok(accessed_ports(model, record.entity, &function))
}

/// Modifiers of `entity` in an order that respects every data dependency
pub fn order(model: &Model, entity: EntityId, cache: &mut BodyCache) -> Result<Vec<Modifier>, ScheduleError> {
    let graph = build_graph(model, entity, cache)?;
    let nodes = graph.topological_order().map_err(|remaining| ScheduleError::Cycle {
        entity: model.entity_path(entity),
        involved: remaining.into_iter().map(|node| node_name(model, entity, node)).collect(),
    })?;
    let modifiers: Vec<Modifier> = nodes
        .into_iter()
        .filter_map(|node| match node {
            GraphNode::Modifier(m) => Some(m),
            GraphNode::Port(_) => None,
        })
        .collect();
    debug!(
        entity = %model.entity_path(entity),
        nodes = graph.len(),
        modifiers = modifiers.len(),
        "computed modifier order"
    );
    Ok(modifiers)
}

fn node_name(model: &Model, entity: EntityId, node: GraphNode) -> String {
    match node {
        GraphNode::Port(port) => model
            .path_to_port(entity, port)
            .unwrap_or_else(|| model.port(port).name.clone()),
        GraphNode::Modifier(modifier) => model.modifier_name(modifier),
    }
}
