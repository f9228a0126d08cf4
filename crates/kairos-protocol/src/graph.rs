use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ids::{GraphId, NodeId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: String,
    pub tool: Option<String>,
    pub input: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub condition: Option<String>,
}

/// `(id, startNodeId?, nodes: map<id,Node>, edges: list<Edge>)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: GraphId,
    pub start_node_id: Option<NodeId>,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no nodes")]
    Empty,
    #[error("node {0} has no type")]
    MissingNodeType(String),
    #[error("edge references unknown node {0}")]
    DanglingEdge(String),
    #[error("configured start node {0} does not exist")]
    MissingStartNode(String),
    #[error("graph has no unique in-degree-zero node to use as start")]
    AmbiguousStart,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("malformed condition expression: {0}")]
    Malformed(String),
}

impl Graph {
    /// Validates shape invariants (§4.7): every referenced node exists, at
    /// least one node exists, every node carries a type, every edge has both
    /// endpoints.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        for node in self.nodes.values() {
            if node.node_type.trim().is_empty() {
                return Err(GraphError::MissingNodeType(node.id.to_string()));
            }
        }
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                return Err(GraphError::DanglingEdge(edge.from.to_string()));
            }
            if !self.nodes.contains_key(&edge.to) {
                return Err(GraphError::DanglingEdge(edge.to.to_string()));
            }
        }
        self.resolve_start()?;
        Ok(())
    }

    /// The start node is `graph.start` if set (must exist), or the unique
    /// node with in-degree zero.
    pub fn resolve_start(&self) -> Result<NodeId, GraphError> {
        if let Some(start) = &self.start_node_id {
            return if self.nodes.contains_key(start) {
                Ok(start.clone())
            } else {
                Err(GraphError::MissingStartNode(start.to_string()))
            };
        }

        let mut in_degree: HashMap<&NodeId, u32> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(&edge.to).or_insert(0) += 1;
        }

        let zero_in_degree: Vec<&NodeId> = in_degree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        match zero_in_degree.as_slice() {
            [single] => Ok((*single).clone()),
            _ => Err(GraphError::AmbiguousStart),
        }
    }

    pub fn outgoing_edges(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| &edge.from == node_id).collect()
    }
}

/// `(last, outputs: map<nodeId, value>)` (§3). Mutated by the executor per
/// node; lifecycle equals the single execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerState {
    pub last: Option<serde_json::Value>,
    pub outputs: HashMap<NodeId, serde_json::Value>,
    #[serde(skip)]
    visited: HashSet<NodeId>,
}

impl PlannerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_visit(&mut self, node_id: NodeId) -> bool {
        self.visited.insert(node_id)
    }

    pub fn set_output(&mut self, node_id: NodeId, value: serde_json::Value) {
        self.last = Some(value.clone());
        self.outputs.insert(node_id, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: &str) -> Node {
        Node {
            id: NodeId::from_string(id),
            node_type: node_type.to_owned(),
            tool: None,
            input: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_graph_is_rejected() {
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: None,
            nodes: HashMap::new(),
            edges: vec![],
        };
        assert_eq!(graph.validate().unwrap_err(), GraphError::Empty);
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "noop"));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: None,
            nodes,
            edges: vec![Edge {
                from: NodeId::from_string("a"),
                to: NodeId::from_string("missing"),
                condition: None,
            }],
        };
        assert!(matches!(graph.validate(), Err(GraphError::DanglingEdge(_))));
    }

    #[test]
    fn unique_zero_in_degree_node_is_start() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "noop"));
        nodes.insert(NodeId::from_string("b"), node("b", "noop"));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: None,
            nodes,
            edges: vec![Edge {
                from: NodeId::from_string("a"),
                to: NodeId::from_string("b"),
                condition: None,
            }],
        };
        assert_eq!(graph.resolve_start().unwrap(), NodeId::from_string("a"));
    }
}
