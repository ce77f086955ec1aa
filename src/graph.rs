//! Graph module: the editable node graph handed to the player.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::invariant_ppt::{assert_invariant, GRAPH_LEGALITY, GRAPH_REJECTS_INVALID};
use crate::node::Node;
use thiserror::Error;

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A dependency: `to` reads the output of `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The node whose output is read.
    pub from: NodeId,
    /// The node that reads it.
    pub to: NodeId,
}

/// A node in the graph.
pub struct NodeData {
    /// The unique ID of this node.
    pub id: NodeId,
    /// The processing unit.
    pub node: Box<dyn Node>,
}

impl std::fmt::Debug for NodeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeData")
            .field("id", &self.id)
            .field("node", &self.node.name())
            .finish()
    }
}

/// A DAG of processing nodes plus the root whose output is played.
#[derive(Debug, Default)]
pub struct Graph {
    /// All nodes in the graph (None for removed nodes).
    pub(crate) nodes: Vec<Option<NodeData>>,
    /// All edges, in insertion order.
    pub(crate) edges: Vec<Edge>,
    pub(crate) root: Option<NodeId>,
}

/// Errors that can occur when building the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Adding edge would create a cycle.
    #[error("edge would create a cycle")]
    CycleDetected,
    /// Node does not exist.
    #[error("node {0:?} does not exist")]
    InvalidNode(NodeId),
    /// Edge from a node to itself.
    #[error("node {0:?} cannot depend on itself")]
    SelfLoop(NodeId),
    /// The same dependency was added twice.
    #[error("edge {0:?} -> {1:?} already exists")]
    DuplicateEdge(NodeId, NodeId),
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> NodeId {
        self.add_boxed_node(Box::new(node))
    }

    /// Add an already boxed node.
    pub fn add_boxed_node(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeData { id, node }));
        id
    }

    /// Make `to` depend on `from`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.add_edge(Edge { from, to })
    }

    /// Add an edge, validating both ends exist and no cycle forms.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if let Err(err) = self.check_edge(&edge) {
            assert_invariant(
                GRAPH_REJECTS_INVALID,
                self.rejection_holds(&edge, err),
                "Rejected edge matches the reported reason",
                Some("add_edge"),
            );
            return Err(err);
        }

        self.edges.push(edge);

        assert_invariant(
            GRAPH_LEGALITY,
            self.contains(edge.from) && self.contains(edge.to) && edge.from != edge.to,
            "Every edge joins two distinct live nodes",
            Some("add_edge"),
        );

        Ok(())
    }

    fn check_edge(&self, edge: &Edge) -> Result<(), GraphError> {
        for id in [edge.from, edge.to] {
            if !self.contains(id) {
                return Err(GraphError::InvalidNode(id));
            }
        }
        if edge.from == edge.to {
            return Err(GraphError::SelfLoop(edge.from));
        }
        if self.edges.contains(edge) {
            return Err(GraphError::DuplicateEdge(edge.from, edge.to));
        }
        if self.would_create_cycle(edge) {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }

    fn rejection_holds(&self, edge: &Edge, err: GraphError) -> bool {
        match err {
            GraphError::InvalidNode(id) => !self.contains(id),
            GraphError::SelfLoop(id) => edge.from == id && edge.to == id,
            GraphError::DuplicateEdge(from, to) => self.edges.contains(&Edge { from, to }),
            // A cycle needs a path back from `to`, so the ends differ.
            GraphError::CycleDetected => edge.from != edge.to,
        }
    }

    /// Remove a node and all edges connected to it, returning it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Box<dyn Node>, GraphError> {
        let data = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(GraphError::InvalidNode(id))?;
        self.edges.retain(|e| e.from != id && e.to != id);
        if self.root == Some(id) {
            self.root = None;
        }
        Ok(data.node)
    }

    /// Choose the node whose output the player delivers.
    pub fn set_root(&mut self, id: NodeId) -> Result<(), GraphError> {
        if !self.contains(id) {
            return Err(GraphError::InvalidNode(id));
        }
        self.root = Some(id);
        Ok(())
    }

    /// The root node, if one was set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Whether `id` names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .map(|data| data.node.as_ref())
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Nodes `id` reads from, in connection order.
    pub fn inputs_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.to == id)
            .map(|e| e.from)
    }

    fn would_create_cycle(&self, edge: &Edge) -> bool {
        // Adding from -> to closes a cycle iff `to` already reaches `from`.
        let mut visited = vec![false; self.nodes.len()];
        self.dfs(edge.to, edge.from, &mut visited)
    }

    fn dfs(&self, current: NodeId, target: NodeId, visited: &mut [bool]) -> bool {
        if current == target {
            return true;
        }
        if visited[current.0] {
            return false;
        }
        visited[current.0] = true;
        for edge in &self.edges {
            if edge.from == current && self.dfs(edge.to, target, visited) {
                return true;
            }
        }
        false
    }
}
