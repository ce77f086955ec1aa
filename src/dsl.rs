//! DSL module: builder API for graphs.

use crate::graph::{Graph, GraphError, NodeId};
use crate::node::Node;
use std::collections::HashMap;
use thiserror::Error;

/// Handle to a node in the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub NodeId);

/// The graph builder.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
    node_names: HashMap<String, NodeId>,
}

/// DSL-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DslError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("no node named `{0}`")]
    MissingNode(String),
    #[error("a node named `{0}` already exists")]
    DuplicateName(String),
    #[error("no root node was chosen")]
    MissingRoot,
}

impl GraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn node<N: Node + 'static>(&mut self, node: N) -> NodeHandle {
        NodeHandle(self.graph.add_node(node))
    }

    /// Add a named node.
    pub fn node_named<N: Node + 'static>(
        &mut self,
        name: &str,
        node: N,
    ) -> Result<NodeHandle, DslError> {
        if self.node_names.contains_key(name) {
            return Err(DslError::DuplicateName(name.to_string()));
        }
        let handle = self.node(node);
        self.node_names.insert(name.to_string(), handle.0);
        Ok(handle)
    }

    /// Find a named node.
    pub fn lookup(&self, name: &str) -> Result<NodeHandle, DslError> {
        self.node_names
            .get(name)
            .copied()
            .map(NodeHandle)
            .ok_or_else(|| DslError::MissingNode(name.to_string()))
    }

    /// Feed `from`'s output into `to`.
    pub fn connect(&mut self, from: NodeHandle, to: NodeHandle) -> Result<(), DslError> {
        self.graph.connect(from.0, to.0)?;
        Ok(())
    }

    /// Connect each handle to the next one.
    pub fn chain(&mut self, handles: &[NodeHandle]) -> Result<(), DslError> {
        for pair in handles.windows(2) {
            self.connect(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Choose the node whose output is played.
    pub fn root(&mut self, handle: NodeHandle) -> Result<(), DslError> {
        self.graph.set_root(handle.0)?;
        Ok(())
    }

    pub fn root_named(&mut self, name: &str) -> Result<(), DslError> {
        let handle = self.lookup(name)?;
        self.root(handle)
    }

    /// Build the graph. A root must have been chosen.
    pub fn build(self) -> Result<Graph, DslError> {
        if self.graph.root().is_none() {
            return Err(DslError::MissingRoot);
        }
        Ok(self.graph)
    }
}
