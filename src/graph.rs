use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use serde_derive::{Deserialize, Serialize};
use crate::core::{EdgeKey, NodeId};
use crate::geometry::Cell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(NodeId),
    DuplicateNode(NodeId),
    DuplicateEdge(EdgeKey),
    SelfLoop(NodeId),
}

impl Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::UnknownNode(n) => write!(f, "unknown node {}", n),
            GraphError::DuplicateNode(n) => write!(f, "duplicate node {}", n),
            GraphError::DuplicateEdge(e) => write!(f, "duplicate edge {}", e),
            GraphError::SelfLoop(n) => write!(f, "self loop on {}", n),
        }
    }
}

impl std::error::Error for GraphError {}

/// The logical room graph with its type assignments: every node carries the
/// room type it must be filled with, every edge the connection type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelGraph {
    nodes: BTreeMap<NodeId, String>,
    edges: BTreeMap<EdgeKey, String>,
}

impl LevelGraph {
    pub fn new() -> Self { Self::default() }

    /// Builds a graph directly from node and edge lists.
    pub fn from_parts<N, E>(nodes: N, edges: E) -> Result<Self, GraphError>
    where
        N: IntoIterator<Item = (NodeId, String)>,
        E: IntoIterator<Item = ((NodeId, NodeId), String)>,
    {
        let mut g = LevelGraph::new();
        for (n, room_type) in nodes {
            g.add_node(n, room_type)?;
        }
        for ((a, b), conn_type) in edges {
            g.add_edge(a, b, conn_type)?;
        }
        Ok(g)
    }

    pub fn add_node<S: Into<String>>(&mut self, node: NodeId, room_type: S) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node) {
            return Err(GraphError::DuplicateNode(node));
        }
        self.nodes.insert(node, room_type.into());
        Ok(())
    }

    pub fn add_edge<S: Into<String>>(&mut self, a: NodeId, b: NodeId, conn_type: S) -> Result<EdgeKey, GraphError> {
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        for n in [a, b] {
            if !self.nodes.contains_key(&n) {
                return Err(GraphError::UnknownNode(n));
            }
        }
        let key = EdgeKey::new(a, b);
        if self.edges.contains_key(&key) {
            return Err(GraphError::DuplicateEdge(key));
        }
        self.edges.insert(key, conn_type.into());
        Ok(key)
    }

    pub fn room_type(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|s| s.as_str())
    }

    pub fn connection_type(&self, edge: EdgeKey) -> Option<&str> {
        self.edges.get(&edge).map(|s| s.as_str())
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.edges.keys().copied()
    }

    pub fn node_count(&self) -> usize { self.nodes.len() }

    pub fn edge_count(&self) -> usize { self.edges.len() }

    pub fn contains_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.edges.contains_key(&EdgeKey::new(a, b))
    }

    pub fn is_connected(&self) -> bool {
        let mut ds = DisjointSet::new();
        for n in self.nodes() {
            ds.insert(&n);
        }
        for e in self.edges() {
            ds.unite(&e.lo(), &e.hi());
        }
        let roots: HashSet<NodeId> = self.nodes().map(|n| ds.find(&n)).collect();
        roots.len() <= 1
    }
}

/// An externally ordered group of edges. The engine attempts edges in chain
/// order and never reorders them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub edges: Vec<(NodeId, NodeId)>,
}

impl Chain {
    pub fn new(edges: Vec<(NodeId, NodeId)>) -> Self {
        Chain { edges }
    }

    /// Convenience for tests and demos: a path through the given node ids.
    pub fn path(ids: &[u32]) -> Self {
        Chain { edges: ids.windows(2).map(|w| (NodeId(w[0]), NodeId(w[1]))).collect() }
    }
}

/// Optional approximate root positions for rooms. The solver treats these as
/// preferences only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    hints: BTreeMap<NodeId, Cell>,
}

impl Layout {
    pub fn new() -> Self { Self::default() }

    pub fn hint(&mut self, node: NodeId, root: Cell) -> &mut Self {
        self.hints.insert(node, root);
        self
    }

    pub fn get(&self, node: NodeId) -> Option<Cell> {
        self.hints.get(&node).copied()
    }
}

struct DisjointSet<T: Eq + Clone + Hash> {
    parents: HashMap<T, T>,
}

impl <T: Eq + Clone + Hash> DisjointSet<T> {
    pub fn new() -> Self {
        Self { parents: HashMap::new() }
    }

    pub fn insert(&mut self, t: &T) {
        self.parents.insert(t.clone(), t.clone());
    }

    pub fn unite(&mut self, t1: &T, t2: &T) {
        let p1 = self.find(t1);
        let p2 = self.find(t2);
        if let Some(p) = self.parents.get_mut(&p1) {
            *p = p2;
        }
    }

    pub fn find(&mut self, t: &T) -> T {
        let parent = match self.parents.get(t) {
            Some(p) => p.clone(),
            None => return t.clone(),
        };
        if *t == parent {
            parent
        } else {
            let p = self.find(&parent);
            if let Some(tp) = self.parents.get_mut(t) {
                *tp = p.clone();
            }
            p
        }
    }
}
