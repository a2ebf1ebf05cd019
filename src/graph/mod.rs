//! Graph orchestration: named nodes joined by static and conditional edges.
//!
//! A [`Graph`] is assembled once with a [`GraphBuilder`], validated, and then
//! shared immutably (`Arc<Graph>`) across concurrent runs. Each run owns its
//! [`GraphState`] and is driven to the terminal marker [`END`] by
//! [`GraphEngine`].

pub mod engine;
pub mod intent;
pub mod node;
pub mod state;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tracing::warn;

use crate::error::{GraphError, GraphResult};

pub use engine::{GraphConfig, GraphEngine};
pub use intent::{IntentCategory, IntentClassifier, IntentMatch, IntentRouterNode, route_next};
pub use node::{FnNode, Node, RunContext};
pub use state::{GraphState, NodeFailure, RetrievedDoc, RoutePlan, ToolCallRecord};

/// Terminal marker. Never a node name.
pub const END: &str = "__end__";

type RouteFn = dyn Fn(&GraphState) -> String + Send + Sync;

/// How a node hands over control once it succeeds.
pub enum Edge {
    /// Always go to this node (or [`END`]).
    Static(String),
    /// Ask the routing function, which must answer with one of `candidates`
    /// or [`END`].
    Conditional {
        candidates: BTreeSet<String>,
        route: Box<RouteFn>,
    },
}

impl Edge {
    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Static(to) => vec![to.as_str()],
            Edge::Conditional { candidates, .. } => candidates.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Edge::Conditional { candidates, .. } => f
                .debug_struct("Conditional")
                .field("candidates", candidates)
                .finish_non_exhaustive(),
        }
    }
}

/// A validated, immutable orchestration graph.
pub struct Graph {
    name: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    entry: String,
    edges: HashMap<String, Edge>,
    error_handler: Option<String>,
}

impl Graph {
    pub fn builder(name: impl Into<String>) -> GraphBuilder {
        GraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn error_handler(&self) -> Option<&str> {
        self.error_handler.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }

    /// Node names, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Nodes that no path from the entry reaches, sorted. The error handler
    /// counts as reachable.
    pub fn unreachable_nodes(&self) -> Vec<&str> {
        let mut topology: DiGraph<&str, ()> = DiGraph::new();
        let indices: HashMap<&str, NodeIndex> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), topology.add_node(name.as_str())))
            .collect();
        for (from, edge) in &self.edges {
            for to in edge.targets() {
                if let (Some(&a), Some(&b)) = (indices.get(from.as_str()), indices.get(to)) {
                    topology.add_edge(a, b, ());
                }
            }
        }

        let mut reached = BTreeSet::new();
        let roots = std::iter::once(self.entry.as_str()).chain(self.error_handler.as_deref());
        for root in roots {
            if let Some(&start) = indices.get(root) {
                let mut dfs = Dfs::new(&topology, start);
                while let Some(ix) = dfs.next(&topology) {
                    reached.insert(topology[ix]);
                }
            }
        }

        let mut unreachable: Vec<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|n| !reached.contains(n))
            .collect();
        unreachable.sort_unstable();
        unreachable
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .field("error_handler", &self.error_handler)
            .finish()
    }
}

/// Assembles and validates a [`Graph`].
///
/// Builder calls never fail; every problem is reported together by
/// [`GraphBuilder::build`].
pub struct GraphBuilder {
    name: String,
    nodes: Vec<(String, Arc<dyn Node>)>,
    entry: Option<String>,
    edges: Vec<(String, Edge)>,
    error_handler: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            entry: None,
            edges: Vec::new(),
            error_handler: None,
        }
    }

    pub fn add_node(mut self, name: impl Into<String>, node: impl Node + 'static) -> Self {
        self.nodes.push((name.into(), Arc::new(node)));
        self
    }

    pub fn add_shared_node(mut self, name: impl Into<String>, node: Arc<dyn Node>) -> Self {
        self.nodes.push((name.into(), node));
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional edge. `to` may be [`END`].
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), Edge::Static(to.into())));
        self
    }

    /// Conditional edge: after `from` succeeds, `route` picks the next node
    /// from `candidates` (or [`END`]).
    pub fn add_conditional_edges<I, S, F>(
        mut self,
        from: impl Into<String>,
        candidates: I,
        route: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&GraphState) -> String + Send + Sync + 'static,
    {
        let candidates = candidates.into_iter().map(Into::into).collect();
        self.edges.push((
            from.into(),
            Edge::Conditional {
                candidates,
                route: Box::new(route),
            },
        ));
        self
    }

    /// Node that runs after any other node fails.
    pub fn set_error_handler(mut self, name: impl Into<String>) -> Self {
        self.error_handler = Some(name.into());
        self
    }

    pub fn build(self) -> GraphResult<Graph> {
        let mut problems = Vec::new();

        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for (name, node) in self.nodes {
            if name == END {
                problems.push(format!("\"{END}\" is reserved and cannot name a node"));
            } else if nodes.insert(name.clone(), node).is_some() {
                problems.push(format!("duplicate node \"{name}\""));
            }
        }
        let known = |n: &str| nodes.contains_key(n);
        let known_or_end = |n: &str| n == END || nodes.contains_key(n);

        let entry = match self.entry {
            None => {
                problems.push("no entry node set".to_string());
                String::new()
            }
            Some(entry) => {
                if !known(&entry) {
                    problems.push(format!("entry node \"{entry}\" is not defined"));
                }
                entry
            }
        };

        if let Some(handler) = &self.error_handler {
            if !known(handler) {
                problems.push(format!("error handler \"{handler}\" is not defined"));
            }
        }

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in self.edges {
            if !known(&from) {
                problems.push(format!("edge from undefined node \"{from}\""));
            }
            for to in edge.targets() {
                if !known_or_end(to) {
                    problems.push(format!("edge from \"{from}\" to undefined node \"{to}\""));
                }
            }
            if let Edge::Conditional { candidates, .. } = &edge {
                if candidates.is_empty() {
                    problems.push(format!("conditional edge from \"{from}\" has no candidates"));
                }
            }
            if edges.contains_key(&from) {
                problems.push(format!("node \"{from}\" has more than one outgoing edge"));
            } else {
                edges.insert(from, edge);
            }
        }

        if !problems.is_empty() {
            return Err(GraphError::InvalidGraph {
                graph: self.name,
                message: problems.join("; "),
            });
        }

        let graph = Graph {
            name: self.name,
            nodes,
            entry,
            edges,
            error_handler: self.error_handler,
        };
        for node in graph.unreachable_nodes() {
            warn!(graph = %graph.name, node, "node is unreachable from the entry");
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> FnNode {
        FnNode::new(|_, _| Ok(()))
    }

    fn invalid_message(result: GraphResult<Graph>) -> String {
        match result {
            Err(GraphError::InvalidGraph { message, .. }) => message,
            other => panic!("expected InvalidGraph, got {other:?}"),
        }
    }

    #[test]
    fn builds_valid_graph() {
        let graph = Graph::builder("ok")
            .add_node("a", noop())
            .add_node("b", noop())
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .build()
            .unwrap();
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node_names(), vec!["a", "b"]);
        assert!(graph.unreachable_nodes().is_empty());
    }

    #[test]
    fn missing_entry_rejected() {
        let msg = invalid_message(Graph::builder("g").add_node("a", noop()).build());
        assert!(msg.contains("no entry node"));
    }

    #[test]
    fn duplicate_and_dangling_rejected() {
        let msg = invalid_message(
            Graph::builder("g")
                .add_node("a", noop())
                .add_node("a", noop())
                .set_entry("a")
                .add_edge("a", "ghost")
                .add_conditional_edges("ghost", ["a"], |_| "a".to_string())
                .build(),
        );
        assert!(msg.contains("duplicate node \"a\""));
        assert!(msg.contains("undefined node \"ghost\""));
        assert!(msg.contains("edge from undefined node \"ghost\""));
    }

    #[test]
    fn static_and_conditional_on_same_node_rejected() {
        let msg = invalid_message(
            Graph::builder("g")
                .add_node("a", noop())
                .add_node("b", noop())
                .set_entry("a")
                .add_edge("a", "b")
                .add_conditional_edges("a", ["b"], |_| "b".to_string())
                .build(),
        );
        assert!(msg.contains("more than one outgoing edge"));
    }

    #[test]
    fn reserved_end_name_rejected() {
        let msg = invalid_message(Graph::builder("g").add_node(END, noop()).set_entry(END).build());
        assert!(msg.contains("reserved"));
    }

    #[test]
    fn unreachable_nodes_reported() {
        let graph = Graph::builder("g")
            .add_node("a", noop())
            .add_node("orphan", noop())
            .add_node("handler", noop())
            .set_entry("a")
            .set_error_handler("handler")
            .build()
            .unwrap();
        assert_eq!(graph.unreachable_nodes(), vec!["orphan"]);
    }
}
