// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Graph definition and compilation.
//!
//! [`StateGraph`] is the mutable builder: register nodes, wire edges, set
//! the entry point, then [`compile`](StateGraph::compile) into an immutable
//! [`CompiledGraph`] that any number of concurrent steps can share.
//! Construction contract violations (duplicate node, unknown node
//! reference, conflicting edge definitions) fail at build time and never
//! at run time.

use crate::edge::{ConditionalEdge, Edge, END, START};
use crate::error::{Error, Result};
use crate::executor::CompiledGraph;
use crate::node::{BoxedNode, FnNode, Node, NodeResult};
use crate::state::State;
use futures::future::BoxFuture;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Mutable graph builder.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use threadflow::{StateGraph, State, END};
///
/// # fn build() -> threadflow::Result<()> {
/// let mut graph = StateGraph::new();
/// graph.add_node_from_fn("classify", |state: State| {
///     Box::pin(async move {
///         let intent = if state.get_str("user_input").unwrap_or("").starts_with('/') {
///             "command"
///         } else {
///             "chitchat"
///         };
///         Ok(State::new().with("intent", intent))
///     })
/// })?;
/// graph.add_node_from_fn("chat", |_state: State| {
///     Box::pin(async move { Ok(State::new().with("llm_output", "Nice chatting with you!")) })
/// })?;
///
/// graph.set_entry_point("classify")?;
/// let mut routes = HashMap::new();
/// routes.insert("command".to_string(), "chat".to_string());
/// routes.insert("chitchat".to_string(), "chat".to_string());
/// graph.add_conditional_edges(
///     "classify",
///     |state: &State| state.get_str("intent").unwrap_or("chitchat").to_string(),
///     routes,
/// )?;
/// graph.add_edge("chat", END)?;
///
/// let _app = graph.compile()?;
/// # Ok(())
/// # }
/// # build().unwrap();
/// ```
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<String, BoxedNode>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge>,
    entry_point: Option<String>,
}

impl StateGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under a unique name.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateNode`] if the name is taken;
    /// [`Error::Validation`] if the name is a reserved sentinel.
    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node + 'static) -> Result<()> {
        let name = name.into();
        if name == START || name == END {
            return Err(Error::Validation(format!(
                "'{name}' is a reserved sentinel and cannot be a node name"
            )));
        }
        if self.nodes.contains_key(&name) {
            return Err(Error::DuplicateNode(name));
        }
        self.nodes.insert(name, Arc::new(node));
        Ok(())
    }

    /// Register a plain function as a node.
    pub fn add_node_from_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync + 'static,
    {
        self.add_node(name, FnNode::new(f))
    }

    /// Designate the node the graph starts from.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownNode`] if the node is unregistered;
    /// [`Error::ConflictingEdge`] if an entry point is already set (the
    /// start pseudo-node has exactly one outgoing edge).
    pub fn set_entry_point(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(Error::UnknownNode(name.to_string()));
        }
        if self.entry_point.is_some() {
            return Err(Error::ConflictingEdge(format!(
                "'{START}' already has an outgoing edge"
            )));
        }
        self.entry_point = Some(name.to_string());
        Ok(())
    }

    /// Register an unconditional edge.
    ///
    /// `add_edge(START, n)` sets the entry point; `END` is legal as a
    /// target only.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownNode`] for an unregistered endpoint;
    /// [`Error::ConflictingEdge`] if `from` already has an outgoing edge
    /// definition or is `END`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if from == START {
            return self.set_entry_point(to);
        }
        if from == END {
            return Err(Error::ConflictingEdge(format!(
                "'{END}' cannot have outgoing edges"
            )));
        }
        if !self.nodes.contains_key(from) {
            return Err(Error::UnknownNode(from.to_string()));
        }
        if to != END && !self.nodes.contains_key(to) {
            return Err(Error::UnknownNode(to.to_string()));
        }
        if self.has_outgoing(from) {
            return Err(Error::ConflictingEdge(format!(
                "node '{from}' already has an outgoing edge definition"
            )));
        }
        self.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Register a conditional edge: a routing function plus a table mapping
    /// every key the router can return to a target node, or to [`END`] as
    /// the halt sentinel.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownNode`] if `from` or any non-`END` route target is
    /// unregistered; [`Error::ConflictingEdge`] if `from` already has an
    /// outgoing edge definition or is a sentinel.
    pub fn add_conditional_edges<F>(
        &mut self,
        from: &str,
        router: F,
        routes: HashMap<String, String>,
    ) -> Result<()>
    where
        F: Fn(&State) -> String + Send + Sync + 'static,
    {
        if from == START || from == END {
            return Err(Error::ConflictingEdge(format!(
                "'{from}' cannot be the source of a conditional edge"
            )));
        }
        if !self.nodes.contains_key(from) {
            return Err(Error::UnknownNode(from.to_string()));
        }
        for target in routes.values() {
            if target != END && !self.nodes.contains_key(target) {
                return Err(Error::UnknownNode(target.clone()));
            }
        }
        if self.has_outgoing(from) {
            return Err(Error::ConflictingEdge(format!(
                "node '{from}' already has an outgoing edge definition"
            )));
        }
        self.conditional_edges.push(ConditionalEdge::new(
            from.to_string(),
            Arc::new(router),
            routes,
        ));
        Ok(())
    }

    fn has_outgoing(&self, name: &str) -> bool {
        self.edges.iter().any(|e| e.from == name)
            || self.conditional_edges.iter().any(|e| e.from == name)
    }

    /// Validate and freeze the graph.
    ///
    /// Node and edge lookups are resolved once into fixed read-only tables
    /// so the execution loop never scans by name. Nodes unreachable from
    /// the entry point are legal but dead, and logged at warn level.
    ///
    /// # Errors
    ///
    /// [`Error::NoEntryPoint`] if no start edge was defined.
    pub fn compile(self) -> Result<CompiledGraph> {
        let entry_point = self.entry_point.clone().ok_or(Error::NoEntryPoint)?;

        self.warn_unreachable(&entry_point);

        let edges: HashMap<String, String> =
            self.edges.into_iter().map(|e| (e.from, e.to)).collect();
        let conditional_edges: HashMap<String, Arc<ConditionalEdge>> = self
            .conditional_edges
            .into_iter()
            .map(|e| (e.from.clone(), Arc::new(e)))
            .collect();

        Ok(CompiledGraph::new(
            self.nodes,
            edges,
            conditional_edges,
            entry_point,
        ))
    }

    /// Reachability pass over the registered nodes, entry point as root.
    fn warn_unreachable(&self, entry_point: &str) {
        let mut dag = DiGraph::<&str, ()>::new();
        let indices: HashMap<&str, NodeIndex> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), dag.add_node(name.as_str())))
            .collect();

        for edge in &self.edges {
            if edge.to != END {
                dag.add_edge(indices[edge.from.as_str()], indices[edge.to.as_str()], ());
            }
        }
        for edge in &self.conditional_edges {
            for target in edge.routes.values() {
                if target != END {
                    dag.add_edge(indices[edge.from.as_str()], indices[target.as_str()], ());
                }
            }
        }

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&dag, indices[entry_point]);
        while let Some(ix) = bfs.next(&dag) {
            reachable.insert(dag[ix]);
        }

        for name in self.nodes.keys() {
            if !reachable.contains(name.as_str()) {
                warn!(node = %name, "node is unreachable from the entry point");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(mut graph: StateGraph, name: &str) -> StateGraph {
        graph
            .add_node_from_fn(name, |_state: State| {
                Box::pin(async move { Ok(State::new()) })
            })
            .unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = noop(StateGraph::new(), "a");
        let err = graph
            .add_node_from_fn("a", |_state: State| {
                Box::pin(async move { Ok(State::new()) })
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(name) if name == "a"));
    }

    #[test]
    fn test_sentinel_node_name_rejected() {
        let mut graph = StateGraph::new();
        let err = graph
            .add_node_from_fn(END, |_state: State| {
                Box::pin(async move { Ok(State::new()) })
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut graph = noop(StateGraph::new(), "a");
        let err = graph.add_edge("a", "missing").unwrap_err();
        assert!(matches!(err, Error::UnknownNode(name) if name == "missing"));

        let err = graph.add_edge("missing", "a").unwrap_err();
        assert!(matches!(err, Error::UnknownNode(name) if name == "missing"));
    }

    #[test]
    fn test_second_outgoing_edge_conflicts() {
        let mut graph = noop(noop(StateGraph::new(), "a"), "b");
        graph.add_edge("a", "b").unwrap();

        assert!(matches!(
            graph.add_edge("a", END),
            Err(Error::ConflictingEdge(_))
        ));
        assert!(matches!(
            graph.add_conditional_edges("a", |_s: &State| "x".to_string(), HashMap::new()),
            Err(Error::ConflictingEdge(_))
        ));
    }

    #[test]
    fn test_conditional_then_unconditional_conflicts() {
        let mut graph = noop(noop(StateGraph::new(), "a"), "b");
        let mut routes = HashMap::new();
        routes.insert("go".to_string(), "b".to_string());
        graph
            .add_conditional_edges("a", |_s: &State| "go".to_string(), routes)
            .unwrap();

        assert!(matches!(
            graph.add_edge("a", "b"),
            Err(Error::ConflictingEdge(_))
        ));
    }

    #[test]
    fn test_conditional_route_to_unknown_target_rejected() {
        let mut graph = noop(StateGraph::new(), "a");
        let mut routes = HashMap::new();
        routes.insert("go".to_string(), "missing".to_string());

        let err = graph
            .add_conditional_edges("a", |_s: &State| "go".to_string(), routes)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownNode(name) if name == "missing"));
    }

    #[test]
    fn test_end_route_target_is_legal() {
        let mut graph = noop(StateGraph::new(), "a");
        let mut routes = HashMap::new();
        routes.insert("wait".to_string(), END.to_string());
        graph
            .add_conditional_edges("a", |_s: &State| "wait".to_string(), routes)
            .unwrap();
    }

    #[test]
    fn test_edge_from_end_rejected() {
        let mut graph = noop(StateGraph::new(), "a");
        assert!(matches!(
            graph.add_edge(END, "a"),
            Err(Error::ConflictingEdge(_))
        ));
    }

    #[test]
    fn test_start_edge_sets_entry_point_once() {
        let mut graph = noop(noop(StateGraph::new(), "a"), "b");
        graph.add_edge(START, "a").unwrap();
        assert!(matches!(
            graph.add_edge(START, "b"),
            Err(Error::ConflictingEdge(_))
        ));
    }

    #[test]
    fn test_compile_without_entry_point_fails() {
        let graph = noop(StateGraph::new(), "a");
        assert!(matches!(graph.compile(), Err(Error::NoEntryPoint)));
    }

    #[test]
    fn test_compile_with_unreachable_node_succeeds() {
        // Unreachable nodes are legal but dead; compilation only warns.
        let mut graph = noop(noop(StateGraph::new(), "a"), "orphan");
        graph.set_entry_point("a").unwrap();
        graph.add_edge("a", END).unwrap();

        let app = graph.compile().unwrap();
        assert_eq!(app.node_count(), 2);
        assert_eq!(app.entry_point(), "a");
    }
}
