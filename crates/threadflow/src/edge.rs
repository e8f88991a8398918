// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Edges and the `START`/`END` sentinels.

use crate::node::RouterFn;
use crate::state::State;
use std::collections::HashMap;
use std::fmt;

/// Pseudo-node marking the graph entry. `add_edge(START, n)` is equivalent
/// to `set_entry_point(n)`; `START` is legal as an edge source only.
pub const START: &str = "__start__";

/// Sentinel marking a halt point. Legal as an edge target only.
///
/// An *unconditional* edge to `END` is true graph end: the thread's next
/// step runs from the graph start again. A *conditional* route mapped to
/// `END` is a deliberate pause at the source node's boundary, awaiting more
/// input.
pub const END: &str = "__end__";

/// Unconditional transition, always taken.
#[derive(Clone, Debug)]
pub(crate) struct Edge {
    pub from: String,
    pub to: String,
}

/// Conditional transition: a routing function plus a route table mapping
/// each key the router can return to a target node (or to [`END`]).
pub(crate) struct ConditionalEdge {
    pub from: String,
    router: RouterFn,
    pub routes: HashMap<String, String>,
}

impl ConditionalEdge {
    pub fn new(from: String, router: RouterFn, routes: HashMap<String, String>) -> Self {
        Self {
            from,
            router,
            routes,
        }
    }

    /// Evaluate the routing function against the current state.
    pub fn evaluate(&self, state: &State) -> String {
        (self.router)(state)
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
