// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Node and router logic supplied by the application.
//!
//! A node reads the current [`State`] and returns a *partial* update; the
//! executor merges the returned patch into the run's state. A router reads
//! the state and returns a route key that a conditional edge maps to the
//! next node (or to [`END`](crate::END)). Both are expected to be
//! deterministic functions of the state so that a paused thread resumes
//! reproducibly.

use crate::state::State;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Error type node logic may fail with. Surfaced to the caller as
/// [`Error::NodeExecution`](crate::Error::NodeExecution) without a
/// checkpoint write.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running node logic: a partial state update on success.
pub type NodeResult = std::result::Result<State, NodeError>;

/// A named unit of work in the graph.
///
/// Side effects outside the state are the implementor's responsibility and
/// are not tracked by the engine; a node performing external I/O fails like
/// any other node and is subject to the executor's per-node timeout.
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node against the current state, returning a patch.
    async fn run(&self, state: State) -> NodeResult;
}

pub(crate) type BoxedNode = Arc<dyn Node>;

/// Routing function evaluated against the current state at a conditional
/// edge. The returned key is looked up in the edge's route table.
pub(crate) type RouterFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Adapter turning a plain function into a [`Node`].
///
/// ```rust
/// use threadflow::{FnNode, State};
///
/// let node = FnNode::new(|state: State| {
///     Box::pin(async move {
///         let greeting = format!("hello {}", state.get_str("name").unwrap_or("there"));
///         Ok(State::new().with("llm_output", greeting))
///     })
/// });
/// ```
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync,
{
    /// Wrap a function as a node.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync,
{
    async fn run(&self, state: State) -> NodeResult {
        (self.f)(state).await
    }
}
