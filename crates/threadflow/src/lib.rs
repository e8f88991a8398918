// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! ThreadFlow: a resumable, checkpointed execution engine for
//! conditionally-branching workflows over a shared state.
//!
//! Build a graph of named async nodes with [`StateGraph`], wire
//! unconditional and conditional edges between them, and
//! [`compile`](StateGraph::compile) into a [`CompiledGraph`]. Each call to
//! [`CompiledGraph::step`] advances one conversation thread: it merges the
//! caller's input into the thread's accumulated [`State`], walks nodes
//! until the graph ends or pauses at a boundary awaiting more input, and
//! commits exactly one [`Checkpoint`] to the configured [`Checkpointer`].
//! Threads are independent; interleaved steps on different threads never
//! share state.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use threadflow::{MemoryCheckpointer, State, StateGraph, END};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> threadflow::Result<()> {
//!     let mut graph = StateGraph::new();
//!     graph.add_node_from_fn("classify", |state: State| {
//!         Box::pin(async move {
//!             let input = state.get_str("user_input").unwrap_or("");
//!             let intent = if input.starts_with('/') { "command" } else { "chitchat" };
//!             Ok(State::new().with("intent", intent))
//!         })
//!     })?;
//!     graph.add_node_from_fn("chat", |_state: State| {
//!         Box::pin(async move { Ok(State::new().with("llm_output", "How can I help?")) })
//!     })?;
//!
//!     graph.set_entry_point("classify")?;
//!     let mut routes = HashMap::new();
//!     routes.insert("command".to_string(), "chat".to_string());
//!     routes.insert("chitchat".to_string(), "chat".to_string());
//!     graph.add_conditional_edges(
//!         "classify",
//!         |state: &State| state.get_str("intent").unwrap_or("chitchat").to_string(),
//!         routes,
//!     )?;
//!     graph.add_edge("chat", END)?;
//!
//!     let app = graph.compile()?.with_checkpointer(MemoryCheckpointer::new());
//!
//!     let state = app.step("thread-1", State::new().with("user_input", "hello")).await?;
//!     assert_eq!(state.get_str("llm_output"), Some("How can I help?"));
//!     Ok(())
//! }
//! ```

mod checkpoint;
mod edge;
mod error;
mod executor;
mod graph;
mod node;
mod state;

pub use checkpoint::{
    checkpointer_helpers, Checkpoint, Checkpointer, MemoryCheckpointer, ThreadInfo,
};
pub use edge::{END, START};
pub use error::{CheckpointError, Error, Result};
pub use executor::{
    CompiledGraph, StateSnapshot, DEFAULT_NODE_TIMEOUT, DEFAULT_RECURSION_LIMIT,
    DEFAULT_STEP_TIMEOUT,
};
pub use graph::StateGraph;
pub use node::{FnNode, Node, NodeError, NodeResult};
pub use state::State;
