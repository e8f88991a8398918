// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Step execution over a compiled graph.
//!
//! [`CompiledGraph::step`] is the engine's single run-time entry point: it
//! loads the thread's latest checkpoint (or starts fresh), merges the
//! caller's input, walks nodes and edges until a halt boundary, and commits
//! exactly one checkpoint on success. A step that fails commits nothing,
//! so retrying re-enters from the last good checkpoint.
//!
//! Steps on the same thread are serialized through a per-thread lock;
//! steps on different threads run concurrently against the same compiled
//! graph.

use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::edge::{ConditionalEdge, END};
use crate::error::{Error, Result};
use crate::node::BoxedNode;
use crate::state::State;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Default wall-clock budget for a single node execution.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wall-clock budget for a whole step, load to commit.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on node executions within a single step.
pub const DEFAULT_RECURSION_LIMIT: u32 = 25;

/// Read-only view of a thread's persisted position, from
/// [`CompiledGraph::get_state`].
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    /// Accumulated state as of the latest checkpoint.
    pub state: State,
    /// Node the thread is paused at, or `None` at true graph end.
    pub pending_node: Option<String>,
    /// When the latest checkpoint was committed.
    pub updated_at: SystemTime,
}

/// Immutable, executable graph produced by
/// [`StateGraph::compile`](crate::StateGraph::compile).
pub struct CompiledGraph {
    nodes: HashMap<String, BoxedNode>,
    edges: HashMap<String, String>,
    conditional_edges: HashMap<String, Arc<ConditionalEdge>>,
    entry_point: String,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    node_timeout: Duration,
    step_timeout: Duration,
    recursion_limit: u32,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: HashMap<String, BoxedNode>,
        edges: HashMap<String, String>,
        conditional_edges: HashMap<String, Arc<ConditionalEdge>>,
        entry_point: String,
    ) -> Self {
        Self {
            nodes,
            edges,
            conditional_edges,
            entry_point,
            checkpointer: None,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a checkpoint store. Required before calling [`step`](Self::step).
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: impl Checkpointer + 'static) -> Self {
        self.checkpointer = Some(Arc::new(checkpointer));
        self
    }

    /// Override the per-node execution timeout (default 60s).
    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Override the whole-step timeout (default 5 minutes).
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Override the per-step node execution cap (default 25).
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Name of the entry node.
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Execute one step of the thread: load its checkpoint, merge `input`,
    /// walk the graph until a halt boundary, commit one checkpoint, and
    /// return the resulting state.
    ///
    /// A thread with no checkpoint starts fresh from the entry point. A
    /// thread paused at a node resumes at that node's outgoing boundary:
    /// the node's logic is not re-executed, only its edge is re-evaluated
    /// against the merged state.
    ///
    /// # Errors
    ///
    /// [`Error::NoCheckpointer`] if no store is attached;
    /// [`Error::NodeExecution`], [`Error::Timeout`],
    /// [`Error::RecursionLimit`], [`Error::UnroutableIntent`] for run-time
    /// failures (no checkpoint is committed); [`Error::Checkpoint`] if the
    /// store fails.
    pub async fn step(&self, thread_id: &str, input: State) -> Result<State> {
        let checkpointer = self
            .checkpointer
            .as_deref()
            .ok_or(Error::NoCheckpointer { operation: "step" })?;

        let lock = self.thread_lock(thread_id).await;
        let guard = lock.lock().await;

        let span = info_span!(
            "graph.step",
            request_id = %Uuid::new_v4(),
            thread_id = %thread_id,
        );
        let result = match tokio::time::timeout(
            self.step_timeout,
            self.step_locked(checkpointer, thread_id, input)
                .instrument(span),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.step_timeout)),
        };

        drop(guard);
        self.release_thread_lock(thread_id, &lock).await;
        result
    }

    /// Fetch the persisted position of a thread.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadNotFound`] if the thread has no checkpoint;
    /// [`Error::NoCheckpointer`] if no store is attached.
    pub async fn get_state(&self, thread_id: &str) -> Result<StateSnapshot> {
        let checkpointer = self.checkpointer.as_deref().ok_or(Error::NoCheckpointer {
            operation: "get_state",
        })?;

        let checkpoint = checkpointer
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| Error::ThreadNotFound(thread_id.to_string()))?;

        Ok(StateSnapshot {
            state: checkpoint.state,
            pending_node: checkpoint.pending_node,
            updated_at: checkpoint.updated_at,
        })
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        Arc::clone(
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop a thread's registry entry once no other step holds or awaits
    /// its lock, so the registry stays bounded by live threads rather than
    /// every thread id ever stepped.
    async fn release_thread_lock(&self, thread_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.thread_locks.lock().await;
        // Two handles means the registry entry and ours; a concurrent step
        // on the same thread would hold a third.
        if Arc::strong_count(lock) == 2 {
            locks.remove(thread_id);
        }
    }

    async fn step_locked(
        &self,
        checkpointer: &dyn Checkpointer,
        thread_id: &str,
        input: State,
    ) -> Result<State> {
        let latest = checkpointer.get_latest(thread_id).await?;
        let (mut state, pending) = match latest {
            Some(cp) => (cp.state, cp.pending_node),
            None => (State::new(), None),
        };
        state.merge(&input);

        // A pending node is a resume boundary: skip its logic, re-evaluate
        // only its outgoing edge against the merged state.
        let (mut current, mut at_resume_boundary) = match pending {
            Some(node) => (node, true),
            None => (self.entry_point.clone(), false),
        };

        let mut executed: u32 = 0;
        let pending_out = loop {
            if at_resume_boundary {
                at_resume_boundary = false;
            } else {
                if executed >= self.recursion_limit {
                    return Err(Error::RecursionLimit {
                        limit: self.recursion_limit,
                    });
                }
                executed += 1;

                let patch = self.run_node(&current, state.clone()).await?;
                state.merge(&patch);
            }

            if let Some(edge) = self.conditional_edges.get(&current) {
                let route = edge.evaluate(&state);
                match edge.routes.get(&route) {
                    // A conditional route to END is a deliberate pause at
                    // this node's boundary.
                    Some(target) if target == END => break Some(current),
                    Some(target) => current = target.clone(),
                    None => {
                        return Err(Error::UnroutableIntent {
                            node: current,
                            route,
                        })
                    }
                }
            } else if let Some(target) = self.edges.get(&current) {
                if target == END {
                    break None;
                }
                current = target.clone();
            } else {
                // No outgoing edge: implicit pause at this node.
                break Some(current);
            }
        };

        let checkpoint = Checkpoint::new(thread_id, state.clone(), pending_out.clone());
        debug!(
            checkpoint_id = %checkpoint.id,
            pending_node = ?pending_out,
            nodes_executed = executed,
            "committing checkpoint"
        );
        checkpointer.save(checkpoint).await?;

        Ok(state)
    }

    async fn run_node(&self, name: &str, state: State) -> Result<State> {
        // Unreachable for a graph built through StateGraph, which validates
        // every edge target at registration.
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))?;

        let span = info_span!("graph.node", node = %name);
        match tokio::time::timeout(self.node_timeout, node.run(state).instrument(span)).await {
            Ok(Ok(patch)) => Ok(patch),
            Ok(Err(source)) => Err(Error::NodeExecution {
                node: name.to_string(),
                source,
            }),
            Err(_) => Err(Error::Timeout(self.node_timeout)),
        }
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry_point", &self.entry_point)
            .field("node_count", &self.nodes.len())
            .field("node_timeout", &self.node_timeout)
            .field("step_timeout", &self.step_timeout)
            .field("recursion_limit", &self.recursion_limit)
            .finish_non_exhaustive()
    }
}
