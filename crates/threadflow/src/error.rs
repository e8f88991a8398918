// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for ThreadFlow.
//!
//! Build-time graph construction errors (`DuplicateNode`, `UnknownNode`,
//! `ConflictingEdge`, `NoEntryPoint`) never occur at run time. Run-time
//! errors (`UnroutableIntent`, `NodeExecution`, `Timeout`,
//! `RecursionLimit`) are fatal for that step and leave the last committed
//! checkpoint untouched. Store failures carry their own
//! [`CheckpointError`] taxonomy so callers can distinguish retryable
//! unavailability from corruption.

use std::time::Duration;
use thiserror::Error;

/// Checkpoint-store error types for explicit failure handling.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Connection to the storage backend was lost.
    #[error("Connection to {backend} backend lost: {reason}")]
    ConnectionLost {
        /// Backend identifier (e.g. "postgres", "memory").
        backend: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// Backend temporarily cannot serve requests (e.g. pool exhausted).
    /// The last good checkpoint is intact; the caller may retry.
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        /// Backend identifier.
        backend: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// Checkpoint could not be serialized for storage.
    #[error("Checkpoint serialization failed: {reason}")]
    SerializationFailed {
        /// Underlying serializer message.
        reason: String,
    },

    /// Stored checkpoint could not be decoded.
    #[error("Checkpoint deserialization failed: {reason}")]
    DeserializationFailed {
        /// Underlying deserializer message.
        reason: String,
    },

    /// Any other backend error.
    #[error("{0}")]
    Other(String),
}

impl CheckpointError {
    /// True if the operation may succeed on retry without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckpointError::ConnectionLost { .. } | CheckpointError::Unavailable { .. }
        )
    }

    /// True if the stored data itself is suspect.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, CheckpointError::DeserializationFailed { .. })
    }
}

/// ThreadFlow error types.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Graph validation error.
    #[error("Graph validation error: {0}")]
    Validation(String),

    /// Duplicate node name at graph build time.
    #[error("Node '{0}' already exists in graph")]
    DuplicateNode(String),

    /// An edge or route references a node that was never registered.
    #[error("Node '{0}' not found in graph")]
    UnknownNode(String),

    /// A node was given a second outgoing edge definition, or a sentinel
    /// was used on the wrong side of an edge.
    #[error("Conflicting edge definition: {0}")]
    ConflictingEdge(String),

    /// Graph has no entry point. Use set_entry_point() or add_edge(START, ..)
    /// before compiling.
    #[error("Graph has no entry point defined")]
    NoEntryPoint,

    /// A router returned a key absent from its route table. This is a
    /// routing-configuration bug, not a transient fault; no checkpoint is
    /// written.
    #[error("Conditional edge from '{node}' returned '{route}' but no route exists for it")]
    UnroutableIntent {
        /// Node whose conditional edge was evaluated.
        node: String,
        /// The unmapped key the router returned.
        route: String,
    },

    /// Node logic failed. No checkpoint is written; a retry re-enters from
    /// the last committed checkpoint.
    #[error("Node execution error in '{node}': {source}")]
    NodeExecution {
        /// Name of the node that failed.
        node: String,
        /// The underlying error that occurred.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Node or step execution exceeded its timeout.
    #[error("Execution timeout after {0:?}")]
    Timeout(Duration),

    /// Step exceeded the maximum number of node executions. This usually
    /// indicates an unintended cycle; use with_recursion_limit() to raise
    /// the limit for legitimately cyclic graphs.
    #[error("Recursion limit of {limit} reached during a single step")]
    RecursionLimit {
        /// The limit that was exceeded.
        limit: u32,
    },

    /// State query for a thread with no checkpoint. `step()` treats a
    /// missing thread as a fresh start; `get_state()` reports it.
    #[error("No checkpoint found for thread_id: {0}")]
    ThreadNotFound(String),

    /// Operation requires a checkpointer.
    #[error("Cannot {operation} without a checkpointer configured. Use with_checkpointer() on the compiled graph.")]
    NoCheckpointer {
        /// The operation that was attempted (e.g. "step", "get_state").
        operation: &'static str,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Checkpoint store error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Result type for ThreadFlow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unroutable_intent_display() {
        let err = Error::UnroutableIntent {
            node: "classify".to_string(),
            route: "frobnicate".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("classify"));
        assert!(msg.contains("frobnicate"));
    }

    #[test]
    fn test_node_execution_preserves_source() {
        let err = Error::NodeExecution {
            node: "confirm".to_string(),
            source: "llm call failed".into(),
        };
        assert!(err.to_string().contains("confirm"));
        assert!(err.to_string().contains("llm call failed"));
    }

    #[test]
    fn test_checkpoint_error_retryability() {
        let lost = CheckpointError::ConnectionLost {
            backend: "postgres".to_string(),
            reason: "ECONNRESET".to_string(),
        };
        let busy = CheckpointError::Unavailable {
            backend: "postgres".to_string(),
            reason: "pool exhausted".to_string(),
        };
        let corrupt = CheckpointError::DeserializationFailed {
            reason: "truncated".to_string(),
        };

        assert!(lost.is_retryable());
        assert!(busy.is_retryable());
        assert!(!corrupt.is_retryable());
        assert!(corrupt.is_corruption());
    }

    #[test]
    fn test_checkpoint_error_converts_into_error() {
        let err: Error = CheckpointError::Other("backend gone".to_string()).into();
        assert!(matches!(err, Error::Checkpoint(_)));
        assert!(err.to_string().contains("backend gone"));
    }
}
