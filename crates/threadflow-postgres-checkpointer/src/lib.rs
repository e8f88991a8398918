// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `PostgreSQL` checkpointer for `ThreadFlow`.
//!
//! Stores one row per checkpoint in a `PostgreSQL` table, state as JSONB.
//! The engine only reads the latest checkpoint per thread; older rows are
//! retained as history up to an optional per-thread limit.
//!
//! # Example
//!
//! ```rust,ignore
//! use threadflow::{State, StateGraph};
//! use threadflow_postgres_checkpointer::PostgresCheckpointer;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection_string = "host=localhost user=postgres password=postgres dbname=threadflow";
//!     let checkpointer = PostgresCheckpointer::new(connection_string).await?;
//!
//!     let mut graph = StateGraph::new();
//!     // ... build graph ...
//!     let app = graph.compile()?.with_checkpointer(checkpointer);
//!
//!     let state = app.step("thread-1", State::new().with("user_input", "hello")).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use threadflow::{
    checkpointer_helpers::{nanos_to_timestamp, timestamp_to_nanos},
    Checkpoint, CheckpointError, Checkpointer, Result as ThreadFlowResult, State, ThreadInfo,
};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

/// Validate a `PostgreSQL` identifier (table name).
///
/// Unquoted identifiers must start with a letter or underscore, contain
/// only letters, digits, and underscores, and be at most 63 characters.
fn validate_identifier(name: &str) -> Result<(), PostgresError> {
    if name.is_empty() {
        return Err(PostgresError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.len() > 63 {
        return Err(PostgresError::InvalidIdentifier(format!(
            "identifier '{name}' exceeds maximum length of 63 characters"
        )));
    }

    let mut chars = name.chars();
    #[allow(clippy::unwrap_used)] // SAFETY: we checked non-empty above
    let first = chars.next().unwrap();

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(PostgresError::InvalidIdentifier(format!(
            "identifier '{name}' must start with a letter or underscore"
        )));
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(PostgresError::InvalidIdentifier(format!(
                "identifier '{name}' contains invalid character '{c}'"
            )));
        }
    }

    Ok(())
}

/// `PostgreSQL`-backed checkpointer.
///
/// Table schema:
/// - `checkpoint_id` (TEXT PRIMARY KEY)
/// - `thread_id` (TEXT, indexed)
/// - `state` (JSONB)
/// - `pending_node` (TEXT, nullable)
/// - `updated_at` (BIGINT, Unix timestamp in nanoseconds)
///
/// Each save is a single INSERT, so a concurrent reader of the same thread
/// observes either the previous latest row or the new one.
pub struct PostgresCheckpointer {
    client: Client,
    table_name: String,
    history_limit: Option<i64>,
}

impl PostgresCheckpointer {
    /// Connect and initialize the default `threadflow_checkpoints` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or table creation fails.
    pub async fn new(connection_string: &str) -> Result<Self, PostgresError> {
        Self::with_table_name(connection_string, "threadflow_checkpoints").await
    }

    /// Connect and initialize a custom table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if `table_name` is not a valid unquoted
    /// SQL identifier, or a connection/query error.
    pub async fn with_table_name(
        connection_string: &str,
        table_name: &str,
    ) -> Result<Self, PostgresError> {
        // Validate table name to prevent SQL injection
        validate_identifier(table_name)?;

        info!("Connecting to PostgreSQL");
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                PostgresError::ConnectionError(e.to_string())
            })?;

        // Spawn connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        let checkpointer = Self {
            client,
            table_name: table_name.to_string(),
            history_limit: None,
        };

        checkpointer.initialize_schema().await?;

        Ok(checkpointer)
    }

    /// Retain at most `limit` checkpoints per thread, pruning the oldest
    /// after each save. Unlimited history by default.
    #[must_use]
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = Some(i64::from(limit.max(1)));
        self
    }

    async fn initialize_schema(&self) -> Result<(), PostgresError> {
        let create_table_sql = format!(
            r"
            CREATE TABLE IF NOT EXISTS {t} (
                checkpoint_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                state JSONB NOT NULL,
                pending_node TEXT,
                updated_at BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_thread_id ON {t} (thread_id);
            CREATE INDEX IF NOT EXISTS idx_{t}_updated_at ON {t} (updated_at);
            ",
            t = self.table_name
        );

        self.client
            .batch_execute(&create_table_sql)
            .await
            .map_err(|e| {
                error!("Failed to create table: {}", e);
                PostgresError::QueryError(e.to_string())
            })?;

        debug!("PostgreSQL schema initialized: table={}", self.table_name);
        Ok(())
    }

    /// Drop oldest rows beyond the configured history limit for a thread.
    async fn prune_history(&self, thread_id: &str) -> ThreadFlowResult<()> {
        let Some(limit) = self.history_limit else {
            return Ok(());
        };

        let prune_sql = format!(
            "DELETE FROM {t}
             WHERE thread_id = $1
               AND checkpoint_id NOT IN (
                   SELECT checkpoint_id FROM {t}
                   WHERE thread_id = $1
                   ORDER BY updated_at DESC, checkpoint_id DESC
                   LIMIT $2
               )",
            t = self.table_name
        );

        let pruned = self
            .client
            .execute(&prune_sql, &[&thread_id, &limit])
            .await
            .map_err(query_error)?;

        if pruned > 0 {
            debug!(thread_id, pruned, "pruned checkpoint history");
        }
        Ok(())
    }

    /// List all checkpoints for a thread, newest first. History access
    /// beyond what the [`Checkpointer`] trait needs.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint-store error if the query fails or a stored row
    /// cannot be decoded.
    pub async fn list(&self, thread_id: &str) -> ThreadFlowResult<Vec<Checkpoint>> {
        let select_sql = format!(
            "SELECT checkpoint_id, thread_id, state, pending_node, updated_at
             FROM {}
             WHERE thread_id = $1
             ORDER BY updated_at DESC, checkpoint_id DESC",
            self.table_name
        );

        let rows = self
            .client
            .query(&select_sql, &[&thread_id])
            .await
            .map_err(query_error)?;

        rows.iter().map(checkpoint_from_row).collect()
    }
}

fn checkpoint_from_row(row: &tokio_postgres::Row) -> ThreadFlowResult<Checkpoint> {
    let id: String = row.get(0);
    let thread_id: String = row.get(1);
    let state_json: serde_json::Value = row.get(2);
    let pending_node: Option<String> = row.get(3);
    let updated_at: i64 = row.get(4);

    let state: State = serde_json::from_value(state_json).map_err(|e| {
        error!("Failed to decode checkpoint state: {}", e);
        CheckpointError::DeserializationFailed {
            reason: e.to_string(),
        }
    })?;

    Ok(Checkpoint {
        id,
        thread_id,
        state,
        pending_node,
        updated_at: nanos_to_timestamp(updated_at),
    })
}

/// Map a query failure onto the checkpoint error taxonomy: a dropped
/// connection is retryable, everything else is not.
fn query_error(e: tokio_postgres::Error) -> CheckpointError {
    error!("PostgreSQL query failed: {}", e);
    if e.is_closed() {
        CheckpointError::ConnectionLost {
            backend: "postgres".to_string(),
            reason: e.to_string(),
        }
    } else {
        CheckpointError::Other(format!("Query error: {e}"))
    }
}

#[async_trait]
impl Checkpointer for PostgresCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> ThreadFlowResult<()> {
        let state_json = serde_json::to_value(&checkpoint.state).map_err(|e| {
            error!("Failed to encode checkpoint state: {}", e);
            CheckpointError::SerializationFailed {
                reason: e.to_string(),
            }
        })?;

        let updated_at = timestamp_to_nanos(checkpoint.updated_at);

        let insert_sql = format!(
            "INSERT INTO {} (checkpoint_id, thread_id, state, pending_node, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (checkpoint_id) DO UPDATE SET
                 thread_id = EXCLUDED.thread_id,
                 state = EXCLUDED.state,
                 pending_node = EXCLUDED.pending_node,
                 updated_at = EXCLUDED.updated_at",
            self.table_name
        );

        self.client
            .execute(
                &insert_sql,
                &[
                    &checkpoint.id,
                    &checkpoint.thread_id,
                    &state_json,
                    &checkpoint.pending_node,
                    &updated_at,
                ],
            )
            .await
            .map_err(query_error)?;

        debug!("Saved checkpoint: id={}", checkpoint.id);
        self.prune_history(&checkpoint.thread_id).await
    }

    async fn get_latest(&self, thread_id: &str) -> ThreadFlowResult<Option<Checkpoint>> {
        let select_sql = format!(
            "SELECT checkpoint_id, thread_id, state, pending_node, updated_at
             FROM {}
             WHERE thread_id = $1
             ORDER BY updated_at DESC, checkpoint_id DESC
             LIMIT 1",
            self.table_name
        );

        let rows = self
            .client
            .query(&select_sql, &[&thread_id])
            .await
            .map_err(query_error)?;

        match rows.first() {
            Some(row) => Ok(Some(checkpoint_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn delete_thread(&self, thread_id: &str) -> ThreadFlowResult<()> {
        let delete_sql = format!("DELETE FROM {} WHERE thread_id = $1", self.table_name);

        let rows_deleted = self
            .client
            .execute(&delete_sql, &[&thread_id])
            .await
            .map_err(query_error)?;

        debug!(
            "Deleted thread checkpoints: thread_id={}, count={}",
            thread_id, rows_deleted
        );
        Ok(())
    }

    async fn list_threads(&self) -> ThreadFlowResult<Vec<ThreadInfo>> {
        // Latest checkpoint per thread
        let select_sql = format!(
            r"
            SELECT DISTINCT ON (thread_id)
                   thread_id, pending_node, updated_at
            FROM {}
            ORDER BY thread_id, updated_at DESC, checkpoint_id DESC
            ",
            self.table_name
        );

        let rows = self
            .client
            .query(&select_sql, &[])
            .await
            .map_err(query_error)?;

        let mut thread_infos: Vec<ThreadInfo> = rows
            .iter()
            .map(|row| {
                let thread_id: String = row.get("thread_id");
                let pending_node: Option<String> = row.get("pending_node");
                let updated_at: i64 = row.get("updated_at");
                ThreadInfo {
                    thread_id,
                    pending_node,
                    updated_at: nanos_to_timestamp(updated_at),
                }
            })
            .collect();

        thread_infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(thread_infos)
    }
}

/// Error types for the `PostgreSQL` checkpointer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PostgresError {
    /// Could not establish a connection.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A statement failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Table name is not a valid unquoted SQL identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Convert `PostgresError` to `threadflow::Error` for use with `?`.
impl From<PostgresError> for threadflow::Error {
    fn from(err: PostgresError) -> Self {
        let checkpoint_err = match err {
            PostgresError::ConnectionError(msg) => CheckpointError::ConnectionLost {
                backend: "postgres".to_string(),
                reason: msg,
            },
            PostgresError::QueryError(msg) => CheckpointError::Other(format!("Query error: {msg}")),
            PostgresError::InvalidIdentifier(msg) => {
                CheckpointError::Other(format!("Invalid identifier: {msg}"))
            }
        };
        threadflow::Error::Checkpoint(checkpoint_err)
    }
}
