// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-deploy
//!
//! One enum per layer: persistence (`StoreError`, `CheckpointError`), graph
//! execution (`GraphError`), model calls (`ModelError`), and the top-level
//! `DeployError` used by startup, configuration and the CLI.

use thiserror::Error;

/// Boxed error returned by graph nodes and models
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for kinetic-deploy
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Graph construction or execution errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors raised by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not connect to the backing database
    #[error("connection failed: {0}")]
    Connection(String),

    /// Schema migration failed
    #[error("setup failed: {0}")]
    Setup(String),

    /// Namespace is empty or contains an invalid label
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(Vec<String>),

    /// The store was used after `close()`
    #[error("store is closed")]
    Closed,

    /// Value could not be encoded or decoded
    #[error("serialization: {0}")]
    Serialization(String),

    /// Backend query failed
    #[error("storage: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Errors raised by a checkpoint store backend
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Could not connect to the backing database
    #[error("connection failed: {0}")]
    Connection(String),

    /// Schema migration failed
    #[error("setup failed: {0}")]
    Setup(String),

    /// Execution config carries no thread id
    #[error("thread_id required in execution config")]
    ThreadIdRequired,

    /// The saver was used after `close()`
    #[error("checkpointer is closed")]
    Closed,

    /// Checkpoint could not be encoded or decoded
    #[error("serialization: {0}")]
    Serialization(String),

    /// Backend query failed
    #[error("storage: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for CheckpointError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Graph construction and execution errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// Graph has no nodes
    #[error("graph has no nodes")]
    Empty,

    /// Two nodes registered under the same id
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    /// A node depends on an id that was never added
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    /// Circular dependency detected between nodes
    #[error("circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    /// Input could not be turned into state channels
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Graph kept scheduling nodes past the recursion limit
    #[error("recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(u32),

    /// A node returned an error
    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    /// Checkpoint persistence failed mid-run
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Store access failed mid-run
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GraphError {
    /// Create a node failure from any displayable error
    pub fn node_failed(node: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::NodeFailed {
            node: node.into(),
            message: err.to_string(),
        }
    }
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider answered with a non-success status
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_from_serde_json() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_graph_error_wraps_checkpoint_error() {
        let err: GraphError = CheckpointError::ThreadIdRequired.into();
        assert_eq!(err.to_string(), "thread_id required in execution config");
    }

    #[test]
    fn test_node_failed_message() {
        let err = GraphError::node_failed("chat", "upstream timed out");
        assert_eq!(err.to_string(), "node 'chat' failed: upstream timed out");
    }

    #[test]
    fn test_deploy_error_config_display() {
        let err = DeployError::config("DATABASE_URL must be set");
        assert_eq!(
            err.to_string(),
            "Configuration error: DATABASE_URL must be set"
        );
    }
}
