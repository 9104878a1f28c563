// SPDX-License-Identifier: MIT

//! Checkpoint types and the saver trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adk::error::CheckpointError;
use crate::adk::graph::RunnableConfig;

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Input folded into the state at the start of an invocation
    #[default]
    Input,
    /// A node's update inside the execution loop
    Loop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    /// Node whose update this checkpoint records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// Snapshot of a thread's channel values after one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub parent_id: Option<String>,
    /// Monotonic per thread; the highest step is the latest checkpoint
    pub step: i64,
    pub values: Map<String, Value>,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// First checkpoint of a thread or the successor of `parent`
    pub fn next(
        thread_id: impl Into<String>,
        parent: Option<&Checkpoint>,
        values: Map<String, Value>,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            parent_id: parent.map(|p| p.id.clone()),
            step: parent.map(|p| p.step + 1).unwrap_or(0),
            values,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Persists and loads checkpoints keyed by thread id.
///
/// Opened once per process, `setup()` before first use, `close()` on
/// shutdown.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Create tables / apply migrations. Idempotent.
    async fn setup(&self) -> Result<(), CheckpointError>;

    /// Release the underlying connections. Idempotent.
    async fn close(&self);

    /// Save a checkpoint under its `thread_id`
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Latest checkpoint for the config's thread
    async fn get_latest(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Checkpoints for the config's thread, newest first
    async fn list(
        &self,
        config: &RunnableConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, CheckpointError>;
}

pub(crate) fn require_thread_id(config: &RunnableConfig) -> Result<&str, CheckpointError> {
    config.thread_id().ok_or(CheckpointError::ThreadIdRequired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_links_parent_and_bumps_step() {
        let first = Checkpoint::next("t", None, Map::new(), CheckpointMetadata::default());
        assert_eq!(first.step, 0);
        assert!(first.parent_id.is_none());

        let mut values = Map::new();
        values.insert("k".into(), json!(1));
        let second = Checkpoint::next(
            "t",
            Some(&first),
            values,
            CheckpointMetadata {
                source: CheckpointSource::Loop,
                node: Some("chat".into()),
            },
        );
        assert_eq!(second.step, 1);
        assert_eq!(second.parent_id.as_deref(), Some(first.id.as_str()));
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_metadata_serializes_lowercase_source() {
        let meta = CheckpointMetadata {
            source: CheckpointSource::Loop,
            node: None,
        };
        assert_eq!(serde_json::to_value(&meta).unwrap(), json!({"source": "loop"}));
    }

    #[test]
    fn test_require_thread_id() {
        assert!(matches!(
            require_thread_id(&RunnableConfig::new()),
            Err(CheckpointError::ThreadIdRequired)
        ));
        assert_eq!(
            require_thread_id(&RunnableConfig::with_thread_id("t-9")).unwrap(),
            "t-9"
        );
    }
}
