// SPDX-License-Identifier: MIT

//! Key-value store trait shared by graph nodes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adk::error::StoreError;

/// Hierarchical namespace, e.g. `["memories", "user-42"]`
pub type Namespace = Vec<String>;

/// A stored value with its location and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable key-value store for auxiliary graph state.
///
/// Opened once per process, `setup()` before first use, `close()` on
/// shutdown. Implementations must be safe to share across concurrent
/// invocations.
#[async_trait]
pub trait BaseStore: Send + Sync {
    /// Create tables / apply migrations. Idempotent.
    async fn setup(&self) -> Result<(), StoreError>;

    /// Release the underlying connections. Idempotent.
    async fn close(&self);

    /// Insert or replace the value at `namespace`/`key`
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>, StoreError>;

    async fn delete(&self, namespace: &[String], key: &str) -> Result<(), StoreError>;

    /// Items under `namespace_prefix` (inclusive of nested namespaces),
    /// most recently updated first
    async fn search(
        &self,
        namespace_prefix: &[String],
        limit: usize,
    ) -> Result<Vec<Item>, StoreError>;
}

/// Labels are joined with `.` on disk, so they must be non-empty and dot-free
pub fn validate_namespace(namespace: &[String]) -> Result<(), StoreError> {
    let valid =
        !namespace.is_empty() && namespace.iter().all(|l| !l.is_empty() && !l.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidNamespace(namespace.to_vec()))
    }
}

pub(crate) fn namespace_to_prefix(namespace: &[String]) -> String {
    namespace.join(".")
}

pub(crate) fn prefix_to_namespace(prefix: &str) -> Namespace {
    prefix.split('.').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(labels: &[&str]) -> Namespace {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace(&ns(&["memories", "u1"])).is_ok());
        assert!(validate_namespace(&ns(&[])).is_err());
        assert!(validate_namespace(&ns(&["memories", ""])).is_err());
        assert!(validate_namespace(&ns(&["a.b"])).is_err());
    }

    #[test]
    fn test_prefix_round_trip() {
        let namespace = ns(&["memories", "u1"]);
        let prefix = namespace_to_prefix(&namespace);
        assert_eq!(prefix, "memories.u1");
        assert_eq!(prefix_to_namespace(&prefix), namespace);
    }
}
