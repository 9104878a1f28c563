// SPDX-License-Identifier: MIT

//! Per-invocation execution config

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default number of scheduling waves before an invocation is aborted
pub const DEFAULT_RECURSION_LIMIT: u32 = 25;

/// Config passed by value into every graph invocation.
///
/// `thread_id` scopes the checkpoints an invocation reads and writes;
/// `configurable` carries arbitrary extra keys for nodes to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnableConfig {
    pub thread_id: Option<String>,
    #[serde(default)]
    pub configurable: Map<String, Value>,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,
}

fn default_recursion_limit() -> u32 {
    DEFAULT_RECURSION_LIMIT
}

impl RunnableConfig {
    pub fn new() -> Self {
        Self {
            thread_id: None,
            configurable: Map::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_thread_id(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::new()
        }
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Thread id, treating blank strings as unset
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl Default for RunnableConfig {
    fn default() -> Self {
        Self::new()
    }
}
