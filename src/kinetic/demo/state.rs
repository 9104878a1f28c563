// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::adk::graph::{Reducer, StateSchema};

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// `user`, `assistant` or `system`
    pub role: String,
    pub content: String,
    /// Assigned by the graph when absent; resending an id replaces that message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            id: None,
        }
    }
}

/// Input accepted by `/generate`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatState {
    pub messages: Vec<Message>,
    /// Scopes long-term memories; defaults to the thread id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Channels of the demo graph
pub fn schema() -> StateSchema {
    StateSchema::new()
        .channel("messages", Reducer::Messages)
        .channel("memories", Reducer::Overwrite)
        .channel("user_id", Reducer::Overwrite)
        .channel("note", Reducer::Overwrite)
}
