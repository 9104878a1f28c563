// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Schema describing the channels a graph state carries
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Channel definitions keyed by channel name
    #[serde(flatten)]
    pub channels: BTreeMap<String, Channel>,
}

/// Definition of a single state channel
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Channel {
    /// How updates are folded into the current value
    #[serde(default)]
    pub reducer: Reducer,
    /// Value the channel starts with before any input
    #[serde(default)]
    pub default: Option<Value>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema from YAML, one mapping entry per channel
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Add a channel without a default value
    pub fn channel(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.channels.insert(
            name.into(),
            Channel {
                reducer,
                default: None,
            },
        );
        self
    }

    /// Add a channel seeded with `default`
    pub fn channel_with_default(
        mut self,
        name: impl Into<String>,
        reducer: Reducer,
        default: Value,
    ) -> Self {
        self.channels.insert(
            name.into(),
            Channel {
                reducer,
                default: Some(default),
            },
        );
        self
    }

    /// Reducer for a channel; undeclared channels overwrite
    pub fn reducer_for(&self, name: &str) -> Reducer {
        self.channels
            .get(name)
            .map(|c| c.reducer)
            .unwrap_or_default()
    }
}

/// Strategies for folding an update into a channel
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Replace the value
    #[default]
    Overwrite,
    /// Append items to an array
    Append,
    /// Append chat messages, replacing any with a matching `id`
    Messages,
    /// Keep the larger number
    Max,
    /// Keep the smaller number
    Min,
    /// Shallow-merge objects
    Merge,
}

impl Reducer {
    /// Fold `update` into `current`. `None` leaves the channel untouched.
    pub fn reduce(self, current: Option<&Value>, update: Value) -> Option<Value> {
        match self {
            Reducer::Overwrite => Some(update),
            Reducer::Append => {
                let mut items = current
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                match update {
                    Value::Array(new_items) => items.extend(new_items),
                    other => items.push(other),
                }
                Some(Value::Array(items))
            }
            Reducer::Messages => Some(Value::Array(add_messages(current, update))),
            Reducer::Max => pick_number(current, update, |new, old| new > old),
            Reducer::Min => pick_number(current, update, |new, old| new < old),
            Reducer::Merge => match (current, update) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    let mut merged = existing.clone();
                    merged.extend(incoming);
                    Some(Value::Object(merged))
                }
                (_, update) => Some(update),
            },
        }
    }
}

fn pick_number<F>(current: Option<&Value>, update: Value, wins: F) -> Option<Value>
where
    F: Fn(f64, f64) -> bool,
{
    let new = update.as_f64()?;
    match current.and_then(Value::as_f64) {
        Some(old) if !wins(new, old) => None,
        _ => Some(update),
    }
}

/// Message-list merge: every message gets an `id`; an incoming message whose
/// `id` already exists replaces the old one in place.
fn add_messages(current: Option<&Value>, update: Value) -> Vec<Value> {
    let mut messages = current
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let incoming = match update {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    for mut message in incoming {
        if let Value::Object(fields) = &mut message {
            ensure_message_id(fields);
        }
        let id = message.get("id").cloned();
        let existing = id
            .as_ref()
            .and_then(|id| messages.iter().position(|m| m.get("id") == Some(id)));
        match existing {
            Some(pos) => messages[pos] = message,
            None => messages.push(message),
        }
    }

    messages
}

fn ensure_message_id(fields: &mut Map<String, Value>) {
    let missing = match fields.get("id") {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if missing {
        fields.insert(
            "id".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}
