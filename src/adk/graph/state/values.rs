// SPDX-License-Identifier: MIT

//! Runtime channel values for a single graph invocation

use serde_json::{Map, Value};
use std::sync::Arc;

use super::schema::StateSchema;

/// Partial state returned by a node, keyed by channel name
pub type StateUpdate = Map<String, Value>;

/// Channel values plus the schema that decides how updates merge
#[derive(Debug, Clone)]
pub struct GraphState {
    values: Map<String, Value>,
    schema: Arc<StateSchema>,
}

impl GraphState {
    /// Create a state seeded with the schema's channel defaults
    pub fn new(schema: Arc<StateSchema>) -> Self {
        let values = schema
            .channels
            .iter()
            .filter_map(|(name, channel)| {
                channel
                    .default
                    .as_ref()
                    .map(|default| (name.clone(), default.clone()))
            })
            .collect();

        Self { values, schema }
    }

    /// Create a state with no channels declared
    pub fn empty() -> Self {
        Self::new(Arc::new(StateSchema::default()))
    }

    /// Replace channel values wholesale, bypassing reducers.
    /// Used when resuming from a checkpoint.
    pub fn restore(&mut self, values: Map<String, Value>) {
        for (key, value) in values {
            self.values.insert(key, value);
        }
    }

    /// Fold a single value into a channel through its reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self.schema.reducer_for(key);
        if let Some(next) = reducer.reduce(self.values.get(key), value) {
            self.values.insert(key.to_string(), next);
        }
    }

    /// Fold every entry of a node update into the state
    pub fn apply(&mut self, update: StateUpdate) {
        for (key, value) in update {
            self.update(&key, value);
        }
    }

    /// Get a channel value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a nested value using dot notation (e.g., "profile.name")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    /// Borrow the raw channel map
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Snapshot the state as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

impl Default for GraphState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::graph::state::Reducer;
    use serde_json::json;

    fn schema() -> Arc<StateSchema> {
        Arc::new(
            StateSchema::new()
                .channel("notes", Reducer::Append)
                .channel_with_default("score", Reducer::Max, json!(0))
                .channel("meta", Reducer::Merge),
        )
    }

    #[test]
    fn test_defaults_are_seeded() {
        let state = GraphState::new(schema());
        assert_eq!(state.get("score"), Some(&json!(0)));
        assert!(state.get("notes").is_none());
    }

    #[test]
    fn test_apply_uses_channel_reducers() {
        let mut state = GraphState::new(schema());

        let mut update = StateUpdate::new();
        update.insert("notes".into(), json!("one"));
        update.insert("score".into(), json!(4));
        update.insert("meta".into(), json!({"a": 1}));
        state.apply(update);

        let mut update = StateUpdate::new();
        update.insert("notes".into(), json!("two"));
        update.insert("score".into(), json!(2));
        update.insert("meta".into(), json!({"b": 2}));
        state.apply(update);

        assert_eq!(state.get("notes"), Some(&json!(["one", "two"])));
        assert_eq!(state.get("score"), Some(&json!(4)));
        assert_eq!(state.get("meta"), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_restore_bypasses_reducers() {
        let mut state = GraphState::new(schema());
        state.update("notes", json!("fresh"));

        let mut saved = Map::new();
        saved.insert("notes".into(), json!(["from checkpoint"]));
        state.restore(saved);

        assert_eq!(state.get("notes"), Some(&json!(["from checkpoint"])));
    }

    #[test]
    fn test_get_path_walks_objects_and_arrays() {
        let mut state = GraphState::empty();
        state.update(
            "messages",
            json!([{"role": "user", "content": "hi"}, {"role": "assistant"}]),
        );
        state.update("profile", json!({"name": {"first": "Ada"}}));

        assert_eq!(state.get_path("profile.name.first"), Some(&json!("Ada")));
        assert_eq!(state.get_path("messages.1.role"), Some(&json!("assistant")));
        assert_eq!(state.get_path("messages.9.role"), None);
        assert_eq!(state.get_path("profile.missing"), None);
    }

    #[test]
    fn test_to_json_round_trips_values() {
        let mut state = GraphState::empty();
        state.update("a", json!(1));
        state.update("b", json!("hello"));

        let json = state.to_json();
        assert_eq!(json["a"], 1);
        assert_eq!(json["b"], "hello");
    }
}
