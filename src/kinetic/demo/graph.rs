// SPDX-License-Identifier: MIT

//! recall -> chat -> remember

use serde_json::{json, Value};
use std::sync::Arc;

use super::state::{schema, Message};
use crate::adk::error::BoxError;
use crate::adk::graph::{node_fn, GraphState, RunContext, StateGraph, StateUpdate};
use crate::adk::model::{Content, Model};

/// Display name given to every compiled instance
pub const DEMO_GRAPH_NAME: &str = "DeployDemo";

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use what you remember about the user when it is relevant.";
const MEMORY_LIMIT: usize = 10;
const REMEMBER_PREFIX: &str = "remember ";

/// Build the demo graph definition around `model`
pub fn builder(model: Arc<dyn Model>) -> StateGraph {
    let mut graph = StateGraph::new(schema()).with_name(DEMO_GRAPH_NAME);

    graph.add_node("recall", node_fn(recall));
    graph
        .add_node(
            "chat",
            node_fn(move |state, ctx| chat(model.clone(), state, ctx)),
        )
        .after("recall");
    graph
        .add_node("remember", node_fn(remember))
        .after("chat")
        .when(|state| note(state).is_some());

    graph
}

async fn recall(state: GraphState, ctx: RunContext) -> Result<StateUpdate, BoxError> {
    let namespace = memory_namespace(&state, &ctx);
    let items = ctx.store.search(&namespace, MEMORY_LIMIT).await?;
    let memories: Vec<Value> = items
        .into_iter()
        .filter_map(|item| item.value.get("text").cloned())
        .collect();

    log::debug!("Recalled {} memories for {:?}", memories.len(), namespace);

    // only this request's messages may trigger a write
    let incoming: Vec<Message> = match ctx.input.get("messages") {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };

    let mut update = StateUpdate::new();
    update.insert("memories".into(), Value::Array(memories));
    update.insert(
        "note".into(),
        pending_note(&incoming).map_or(Value::Null, Value::String),
    );
    Ok(update)
}

async fn chat(
    model: Arc<dyn Model>,
    state: GraphState,
    _ctx: RunContext,
) -> Result<StateUpdate, BoxError> {
    let mut history = vec![Content::system(SYSTEM_PROMPT)];

    let memories: Vec<&str> = state
        .get("memories")
        .and_then(Value::as_array)
        .map(|m| m.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !memories.is_empty() {
        history.push(Content::system(format!(
            "What you know about the user:\n- {}",
            memories.join("\n- ")
        )));
    }

    history.extend(
        messages(&state)?
            .into_iter()
            .map(|m| Content::new(m.role, m.content)),
    );

    log::info!("Calling {} with {} messages", model.name(), history.len());
    let reply = model.generate_content(&history, None).await?;

    let mut update = StateUpdate::new();
    update.insert(
        "messages".into(),
        json!([{"role": "assistant", "content": reply.text}]),
    );
    Ok(update)
}

async fn remember(state: GraphState, ctx: RunContext) -> Result<StateUpdate, BoxError> {
    let Some(text) = note(&state).map(str::to_string) else {
        return Ok(StateUpdate::new());
    };

    let namespace = memory_namespace(&state, &ctx);
    let key = uuid::Uuid::new_v4().to_string();
    ctx.store
        .put(&namespace, &key, json!({ "text": text }))
        .await?;
    log::info!("Stored memory {} in {:?}", key, namespace);

    Ok(StateUpdate::new())
}

fn messages(state: &GraphState) -> Result<Vec<Message>, BoxError> {
    match state.get("messages") {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(Vec::new()),
    }
}

fn note(state: &GraphState) -> Option<&str> {
    state.get("note").and_then(Value::as_str)
}

/// Text after `remember ` in the latest user message, if any
fn pending_note(messages: &[Message]) -> Option<String> {
    let last_user = messages.iter().rev().find(|m| m.role == "user")?;
    let content = last_user.content.trim_start();

    let prefix = content.get(..REMEMBER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(REMEMBER_PREFIX) {
        return None;
    }
    let note = content[REMEMBER_PREFIX.len()..].trim();
    (!note.is_empty()).then(|| note.to_string())
}

fn memory_namespace(state: &GraphState, ctx: &RunContext) -> Vec<String> {
    let owner = state
        .get("user_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ctx.thread_id());
    // namespace labels may not contain dots
    vec!["memories".to_string(), owner.replace('.', "_")]
}
