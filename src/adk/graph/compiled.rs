// SPDX-License-Identifier: MIT

//! Compiled graph - executes nodes against a thread's checkpointed state

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use super::builder::{GraphNode, WaitMode};
use super::config::RunnableConfig;
use super::node::RunContext;
use super::state::{GraphState, StateSchema};
use crate::adk::error::{CheckpointError, GraphError};
use crate::adk::memory::{
    BaseStore, Checkpoint, CheckpointMetadata, CheckpointSource, Checkpointer,
};

/// A validated graph bound to its store and checkpointer.
///
/// Nodes run in waves: every node whose dependencies are satisfied runs,
/// its update is folded into the state and a checkpoint is written, then
/// the next wave is computed. The run ends when no node is ready.
pub struct CompiledGraph {
    /// Display name, reported in logs
    pub name: String,
    schema: Arc<StateSchema>,
    /// Topologically ordered
    nodes: Vec<GraphNode>,
    store: Arc<dyn BaseStore>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl CompiledGraph {
    pub(crate) fn new(
        name: String,
        schema: Arc<StateSchema>,
        nodes: Vec<GraphNode>,
        store: Arc<dyn BaseStore>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            name,
            schema,
            nodes,
            store,
            checkpointer,
        }
    }

    /// Run the graph once for the config's thread and return the final state.
    ///
    /// The thread's latest checkpoint (if any) is restored first, so
    /// repeated invocations on one thread continue the same conversation.
    pub async fn invoke<I>(&self, input: &I, config: &RunnableConfig) -> Result<Value, GraphError>
    where
        I: Serialize + ?Sized,
    {
        let thread_id = config
            .thread_id()
            .ok_or(CheckpointError::ThreadIdRequired)?
            .to_string();
        let input = input_to_update(input)?;

        let mut state = GraphState::new(self.schema.clone());
        let mut parent = self.checkpointer.get_latest(config).await?;
        if let Some(checkpoint) = &parent {
            log::debug!(
                "[{}] resuming thread {} from step {}",
                self.name,
                thread_id,
                checkpoint.step
            );
            state.restore(checkpoint.values.clone());
        }

        state.apply(input.clone());
        parent = Some(
            self.save(&thread_id, parent.as_ref(), &state, CheckpointSource::Input, None)
                .await?,
        );

        let ctx = RunContext {
            config: config.clone(),
            store: self.store.clone(),
            input: Arc::new(input),
        };
        let mut completed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut wave = 0;

        loop {
            let ready = self.ready_nodes(&completed, &skipped, &state);
            skipped.extend(ready.skipped);
            if ready.run.is_empty() {
                break;
            }

            wave += 1;
            if wave > config.recursion_limit {
                log::error!("[{}] exceeded recursion limit", self.name);
                return Err(GraphError::RecursionLimit(config.recursion_limit));
            }

            log::info!(
                "[{}] wave {}: executing {:?}",
                self.name,
                wave,
                ready.run.iter().map(|n| n.id.as_str()).collect::<Vec<_>>()
            );

            for node in ready.run {
                let update = match node.node.run(&state, &ctx).await {
                    Ok(update) => update,
                    Err(e) => {
                        log::error!("[{}] node {} failed: {}", self.name, node.id, e);
                        return Err(GraphError::node_failed(&node.id, e));
                    }
                };

                state.apply(update);
                completed.insert(node.id.clone());
                parent = Some(
                    self.save(
                        &thread_id,
                        parent.as_ref(),
                        &state,
                        CheckpointSource::Loop,
                        Some(node.id.clone()),
                    )
                    .await?,
                );
                log::debug!("[{}] node {} completed", self.name, node.id);
            }
        }

        Ok(state.to_json())
    }

    /// Latest saved values for the config's thread
    pub async fn get_state(&self, config: &RunnableConfig) -> Result<Option<Value>, GraphError> {
        let latest = self.checkpointer.get_latest(config).await?;
        Ok(latest.map(|c| Value::Object(c.values)))
    }

    /// Saved checkpoints for the config's thread, newest first
    pub async fn get_state_history(
        &self,
        config: &RunnableConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, GraphError> {
        Ok(self.checkpointer.list(config, limit).await?)
    }

    /// Partition unscheduled nodes whose dependencies are satisfied into
    /// those that run now and those whose `when` predicate rejected them.
    fn ready_nodes<'a>(
        &'a self,
        completed: &HashSet<String>,
        skipped: &HashSet<String>,
        state: &GraphState,
    ) -> Ready<'a> {
        let mut ready = Ready::default();

        for node in &self.nodes {
            if completed.contains(&node.id) || skipped.contains(&node.id) {
                continue;
            }

            let deps_met = match node.wait_mode {
                WaitMode::All => node.depends_on.iter().all(|d| completed.contains(d)),
                WaitMode::Any => {
                    node.depends_on.is_empty()
                        || node.depends_on.iter().any(|d| completed.contains(d))
                }
            };
            if !deps_met {
                continue;
            }

            match &node.when {
                Some(predicate) if !predicate(state) => {
                    log::debug!("[{}] skipping node {}: condition not met", self.name, node.id);
                    ready.skipped.push(node.id.clone());
                }
                _ => ready.run.push(node),
            }
        }

        ready
    }

    async fn save(
        &self,
        thread_id: &str,
        parent: Option<&Checkpoint>,
        state: &GraphState,
        source: CheckpointSource,
        node: Option<String>,
    ) -> Result<Checkpoint, GraphError> {
        let checkpoint = Checkpoint::next(
            thread_id,
            parent,
            state.values().clone(),
            CheckpointMetadata { source, node },
        );
        self.checkpointer.put(&checkpoint).await?;
        Ok(checkpoint)
    }
}

#[derive(Default)]
struct Ready<'a> {
    run: Vec<&'a GraphNode>,
    skipped: Vec<String>,
}

fn input_to_update<I: Serialize + ?Sized>(input: &I) -> Result<Map<String, Value>, GraphError> {
    match serde_json::to_value(input).map_err(|e| GraphError::InvalidInput(e.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(GraphError::InvalidInput(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::adk::graph::state::Reducer;
    use crate::adk::graph::{node_fn, StateGraph, StateUpdate};
    use crate::adk::memory::{InMemorySaver, InMemoryStore};
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new()
            .channel("messages", Reducer::Messages)
            .channel("trace", Reducer::Append)
    }

    fn compile(graph: &StateGraph) -> (CompiledGraph, Arc<InMemorySaver>) {
        let saver = Arc::new(InMemorySaver::new());
        let compiled = graph
            .compile(Arc::new(InMemoryStore::new()), saver.clone())
            .unwrap();
        (compiled, saver)
    }

    fn tracer(label: &'static str) -> impl crate::adk::graph::Node + 'static {
        node_fn(move |_state, _ctx| async move {
            let mut update = StateUpdate::new();
            update.insert("trace".into(), json!(label));
            Ok::<_, BoxError>(update)
        })
    }

    #[tokio::test]
    async fn test_invoke_runs_nodes_in_dependency_order() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("second", tracer("second")).after("first");
        graph.add_node("first", tracer("first"));
        graph.add_node("third", tracer("third")).after("second");
        let (compiled, _) = compile(&graph);

        let result = compiled
            .invoke(&json!({}), &RunnableConfig::with_thread_id("t1"))
            .await
            .unwrap();

        assert_eq!(result["trace"], json!(["first", "second", "third"]));
    }

    #[tokio::test]
    async fn test_invoke_applies_input_through_reducers() {
        let mut graph = StateGraph::new(schema());
        graph.add_node(
            "reply",
            node_fn(|state, _ctx| async move {
                let count = state
                    .get("messages")
                    .and_then(|m| m.as_array())
                    .map(|m| m.len())
                    .unwrap_or(0);
                let mut update = StateUpdate::new();
                update.insert(
                    "messages".into(),
                    json!([{"role": "assistant", "content": format!("seen {}", count)}]),
                );
                Ok::<_, BoxError>(update)
            }),
        );
        let (compiled, _) = compile(&graph);

        let input = json!({"messages": [{"role": "user", "content": "hi"}]});
        let result = compiled
            .invoke(&input, &RunnableConfig::with_thread_id("t1"))
            .await
            .unwrap();

        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "seen 1");
        assert!(messages[0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_invoke_resumes_thread_from_checkpoint() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("noop", tracer("run"));
        let (compiled, _) = compile(&graph);
        let config = RunnableConfig::with_thread_id("t1");

        compiled
            .invoke(&json!({"messages": [{"role": "user", "content": "one"}]}), &config)
            .await
            .unwrap();
        let result = compiled
            .invoke(&json!({"messages": [{"role": "user", "content": "two"}]}), &config)
            .await
            .unwrap();

        assert_eq!(result["messages"].as_array().unwrap().len(), 2);
        assert_eq!(result["trace"], json!(["run", "run"]));

        let fresh = compiled
            .invoke(&json!({}), &RunnableConfig::with_thread_id("t2"))
            .await
            .unwrap();
        assert_eq!(fresh["trace"], json!(["run"]));
    }

    #[tokio::test]
    async fn test_invoke_writes_checkpoint_per_step() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", tracer("a"));
        graph.add_node("b", tracer("b")).after("a");
        let (compiled, _) = compile(&graph);
        let config = RunnableConfig::with_thread_id("t1");

        compiled.invoke(&json!({}), &config).await.unwrap();

        let history = compiled.get_state_history(&config, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].metadata.node.as_deref(), Some("b"));
        assert_eq!(history[2].metadata.source, CheckpointSource::Input);

        let state = compiled.get_state(&config).await.unwrap().unwrap();
        assert_eq!(state["trace"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_when_predicate_skips_node_and_its_dependents() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("start", tracer("start"));
        graph
            .add_node("gated", tracer("gated"))
            .after("start")
            .when(|state| state.get("enabled") == Some(&json!(true)));
        graph.add_node("after_gate", tracer("after_gate")).after("gated");
        let (compiled, _) = compile(&graph);

        let off = compiled
            .invoke(&json!({"enabled": false}), &RunnableConfig::with_thread_id("off"))
            .await
            .unwrap();
        assert_eq!(off["trace"], json!(["start"]));

        let on = compiled
            .invoke(&json!({"enabled": true}), &RunnableConfig::with_thread_id("on"))
            .await
            .unwrap();
        assert_eq!(on["trace"], json!(["start", "gated", "after_gate"]));
    }

    #[tokio::test]
    async fn test_wait_any_runs_after_first_dependency() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("fast", tracer("fast"));
        graph
            .add_node("never", tracer("never"))
            .when(|_| false);
        graph
            .add_node("join", tracer("join"))
            .depends_on(&["fast", "never"])
            .wait_for(WaitMode::Any);
        let (compiled, _) = compile(&graph);

        let result = compiled
            .invoke(&json!({}), &RunnableConfig::with_thread_id("t1"))
            .await
            .unwrap();
        assert_eq!(result["trace"], json!(["fast", "join"]));
    }

    #[tokio::test]
    async fn test_node_failure_surfaces_as_graph_error() {
        let mut graph = StateGraph::new(schema());
        graph.add_node(
            "broken",
            node_fn(|_state, _ctx| async move {
                Err::<StateUpdate, BoxError>("model unavailable".into())
            }),
        );
        let (compiled, _) = compile(&graph);

        let err = compiled
            .invoke(&json!({}), &RunnableConfig::with_thread_id("t1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "node 'broken' failed: model unavailable");
    }

    #[tokio::test]
    async fn test_invoke_requires_thread_id() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", tracer("a"));
        let (compiled, saver) = compile(&graph);

        let err = compiled
            .invoke(&json!({}), &RunnableConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::Checkpoint(CheckpointError::ThreadIdRequired)
        ));
        assert!(saver
            .list(&RunnableConfig::with_thread_id("a"), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invoke_rejects_non_object_input() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", tracer("a"));
        let (compiled, _) = compile(&graph);

        let err = compiled
            .invoke(&json!([1, 2]), &RunnableConfig::with_thread_id("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_recursion_limit_bounds_waves() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", tracer("a"));
        graph.add_node("b", tracer("b")).after("a");
        graph.add_node("c", tracer("c")).after("b");
        let (compiled, _) = compile(&graph);

        let config = RunnableConfig::with_thread_id("t1").with_recursion_limit(2);
        let err = compiled.invoke(&json!({}), &config).await.unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit(2)));
    }

    #[tokio::test]
    async fn test_nodes_see_store_and_raw_input() {
        let mut graph = StateGraph::new(schema());
        graph.add_node(
            "write",
            node_fn(|_state, ctx| async move {
                let ns = vec!["notes".to_string(), ctx.thread_id().to_string()];
                let incoming = ctx.input.get("trace").cloned().unwrap_or_default();
                ctx.store.put(&ns, "k", incoming).await?;
                Ok::<_, BoxError>(StateUpdate::new())
            }),
        );
        let store = Arc::new(InMemoryStore::new());
        let compiled = graph
            .compile(store.clone(), Arc::new(InMemorySaver::new()))
            .unwrap();
        let config = RunnableConfig::with_thread_id("t9");
        let ns = vec!["notes".to_string(), "t9".to_string()];

        compiled.invoke(&json!({"trace": ["a"]}), &config).await.unwrap();
        compiled.invoke(&json!({"trace": ["b"]}), &config).await.unwrap();

        // state accumulates, the input only carries this invocation's update
        let state = compiled.get_state(&config).await.unwrap().unwrap();
        assert_eq!(state["trace"], json!(["a", "b"]));
        let item = store.get(&ns, "k").await.unwrap().unwrap();
        assert_eq!(item.value, json!(["b"]));
    }
}
