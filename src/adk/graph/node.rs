// SPDX-License-Identifier: MIT

//! Graph nodes - the units of work a compiled graph schedules

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::config::RunnableConfig;
use super::state::{GraphState, StateUpdate};
use crate::adk::error::BoxError;
use crate::adk::memory::BaseStore;

/// Everything a node may touch besides the state itself
#[derive(Clone)]
pub struct RunContext {
    pub config: RunnableConfig,
    pub store: Arc<dyn BaseStore>,
    /// The update this invocation was started with, before it was merged
    /// into the restored thread state
    pub input: Arc<StateUpdate>,
}

impl RunContext {
    /// Thread id of the running invocation (always set while a graph runs)
    pub fn thread_id(&self) -> &str {
        self.config.thread_id().unwrap_or_default()
    }
}

/// Core node trait.
///
/// A node reads the current state and returns a partial update; the graph
/// folds the update into the state through each channel's reducer.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<StateUpdate, BoxError>;
}

/// Node backed by an async closure
pub struct FnNode<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`Node`].
///
/// ```rust,no_run
/// use kinetic_deploy::adk::error::BoxError;
/// use kinetic_deploy::adk::graph::{node_fn, StateUpdate};
///
/// let echo = node_fn(|state, _ctx| async move {
///     let mut update = StateUpdate::new();
///     update.insert("echo".into(), state.to_json());
///     Ok::<_, BoxError>(update)
/// });
/// ```
pub fn node_fn<F, Fut>(f: F) -> FnNode<F, Fut>
where
    F: Fn(GraphState, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send + 'static,
{
    FnNode {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F, Fut>
where
    F: Fn(GraphState, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send + 'static,
{
    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<StateUpdate, BoxError> {
        (self.f)(state.clone(), ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::memory::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_node_sees_state_and_context() {
        let node = node_fn(|state, ctx| async move {
            let mut update = StateUpdate::new();
            update.insert("thread".into(), json!(ctx.thread_id()));
            update.insert("seen".into(), state.get("input").cloned().unwrap_or_default());
            Ok::<_, BoxError>(update)
        });

        let mut state = GraphState::empty();
        state.update("input", json!("hello"));
        let ctx = RunContext {
            config: RunnableConfig::with_thread_id("t-1"),
            store: Arc::new(InMemoryStore::new()),
            input: Arc::new(StateUpdate::new()),
        };

        let update = node.run(&state, &ctx).await.unwrap();
        assert_eq!(update["thread"], "t-1");
        assert_eq!(update["seen"], "hello");
    }

    #[tokio::test]
    async fn test_fn_node_propagates_errors() {
        let node = node_fn(|_state, _ctx| async move { Err::<StateUpdate, BoxError>("boom".into()) });
        let ctx = RunContext {
            config: RunnableConfig::with_thread_id("t-1"),
            store: Arc::new(InMemoryStore::new()),
            input: Arc::new(StateUpdate::new()),
        };
        let err = node.run(&GraphState::empty(), &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
