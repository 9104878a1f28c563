// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::adk::graph::StateGraph;
use crate::adk::memory::{BaseStore, Checkpointer};
use crate::kinetic::lifecycle::ConnectionPair;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppContext {
    pub store: Option<Arc<dyn BaseStore>>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    /// Definition compiled per request against the handles above
    pub graph: Arc<StateGraph>,
    /// Expected `X-API-Key`; `None` rejects every protected request
    pub api_key: Option<String>,
}

impl AppContext {
    pub fn new(connections: &ConnectionPair, graph: StateGraph, api_key: Option<String>) -> Self {
        Self {
            store: Some(connections.store.clone()),
            checkpointer: Some(connections.checkpointer.clone()),
            graph: Arc::new(graph),
            api_key,
        }
    }

    /// Context with no persistence handles; `/generate` answers 500
    pub fn without_connections(graph: StateGraph, api_key: Option<String>) -> Self {
        Self {
            store: None,
            checkpointer: None,
            graph: Arc::new(graph),
            api_key,
        }
    }

    /// Both handles, or `None` if either is missing
    pub fn connections(&self) -> Option<(Arc<dyn BaseStore>, Arc<dyn Checkpointer>)> {
        match (&self.store, &self.checkpointer) {
            (Some(store), Some(checkpointer)) => Some((store.clone(), checkpointer.clone())),
            _ => None,
        }
    }
}
