// SPDX-License-Identifier: MIT

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};

use super::context::AppContext;
use super::error::ApiError;
use crate::adk::graph::RunnableConfig;
use crate::kinetic::demo::{ChatState, DEMO_GRAPH_NAME};

pub const THREAD_ID_HEADER: &str = "x-thread-id";

pub const STORES_MISSING: &str =
    "Database or checkpoint store not found. Please check your DATABASE_URL.";

/// Successful `/generate` body
#[derive(Debug, Serialize, JsonSchema)]
pub struct GenerateResponse {
    pub success: bool,
    /// Final graph state
    pub result: Value,
    /// Thread the invocation was checkpointed under
    pub thread_id: String,
}

pub async fn root() -> Redirect {
    Redirect::temporary("/docs")
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Compile the graph against the shared connections and run it once
pub async fn generate(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    payload: Result<Json<ChatState>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let (store, checkpointer) = ctx.connections().ok_or_else(|| {
        log::error!("/generate called without store/checkpointer");
        ApiError::internal(STORES_MISSING)
    })?;
    let Json(state) = payload?;

    let mut graph = ctx.graph.compile(store, checkpointer)?;
    graph.name = DEMO_GRAPH_NAME.to_string();

    let thread_id = thread_id(&headers);
    let config = RunnableConfig::with_thread_id(thread_id.clone());

    log::info!("Invoking {} on thread {}", graph.name, thread_id);
    match graph.invoke(&state, &config).await {
        Ok(result) => Ok(Json(GenerateResponse {
            success: true,
            result,
            thread_id,
        })),
        Err(e) => {
            log::error!("Graph invocation failed on thread {}: {}", thread_id, e);
            Err(e.into())
        }
    }
}

/// `X-Thread-Id` when present and non-blank, otherwise a fresh UUID
fn thread_id(headers: &HeaderMap) -> String {
    headers
        .get(THREAD_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
