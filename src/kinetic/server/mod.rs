// SPDX-License-Identifier: MIT

//! HTTP server - routes, middleware and the serve loop
//!
//! | Route | Auth |
//! |---|---|
//! | `GET /` (redirects to `/docs`) | none |
//! | `POST /generate` | `X-API-Key` |
//! | `GET /docs`, `GET /openapi.json`, `GET /health` | none |

mod auth;
mod context;
mod docs;
mod error;
mod handlers;

pub use auth::{require_api_key, API_KEY_HEADER, INVALID_API_KEY};
pub use context::AppContext;
pub use docs::openapi_document;
pub use error::{ApiError, ErrorDetail};
pub use handlers::{GenerateResponse, STORES_MISSING, THREAD_ID_HEADER};

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::DeployError;
use crate::adk::graph::StateGraph;
use crate::kinetic::config::ServerConfig;
use crate::kinetic::lifecycle::ConnectionPair;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router around `ctx`
pub fn router(ctx: AppContext) -> Router {
    let protected = Router::new()
        .route("/generate", post(handlers::generate))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/docs", get(docs::docs))
        .route("/openapi.json", get(docs::openapi))
        .merge(protected)
        .layer(middleware::from_fn(request_log_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Open the connections, serve `graph` on `addr` until a shutdown signal,
/// then release the connections. Release happens whether serving ended
/// cleanly or with an error.
pub async fn run(
    config: &ServerConfig,
    addr: SocketAddr,
    graph: StateGraph,
) -> Result<(), DeployError> {
    let connections = ConnectionPair::open(&config.database_url).await?;
    let ctx = AppContext::new(&connections, graph, config.api_key.clone());

    let result = match TcpListener::bind(addr).await {
        Ok(listener) => {
            serve_until(listener, router(ctx), shutdown_signal(), config.shutdown_grace).await
        }
        Err(e) => {
            log::error!("Failed to bind {}: {}", addr, e);
            Err(e.into())
        }
    };

    connections.release(config.shutdown_grace).await;
    result
}

/// Serve `app` until `shutdown` resolves, then drain in-flight requests
/// for at most `grace` before dropping them.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
) -> Result<(), DeployError>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::info!("Listening on http://{}", listener.local_addr()?);

    let (draining_tx, draining_rx) = watch::channel(false);
    let signal = async move {
        shutdown.await;
        log::info!("Shutdown requested; draining for up to {:?}", grace);
        let _ = draining_tx.send(true);
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = drain_deadline(draining_rx, grace) => {
            log::warn!("Drain deadline reached; dropping open connections");
        }
    }

    log::info!("Server stopped");
    Ok(())
}

/// Resolves `grace` after draining starts; never resolves before that
async fn drain_deadline(mut draining: watch::Receiver<bool>, grace: Duration) {
    while !*draining.borrow() {
        if draining.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(grace).await;
}

/// Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn request_log_middleware(request: Request, next: Next) -> Response {
    let rid = request_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    log::info!(
        "request_id={} method={} path={} status={} elapsed_ms={}",
        rid,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    if let Ok(value) = HeaderValue::from_str(&rid) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::adk::graph::{node_fn, StateSchema, StateUpdate};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn ctx() -> AppContext {
        let mut graph = StateGraph::new(StateSchema::new());
        graph.add_node(
            "noop",
            node_fn(|_state, _ctx| async move { Ok::<_, BoxError>(StateUpdate::new()) }),
        );
        AppContext::without_connections(graph, Some("k".to_string()))
    }

    #[tokio::test]
    async fn test_root_redirects_to_docs() {
        let resp = router(ctx())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()["location"], "/docs");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let resp = router(ctx())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[REQUEST_ID_HEADER], "req-123");
    }

    #[tokio::test]
    async fn test_docs_and_openapi_are_public() {
        for path in ["/docs", "/openapi.json"] {
            let resp = router(ctx())
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_docs_page_mounts_swagger_ui() {
        let resp = router(ctx())
            .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains(r##"dom_id: "#swagger-ui""##));
        assert!(page.contains(r#"url: "/openapi.json""#));
        assert!(page.trim_end().ends_with("</html>"));
    }

    #[tokio::test]
    async fn test_drain_deadline_waits_for_signal() {
        let (tx, rx) = watch::channel(false);
        let deadline = tokio::spawn(drain_deadline(rx, Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!deadline.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), deadline)
            .await
            .unwrap()
            .unwrap();
    }
}
