// SPDX-License-Identifier: MIT

//! API key gate for protected routes

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::context::AppContext;
use super::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

pub const INVALID_API_KEY: &str =
    "Invalid API Key. Check that you are passing a 'X-API-Key' on your header.";

/// Reject the request unless `X-API-Key` equals the configured secret.
///
/// Runs as route middleware, so nothing downstream (including body
/// extraction) happens for a rejected request.
pub async fn require_api_key(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let authorized = match (ctx.api_key.as_deref(), provided) {
        (Some(expected), Some(provided)) => keys_match(expected, provided),
        _ => false,
    };

    if !authorized {
        log::warn!(
            "Rejected {} {}: invalid or missing API key",
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::unauthorized(INVALID_API_KEY));
    }

    Ok(next.run(request).await)
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
