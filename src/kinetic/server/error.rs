// SPDX-License-Identifier: MIT

//! HTTP error mapping for the server handlers

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;

use crate::adk::error::GraphError;

/// Body of every error response
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    /// Request body rejected by the JSON extractor
    Rejected { status: StatusCode, message: String },
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Rejected { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            Self::Unauthorized(message) | Self::Internal(message) => message,
            Self::Rejected { message, .. } => message,
        };
        (status, Json(ErrorDetail { detail })).into_response()
    }
}
