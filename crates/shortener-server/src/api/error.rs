// ABOUTME: Maps storage errors onto HTTP status codes and JSON error bodies.
// ABOUTME: Handlers return ApiError so every failure renders as {"error": "..."}.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shortener_core::StoreError;

/// A handler error carrying the storage failure that caused it.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl ApiError {
    /// A 400 for request bodies or path segments that cannot be parsed.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StoreError::Validation(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::Gone(_) => StatusCode::GONE,
            StoreError::Conflict(_) | StoreError::BatchAborted { .. } => StatusCode::CONFLICT,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::BackendUnavailable(_) | StoreError::Backend(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
