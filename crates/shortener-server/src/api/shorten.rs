// ABOUTME: Handlers for creating short URLs, resolving them, and the storage liveness probe.
// ABOUTME: Covers the plain-text and JSON shorten endpoints, batch shorten, redirects, and /ping.

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use shortener_core::{BatchItem, StoreError};

use super::ApiError;
use crate::app_state::SharedState;
use crate::identity::Identity;

/// Request body for POST /api/shorten.
#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
}

/// Response body for POST /api/shorten.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub result: String,
}

/// One element of the POST /api/shorten/batch request array.
#[derive(Debug, Deserialize)]
pub struct BatchRequestItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// One element of the POST /api/shorten/batch response array.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponseItem {
    pub correlation_id: String,
    pub short_url: String,
}

/// Outcome of a single shorten call: a fresh id, or the id already holding the URL.
enum Shortened {
    Created(u64),
    Existing(u64),
}

impl Shortened {
    fn status_and_id(&self) -> (StatusCode, u64) {
        match self {
            Shortened::Created(id) => (StatusCode::CREATED, *id),
            Shortened::Existing(id) => (StatusCode::CONFLICT, *id),
        }
    }
}

async fn shorten(state: &SharedState, owner: &str, url: &str) -> Result<Shortened, ApiError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }

    match state.store.put(owner, url).await {
        Ok(id) => {
            tracing::debug!("shortened {} as {} for {}", url, id, owner);
            Ok(Shortened::Created(id))
        }
        Err(StoreError::Conflict(id)) => {
            // Resolve through the URL index; fall back to the id the store reported.
            let existing = state
                .store
                .get_by_url(url)
                .await
                .map(|record| record.id)
                .unwrap_or(id);
            Ok(Shortened::Existing(existing))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST / -- shorten a URL sent as the raw request body.
pub async fn shorten_text(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    body: String,
) -> Result<Response, ApiError> {
    let (status, id) = shorten(&state, identity.as_str(), &body)
        .await?
        .status_and_id();
    Ok((
        status,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.short_url(id),
    )
        .into_response())
}

/// POST /api/shorten -- shorten a URL sent as `{"url": "..."}`.
pub async fn shorten_json(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ShortenRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?;

    let (status, id) = shorten(&state, identity.as_str(), &req.url)
        .await?
        .status_and_id();
    Ok((
        status,
        Json(ShortenResponse {
            result: state.short_url(id),
        }),
    )
        .into_response())
}

/// POST /api/shorten/batch -- shorten many URLs atomically.
pub async fn shorten_batch(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: Vec<BatchRequestItem> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?;

    let items = req
        .into_iter()
        .map(|item| {
            BatchItem::new(
                item.correlation_id,
                identity.as_str(),
                item.original_url.trim(),
            )
        })
        .collect();

    let stored = state.store.put_batch(items).await?;
    let resp: Vec<BatchResponseItem> = stored
        .into_iter()
        .filter_map(|item| {
            item.id.map(|id| BatchResponseItem {
                short_url: state.short_url(id),
                correlation_id: item.correlation_id,
            })
        })
        .collect();

    tracing::debug!("batch shortened {} urls for {}", resp.len(), identity.as_str());
    Ok((StatusCode::CREATED, Json(resp)).into_response())
}

/// GET /{id} -- redirect to the original URL.
pub async fn redirect(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id: u64 = raw_id
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id {:?}", raw_id)))?;

    let record = state.store.get(id).await?;
    Ok(Redirect::temporary(&record.url).into_response())
}

/// GET /ping -- 200 when the storage backend answers.
pub async fn ping(State(state): State<SharedState>) -> Result<&'static str, ApiError> {
    state.store.ping().await?;
    Ok("ok")
}
