// ABOUTME: Handlers for listing and deleting the caller's own short URLs.
// ABOUTME: Deletion is accepted immediately and carried out by the background deletion pipeline.

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::app_state::SharedState;
use crate::identity::Identity;

/// One element of the GET /api/user/urls response array.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// GET /api/user/urls -- every live record the caller owns, or 204 when none.
pub async fn list_user_urls(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError> {
    let records = state.store.get_by_owner(identity.as_str()).await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let urls: Vec<UserUrl> = records
        .into_iter()
        .map(|record| UserUrl {
            short_url: state.short_url(record.id),
            original_url: record.url,
        })
        .collect();
    Ok(Json(urls).into_response())
}

/// DELETE /api/user/urls -- body is a JSON array of id strings.
///
/// Responds 202 once every id parses. Ids the caller does not own are
/// skipped silently by the pipeline.
pub async fn delete_user_urls(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let ids: Vec<String> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?;

    let run = state.deletions.submit(identity.0, ids.as_slice())?;
    // Dropping the handle detaches the run; it still completes.
    drop(run);
    Ok(StatusCode::ACCEPTED)
}
