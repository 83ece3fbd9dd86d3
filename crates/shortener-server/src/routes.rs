// ABOUTME: Route definitions for the shortener HTTP API.
// ABOUTME: Assembles all routes into a single Axum Router with identity, tracing, and shared state.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;
use crate::identity::IdentityLayer;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(api::shorten::shorten_text))
        .route("/ping", get(api::shorten::ping))
        .route("/{id}", get(api::shorten::redirect))
        .route("/api/shorten", post(api::shorten::shorten_json))
        .route("/api/shorten/batch", post(api::shorten::shorten_batch))
        .route(
            "/api/user/urls",
            get(api::user_urls::list_user_urls).delete(api::user_urls::delete_user_urls),
        )
        .layer(IdentityLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
