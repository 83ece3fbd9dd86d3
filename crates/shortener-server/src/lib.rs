// ABOUTME: HTTP server for the shortener, exposing shorten, redirect, listing, and deletion routes.
// ABOUTME: Uses Axum with a shared storage handle and a cookie-based caller identity layer.

pub mod api;
pub mod app_state;
pub mod config;
pub mod identity;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use config::{ConfigError, ShortenerConfig};
pub use identity::{Identity, IdentityLayer};
pub use routes::create_router;
