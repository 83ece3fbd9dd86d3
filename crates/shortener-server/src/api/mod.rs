// ABOUTME: API module containing the HTTP handler functions for the shortener.
// ABOUTME: Split into URL creation/resolution, per-user listing and deletion, and error mapping.

pub mod error;
pub mod shorten;
pub mod user_urls;

pub use error::ApiError;
