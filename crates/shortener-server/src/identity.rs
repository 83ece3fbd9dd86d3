// ABOUTME: Caller identity middleware for the shortener API.
// ABOUTME: Reads the user_id cookie, issues a ULID when absent, and exposes it as an extension.

use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use shortener_core::MAX_OWNER_LEN;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use ulid::Ulid;

/// Name of the cookie carrying the caller's identity.
pub const COOKIE_NAME: &str = "user_id";

/// The opaque owner id for the current request. Handlers extract it with
/// `Extension<Identity>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A tower Layer that attaches an `Identity` to every request.
#[derive(Clone, Default)]
pub struct IdentityLayer;

impl IdentityLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityMiddleware { inner }
    }
}

/// The middleware service that resolves or issues the caller identity.
#[derive(Clone)]
pub struct IdentityMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for IdentityMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let (owner, issued) = match cookie_value(req.headers(), COOKIE_NAME) {
            Some(owner) => (owner, false),
            None => {
                let owner = Ulid::new().to_string();
                tracing::debug!("issuing new identity {}", owner);
                (owner, true)
            }
        };

        req.extensions_mut().insert(Identity(owner.clone()));

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut resp = inner.call(req).await?;
            if issued {
                let cookie = format!("{}={}; Path=/; HttpOnly", COOKIE_NAME, owner);
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    resp.headers_mut().append(SET_COOKIE, value);
                }
            }
            Ok(resp)
        })
    }
}

/// Find a usable cookie value by name across all Cookie headers. Empty or
/// oversized values are ignored so the caller gets a fresh identity instead.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty() && value.len() <= MAX_OWNER_LEN)
}
