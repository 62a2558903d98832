//! API key gate for operator-facing routes
//!
//! `/login` and `/refresh` require the relay API key, passed either as the
//! `api_key` query parameter or the `x-api-key` header. The callback is
//! not gated: the provider redirects the browser there without the key.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::Secret;
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;

/// Header alternative to the `api_key` query parameter.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Deserialize)]
pub struct ApiKeyQuery {
    #[serde(default)]
    api_key: Option<String>,
}

/// True when `provided` equals the configured key. Empty keys never match.
pub fn api_key_matches(expected: &Secret<String>, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) if !provided.is_empty() && !expected.is_blank() => {
            common::constant_time_eq(provided.as_bytes(), expected.expose().as_bytes())
        }
        _ => false,
    }
}

/// Middleware rejecting requests without a valid API key.
pub async fn require_api_key(
    State(expected): State<Arc<Secret<String>>>,
    Query(query): Query<ApiKeyQuery>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let provided = query.api_key.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    if !api_key_matches(&expected, provided.as_deref()) {
        warn!(path = %request.uri().path(), "rejected request without valid API key");
        return Error::Unauthorized.into_response();
    }
    next.run(request).await
}
