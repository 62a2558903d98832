//! Relay error responses
//!
//! Every failure a handler can return, mapped to an HTTP status and a JSON
//! body: `{"error":{"type":"...","message":"..."}}`. Protocol errors keep
//! the kind assigned by the core so clients can tell a denied consent from
//! a forged callback or an upstream failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by relay handlers.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    OAuth(#[from] x_auth::Error),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::OAuth(e) => match e {
                x_auth::Error::AuthorizationDenied { .. }
                | x_auth::Error::StateMismatch
                | x_auth::Error::MissingAuthorizationCode => StatusCode::BAD_REQUEST,
                x_auth::Error::TokenEndpoint { .. }
                | x_auth::Error::MalformedTokenResponse(_)
                | x_auth::Error::ProfileFetch { .. }
                | x_auth::Error::MalformedProfileResponse(_)
                | x_auth::Error::Http(_) => StatusCode::BAD_GATEWAY,
                x_auth::Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                x_auth::Error::Randomness(_) | x_auth::Error::InvalidEndpoint(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Unauthorized | Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::OAuth(e) => e.kind(),
            Error::Unauthorized => "unauthorized",
            Error::Unauthenticated(_) => "unauthenticated",
            Error::BadRequest(_) => "invalid_request",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let mut error = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
        });
        if let Error::OAuth(x_auth::Error::TokenEndpoint { status, .. }) = &self {
            error["upstream_status"] = serde_json::json!(status);
        }

        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}
