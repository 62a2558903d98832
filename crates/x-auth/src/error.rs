//! Error types for the OAuth protocol core

/// Errors from the authorization flow.
///
/// Each variant maps to one step of the flow so the routing layer can
/// tell a denied consent apart from a forged callback or a broken
/// provider response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("secure random source unavailable: {0}")]
    Randomness(String),

    #[error("authorization denied: {error} ({description})")]
    AuthorizationDenied { error: String, description: String },

    #[error("state parameter missing or does not match the pending authorization")]
    StateMismatch,

    #[error("callback is missing the authorization code")]
    MissingAuthorizationCode,

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("malformed token response: {0}")]
    MalformedTokenResponse(String),

    #[error("profile endpoint returned {status}")]
    ProfileFetch { status: u16 },

    #[error("malformed profile response: {0}")]
    MalformedProfileResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

impl Error {
    /// Stable machine-readable name, used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Randomness(_) => "randomness_error",
            Error::AuthorizationDenied { .. } => "authorization_denied",
            Error::StateMismatch => "state_mismatch",
            Error::MissingAuthorizationCode => "missing_code",
            Error::TokenEndpoint { .. } => "token_endpoint_error",
            Error::MalformedTokenResponse(_) => "malformed_token_response",
            Error::ProfileFetch { .. } => "profile_fetch_error",
            Error::MalformedProfileResponse(_) => "malformed_profile_response",
            Error::Http(_) => "http_error",
            Error::Timeout(_) => "timeout",
            Error::InvalidEndpoint(_) => "invalid_endpoint",
        }
    }

    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub(crate) fn transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(format!("{context}: {err}"))
        } else {
            Error::Http(format!("{context}: {err}"))
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
