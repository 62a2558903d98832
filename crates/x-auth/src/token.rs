//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completes the PKCE flow)
//! 2. Token refresh
//!
//! Both POST a form body to the token endpoint with HTTP Basic client
//! authentication and decode the same JSON token shape. Neither retries:
//! an authorization code is single-use, so a failed exchange means the
//! caller restarts the flow.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientCredentials;
use crate::error::{Error, Result};

/// Token set returned by the provider for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from issuance. The token does not
/// track its own age; callers record when they received it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Token {
    #[serde(default)]
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
    /// Absent when the provider does not rotate refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Token {
    /// Reject responses that parse as JSON but lack required fields.
    fn validated(mut self) -> Result<Self> {
        if self.access_token.trim().is_empty() {
            return Err(Error::MalformedTokenResponse(
                "response missing access_token".into(),
            ));
        }
        if self.token_type.trim().is_empty() {
            return Err(Error::MalformedTokenResponse(
                "response missing token_type".into(),
            ));
        }
        if self.refresh_token.as_deref().is_some_and(str::is_empty) {
            self.refresh_token = None;
        }
        Ok(self)
    }
}

/// Exchange an authorization code for tokens.
///
/// The verifier proves this caller started the attempt whose challenge
/// the provider recorded.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    redirect_uri: &str,
    code: &str,
    verifier: &str,
) -> Result<Token> {
    post_token_form(
        http,
        token_url,
        credentials,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ],
        "token exchange",
    )
    .await
}

/// Refresh an access token using a refresh token.
///
/// If the response omits `refresh_token`, the returned token carries
/// `None` and the caller keeps the refresh token it already holds.
pub async fn refresh_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    refresh: &str,
) -> Result<Token> {
    post_token_form(
        http,
        token_url,
        credentials,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", credentials.client_id.as_str()),
        ],
        "token refresh",
    )
    .await
}

async fn post_token_form(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    form: &[(&str, &str)],
    operation: &str,
) -> Result<Token> {
    let response = http
        .post(token_url)
        .basic_auth(
            &credentials.client_id,
            Some(credentials.client_secret.expose()),
        )
        .form(form)
        .send()
        .await
        .map_err(|e| Error::transport(operation, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::transport(operation, e))?;

    if status != StatusCode::OK {
        debug!(status = status.as_u16(), operation, "token endpoint rejected request");
        return Err(Error::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    let token: Token = serde_json::from_str(&body)
        .map_err(|e| Error::MalformedTokenResponse(format!("{operation}: {e}")))?;
    let token = token.validated()?;

    debug!(
        operation,
        expires_in = token.expires_in,
        rotated_refresh = token.refresh_token.is_some(),
        "token endpoint succeeded"
    );
    Ok(token)
}
