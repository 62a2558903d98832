//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, its S256 challenge and the CSRF state for
//! one authorization attempt, and assembles the authorization URL. The
//! verifier stays with the caller until token exchange; only the challenge
//! goes into the URL.
//!
//! Random bytes come straight from the operating system CSPRNG through a
//! fallible call. A failing source surfaces as [`Error::Randomness`].

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::AUTHORIZE_ENDPOINT;
use crate::error::{Error, Result};

/// Random bytes behind each verifier (86 base64url characters).
pub const VERIFIER_BYTES: usize = 64;

/// Random bytes behind each state value (43 base64url characters).
pub const STATE_BYTES: usize = 32;

/// Everything produced when an authorization attempt starts.
///
/// The caller must persist `verifier` and `state` until the callback
/// arrives, then discard them.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub verifier: String,
    pub state: String,
    pub authorization_url: String,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .field("authorization_url", &self.authorization_url)
            .finish()
    }
}

fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::Randomness(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 bytes encoded as URL-safe base64 without padding gives 86
/// characters, inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> Result<String> {
    random_token(VERIFIER_BYTES)
}

/// Generate the opaque CSRF state for one authorization attempt.
pub fn generate_state() -> Result<String> {
    random_token(STATE_BYTES)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization URL with all required OAuth parameters.
///
/// Parameter values are form-encoded, so scopes are joined with a space
/// and arrive at the provider as a single `scope` value.
pub fn build_authorization_url<S: AsRef<str>>(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[S],
    state: &str,
    challenge: &str,
) -> Result<String> {
    let mut url = Url::parse(authorize_endpoint)
        .map_err(|e| Error::InvalidEndpoint(format!("{authorize_endpoint}: {e}")))?;

    let scope = scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scope)
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}

/// Start an authorization attempt against the default X endpoint.
pub fn build_authorization_request<S: AsRef<str>>(
    client_id: &str,
    redirect_uri: &str,
    scopes: &[S],
) -> Result<AuthorizationRequest> {
    authorization_request_at(AUTHORIZE_ENDPOINT, client_id, redirect_uri, scopes)
}

/// Start an authorization attempt against an explicit authorization endpoint.
pub fn authorization_request_at<S: AsRef<str>>(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[S],
) -> Result<AuthorizationRequest> {
    let verifier = generate_verifier()?;
    let state = generate_state()?;
    let challenge = compute_challenge(&verifier);
    let authorization_url = build_authorization_url(
        authorize_endpoint,
        client_id,
        redirect_uri,
        scopes,
        &state,
        &challenge,
    )?;

    Ok(AuthorizationRequest {
        verifier,
        state,
        authorization_url,
    })
}
