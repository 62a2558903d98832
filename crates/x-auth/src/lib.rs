//! X (Twitter) OAuth 2.0 authorization-code + PKCE protocol core
//!
//! Generates PKCE material and CSRF state, validates the provider
//! callback, exchanges and refreshes tokens, and fetches the user
//! profile. This crate has no routing or session storage: callers keep
//! the verifier and state between the redirect and the callback.
//!
//! Flow:
//! 1. Initiate: `OAuthClient::authorization_request()` returns verifier,
//!    state and the URL to redirect the user to
//! 2. Complete: `validate_callback()` -> `exchange_code()` ->
//!    `fetch_user_profile()`, stopping at the first failure
//! 3. Maintain: `refresh_token()` whenever the access token goes stale

pub mod callback;
pub mod client;
pub mod constants;
pub mod error;
pub mod pkce;
pub mod profile;
pub mod token;

pub use callback::{CallbackParams, validate_callback};
pub use client::{ClientCredentials, DEFAULT_TIMEOUT, Endpoints, OAuthClient, OAuthClientConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use pkce::{
    AuthorizationRequest, authorization_request_at, build_authorization_request,
    build_authorization_url, compute_challenge, generate_state, generate_verifier,
};
pub use profile::{UserProfile, fetch_user_profile};
pub use token::{Token, exchange_code, refresh_token};
