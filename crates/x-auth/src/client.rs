//! Shared OAuth client configuration
//!
//! `OAuthClient` bundles the values that are fixed for the lifetime of the
//! relay: client credentials, redirect URI, scopes, endpoints and the HTTP
//! client. It holds nothing per attempt. Verifier, state and tokens are
//! always passed in by the caller, so one instance is safe to share across
//! concurrent authorizations.

use std::time::Duration;

use common::Secret;

use crate::callback::{CallbackParams, validate_callback};
use crate::constants::{AUTHORIZE_ENDPOINT, DEFAULT_SCOPES, PROFILE_ENDPOINT, TOKEN_ENDPOINT};
use crate::error::{Error, Result};
use crate::pkce::{AuthorizationRequest, authorization_request_at};
use crate::profile::{UserProfile, fetch_user_profile};
use crate::token::{Token, exchange_code, refresh_token};

/// Upper bound on every call to the provider.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            profile_url: PROFILE_ENDPOINT.to_string(),
        }
    }
}

/// Confidential client credentials sent as HTTP Basic auth.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
        }
    }
}

/// Settings used to build an [`OAuthClient`].
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub credentials: ClientCredentials,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub endpoints: Endpoints,
    pub timeout: Duration,
}

impl OAuthClientConfig {
    /// Config with default X endpoints, scopes and timeout.
    pub fn new(credentials: ClientCredentials, redirect_uri: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Immutable, cloneable handle over the provider's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    credentials: ClientCredentials,
    redirect_uri: String,
    scopes: Vec<String>,
    endpoints: Endpoints,
}

impl OAuthClient {
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials: config.credentials,
            redirect_uri: config.redirect_uri,
            scopes: config.scopes,
            endpoints: config.endpoints,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Phase 1: fresh verifier, state and authorization URL.
    pub fn authorization_request(&self) -> Result<AuthorizationRequest> {
        authorization_request_at(
            &self.endpoints.authorize_url,
            &self.credentials.client_id,
            &self.redirect_uri,
            &self.scopes,
        )
    }

    /// Phase 2 gate: validate the callback against the stored state.
    pub fn validate_callback(
        &self,
        params: &CallbackParams,
        expected_state: Option<&str>,
    ) -> Result<String> {
        validate_callback(params, expected_state)
    }

    /// Phase 2: trade the authorization code and its verifier for tokens.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Token> {
        exchange_code(
            &self.http,
            &self.endpoints.token_url,
            &self.credentials,
            &self.redirect_uri,
            code,
            verifier,
        )
        .await
    }

    /// Phase 3: obtain a new access token from a refresh token.
    pub async fn refresh_token(&self, refresh: &str) -> Result<Token> {
        refresh_token(
            &self.http,
            &self.endpoints.token_url,
            &self.credentials,
            refresh,
        )
        .await
    }

    /// Look up the user the access token belongs to.
    pub async fn fetch_user_profile(&self, access_token: &str) -> Result<UserProfile> {
        fetch_user_profile(&self.http, &self.endpoints.profile_url, access_token).await
    }
}
