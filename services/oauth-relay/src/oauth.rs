//! OAuth flow routes
//!
//! Endpoints:
//! - GET  /login    (API key) start the PKCE flow, redirect to X
//! - GET  /callback complete the flow: validate, exchange, fetch profile
//! - POST /refresh  (API key) refresh a posted token or the session's token
//! - GET  /me       profile of the signed-in session, refreshing near expiry
//! - GET  /logout   drop the session
//!
//! The session store is the only place verifier and state live between
//! `/login` and `/callback`. Each attempt gets its own values; the shared
//! `OAuthClient` never holds them.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use x_auth::{CallbackParams, OAuthClient};

use crate::error::{Error, Result};
use crate::guard::require_api_key;
use crate::metrics;
use crate::session::{
    self, PendingAuthorization, SessionStore, SessionTokens, expired_session_cookie, now_millis,
    session_cookie,
};

/// Shared state for the OAuth routes.
#[derive(Clone)]
pub struct OAuthState {
    client: OAuthClient,
    sessions: Arc<SessionStore>,
    api_key: Arc<Secret<String>>,
    cookie_secure: bool,
    refresh_threshold: Duration,
}

impl OAuthState {
    pub fn new(
        client: OAuthClient,
        sessions: Arc<SessionStore>,
        api_key: Secret<String>,
        cookie_secure: bool,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            client,
            sessions,
            api_key: Arc::new(api_key),
            cookie_secure,
            refresh_threshold,
        }
    }
}

/// Build the router for the OAuth flow endpoints.
pub fn build_oauth_router(state: OAuthState) -> Router {
    let gated = Router::new()
        .route("/login", get(login))
        .route("/refresh", post(refresh))
        .route_layer(axum::middleware::from_fn_with_state(
            state.api_key.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/callback", get(callback))
        .route("/me", get(me))
        .route("/logout", get(logout))
        .merge(gated)
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Re-issue the session cookie with the session's current lifetime.
fn with_session_cookie(
    mut response: Response,
    state: &OAuthState,
    session_id: &str,
    lifetime: Duration,
) -> Response {
    let cookie = session_cookie(session_id, lifetime, state.cookie_secure);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    response
}

/// Count the outcome of a flow phase under its error kind.
fn record_outcome<T>(phase: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_oauth_outcome(phase, outcome);
}

/// Await a provider call and record its latency.
async fn timed<T>(
    operation: &'static str,
    call: impl Future<Output = x_auth::Result<T>>,
) -> x_auth::Result<T> {
    let started = Instant::now();
    let result = call.await;
    metrics::record_provider_call(operation, started.elapsed().as_secs_f64());
    result
}

/// GET /login — generate verifier + state, remember them, redirect to X.
#[instrument(skip_all)]
async fn login(State(state): State<OAuthState>, headers: HeaderMap) -> Result<Response> {
    let result = start_authorization(&state, &headers).await;
    record_outcome("initiate", &result);
    result
}

async fn start_authorization(state: &OAuthState, headers: &HeaderMap) -> Result<Response> {
    let request = state.client.authorization_request()?;

    let existing = session::session_id(headers);
    let session_id = state
        .sessions
        .put_pending(
            existing.as_deref(),
            PendingAuthorization {
                verifier: request.verifier,
                state: request.state,
            },
        )
        .await;

    info!("authorization initiated");

    let cookie = session_cookie(&session_id, state.sessions.ttl(), state.cookie_secure);
    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [(LOCATION, request.authorization_url), (SET_COOKIE, cookie)],
    )
        .into_response())
}

/// GET /callback — the provider's redirect back after consent.
#[instrument(skip_all)]
async fn callback(
    State(state): State<OAuthState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let result = complete_authorization(&state, &headers, &params).await;
    record_outcome("complete", &result);
    if let Err(e) = &result {
        warn!(error = %e, kind = e.kind(), "authorization failed");
    }
    result
}

async fn complete_authorization(
    state: &OAuthState,
    headers: &HeaderMap,
    params: &CallbackParams,
) -> Result<Response> {
    let session_id = session::session_id(headers);
    // Consume the pending attempt up front: whatever happens next, this
    // verifier/state pair is never usable again.
    let pending = match &session_id {
        Some(id) => state.sessions.take_pending(id).await,
        None => None,
    };

    let code = state
        .client
        .validate_callback(params, pending.as_ref().map(|p| p.state.as_str()))?;
    let (Some(session_id), Some(pending)) = (session_id, pending) else {
        return Err(x_auth::Error::StateMismatch.into());
    };

    let token = timed(
        "exchange",
        state.client.exchange_code(&code, &pending.verifier),
    )
    .await?;
    let issued_at = now_millis();

    let profile = timed(
        "profile",
        state.client.fetch_user_profile(&token.access_token),
    )
    .await?;

    let lifetime = state
        .sessions
        .sign_in(
            &session_id,
            SessionTokens::issued(&token, issued_at),
            profile.clone(),
            issued_at,
        )
        .await
        .ok_or(Error::Unauthenticated("session expired during sign-in"))?;

    info!(user_id = %profile.id, username = %profile.username, "authorization completed");

    let response = json_response(
        StatusCode::OK,
        serde_json::json!({
            "user": profile,
            "token": token,
        }),
    );
    Ok(with_session_cookie(response, state, &session_id, lifetime))
}

/// Request body for the refresh endpoint.
#[derive(Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<Secret<String>>,
}

/// POST /refresh — refresh a posted token, or the session's held token.
#[instrument(skip_all)]
async fn refresh(State(state): State<OAuthState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let result = refresh_tokens(&state, &headers, &body).await;
    record_outcome("refresh", &result);
    if let Err(e) = &result {
        warn!(error = %e, kind = e.kind(), "token refresh failed");
    }
    result
}

async fn refresh_tokens(state: &OAuthState, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
    let posted = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let request: RefreshRequest = serde_json::from_slice(body)
            .map_err(|e| Error::BadRequest(format!("refresh body: {e}")))?;
        request.refresh_token.filter(|t| !t.is_blank())
    };

    if let Some(refresh_token) = posted {
        let token = timed("refresh", state.client.refresh_token(refresh_token.expose())).await?;
        info!("refreshed posted token");
        return Ok(json_response(
            StatusCode::OK,
            serde_json::json!({ "token": token }),
        ));
    }

    let session_id =
        session::session_id(headers).ok_or(Error::Unauthenticated("no refresh token or session"))?;
    let held = state
        .sessions
        .tokens(&session_id)
        .await
        .ok_or(Error::Unauthenticated("session is not signed in"))?;
    let refresh_token = held
        .refresh_token
        .ok_or(Error::Unauthenticated("session holds no refresh token"))?;

    let token = timed("refresh", state.client.refresh_token(&refresh_token)).await?;
    let (updated, lifetime) = state
        .sessions
        .apply_refresh(&session_id, &token, now_millis())
        .await
        .ok_or(Error::Unauthenticated("session expired during refresh"))?;

    info!(
        rotated = token.refresh_token.is_some(),
        "refreshed session token"
    );

    let response = json_response(
        StatusCode::OK,
        serde_json::json!({
            "token": token,
            "expires_at": updated.expires_at,
        }),
    );
    Ok(with_session_cookie(response, state, &session_id, lifetime))
}

/// GET /me — profile of the signed-in session.
///
/// Refreshes the access token first when it is within the configured
/// threshold of expiry. A failed refresh is logged and the cached profile
/// is still returned.
#[instrument(skip_all)]
async fn me(State(state): State<OAuthState>, headers: HeaderMap) -> Result<Response> {
    let session_id =
        session::session_id(&headers).ok_or(Error::Unauthenticated("not signed in"))?;
    let mut tokens = state
        .sessions
        .tokens(&session_id)
        .await
        .ok_or(Error::Unauthenticated("not signed in"))?;

    let mut extended = None;
    if tokens.needs_refresh(now_millis(), state.refresh_threshold) {
        if let Some(refresh_token) = tokens.refresh_token.clone() {
            let result = timed("refresh", state.client.refresh_token(&refresh_token))
                .await
                .map_err(Error::from);
            record_outcome("refresh", &result);
            match result {
                Ok(token) => {
                    if let Some((updated, lifetime)) = state
                        .sessions
                        .apply_refresh(&session_id, &token, now_millis())
                        .await
                    {
                        tokens = updated;
                        extended = Some(lifetime);
                    }
                    info!("refreshed expiring session token");
                }
                Err(e) => warn!(error = %e, "proactive token refresh failed"),
            }
        }
    }

    let profile = state
        .sessions
        .profile(&session_id)
        .await
        .ok_or(Error::Unauthenticated("not signed in"))?;

    let response = json_response(
        StatusCode::OK,
        serde_json::json!({
            "user": profile,
            "expires_at": tokens.expires_at,
        }),
    );
    Ok(match extended {
        Some(lifetime) => with_session_cookie(response, &state, &session_id, lifetime),
        None => response,
    })
}

/// GET /logout — forget the session and expire the cookie.
async fn logout(State(state): State<OAuthState>, headers: HeaderMap) -> Response {
    if let Some(id) = session::session_id(&headers) {
        if state.sessions.clear(&id).await {
            info!("session cleared");
        }
    }

    (
        StatusCode::OK,
        [
            (
                axum::http::header::CONTENT_TYPE,
                "application/json".to_string(),
            ),
            (SET_COOKIE, expired_session_cookie(state.cookie_secure)),
        ],
        serde_json::json!({ "status": "logged_out" }).to_string(),
    )
        .into_response()
}
