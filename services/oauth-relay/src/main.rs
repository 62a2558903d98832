//! X OAuth Relay
//!
//! Single-binary service that:
//! 1. Starts the X OAuth 2.0 authorization-code + PKCE flow (`/login`)
//! 2. Completes it on the provider's redirect (`/callback`)
//! 3. Keeps session tokens fresh (`/refresh`, `/me`)
//! 4. Exposes `/health` and Prometheus `/metrics`

mod config;
mod error;
mod guard;
mod metrics;
mod oauth;
mod session;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use x_auth::OAuthClient;

use crate::config::Config;
use crate::oauth::{OAuthState, build_oauth_router};
use crate::session::SessionStore;

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes reported under their own label in `relay_requests_total`.
const KNOWN_ROUTES: &[&str] = &[
    "/health", "/metrics", "/login", "/callback", "/refresh", "/me", "/logout",
];

/// Shared state for the operational endpoints
#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionStore>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router: operational routes plus the OAuth flow routes,
/// under request accounting and a concurrency limit of `max_connections`.
fn build_router(state: AppState, oauth: Router, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(oauth)
        .layer(axum::middleware::from_fn(track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting x-oauth-relay");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let client_config = config.oauth_client_config();
    info!(
        listen_addr = %config.server.listen_addr,
        client_id = %config.oauth.client_id,
        redirect_uri = %config.oauth.redirect_uri,
        scopes = %config.oauth.scopes.join(" "),
        token_url = %client_config.endpoints.token_url,
        "configuration loaded"
    );

    let client = OAuthClient::new(client_config).context("failed to build OAuth client")?;
    let api_key = config
        .server
        .api_key
        .clone()
        .context("API key missing after config load")?;

    let sessions = Arc::new(SessionStore::new(config.session_ttl()));
    let oauth_state = OAuthState::new(
        client,
        sessions.clone(),
        api_key,
        config.server.cookie_secure,
        config.refresh_threshold(),
    );

    let app_state = AppState {
        sessions,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(
        app_state,
        build_oauth_router(oauth_state),
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires: notify the
    // server to drain, then race the drain against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Count every response by route and status.
async fn track_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let route = KNOWN_ROUTES
        .iter()
        .copied()
        .find(|r| *r == path)
        .unwrap_or("other");

    let response = next.run(request).await;
    metrics::record_request(route, response.status().as_u16());
    response
}

/// Health endpoint: status, uptime and live session count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_sessions": state.sessions.len().await,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
