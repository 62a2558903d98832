//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret and the relay API key are loaded from env vars
//! or from files, never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use x_auth::{ClientCredentials, Endpoints, OAuthClientConfig};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
}

/// HTTP listener and session settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Lifetime of a relay session, including a pending authorization
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Mark the session cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the API key (alternative to RELAY_API_KEY env var)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
}

/// X OAuth client registration
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to X_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Refresh session tokens this close to expiry
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_session_ttl() -> u64 {
    600
}

fn default_scopes() -> Vec<String> {
    x_auth::DEFAULT_SCOPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_timeout() -> u64 {
    x_auth::DEFAULT_TIMEOUT.as_secs()
}

fn default_refresh_threshold() -> u64 {
    300
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

/// Resolve a secret: env var wins, then the file (trimmed). Empty values
/// count as unset.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        let value = Secret::new(value.trim().to_owned());
        if !value.is_blank() {
            return Ok(Some(value));
        }
    }
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            common::Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let value = Secret::new(contents.trim().to_owned());
        if !value.is_blank() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order:
    /// - client secret: X_CLIENT_SECRET env var, then client_secret_file
    /// - API key: RELAY_API_KEY env var, then api_key_file
    ///
    /// X_CLIENT_ID overrides `oauth.client_id` when set.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(client_id) = std::env::var("X_CLIENT_ID") {
            if !client_id.trim().is_empty() {
                config.oauth.client_id = client_id.trim().to_owned();
            }
        }
        if config.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        require_http_url("redirect_uri", &config.oauth.redirect_uri)?;
        for (field, value) in [
            ("authorize_url", &config.oauth.authorize_url),
            ("token_url", &config.oauth.token_url),
            ("profile_url", &config.oauth.profile_url),
        ] {
            if let Some(url) = value {
                require_http_url(field, url)?;
            }
        }

        if config.oauth.scopes.is_empty() {
            return Err(common::Error::Config("scopes must not be empty".into()));
        }
        if config.oauth.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.server.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }

        config.oauth.client_secret = resolve_secret(
            "X_CLIENT_SECRET",
            config.oauth.client_secret_file.as_deref(),
        )?;
        if config.oauth.client_secret.is_none() {
            return Err(common::Error::Config(
                "client secret not set: provide X_CLIENT_SECRET or client_secret_file".into(),
            ));
        }

        config.server.api_key =
            resolve_secret("RELAY_API_KEY", config.server.api_key_file.as_deref())?;
        if config.server.api_key.is_none() {
            return Err(common::Error::Config(
                "API key not set: provide RELAY_API_KEY or api_key_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("x-oauth-relay.toml")
    }

    /// Settings for the protocol core. Endpoints not overridden in the file
    /// keep their X defaults.
    pub fn oauth_client_config(&self) -> OAuthClientConfig {
        let oauth = &self.oauth;
        let defaults = Endpoints::default();
        OAuthClientConfig {
            credentials: ClientCredentials {
                client_id: oauth.client_id.clone(),
                client_secret: oauth
                    .client_secret
                    .clone()
                    .unwrap_or_else(|| Secret::new(String::new())),
            },
            redirect_uri: oauth.redirect_uri.clone(),
            scopes: oauth.scopes.clone(),
            endpoints: Endpoints {
                authorize_url: oauth
                    .authorize_url
                    .clone()
                    .unwrap_or(defaults.authorize_url),
                token_url: oauth.token_url.clone().unwrap_or(defaults.token_url),
                profile_url: oauth.profile_url.clone().unwrap_or(defaults.profile_url),
            },
            timeout: Duration::from_secs(oauth.timeout_secs),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.server.session_ttl_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.oauth.refresh_threshold_secs)
    }
}
