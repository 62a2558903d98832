//! X (Twitter) OAuth 2.0 endpoint constants
//!
//! Defaults for the public X API v2 endpoints. Every value here can be
//! overridden through [`crate::Endpoints`] so the relay can be pointed at
//! a stub provider.

/// Authorization endpoint the user agent is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://x.com/i/oauth2/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://api.x.com/2/oauth2/token";

/// Authenticated user lookup
pub const PROFILE_ENDPOINT: &str = "https://api.x.com/2/users/me";

/// Scopes requested when the caller does not configure its own.
/// `offline.access` is what makes the provider issue a refresh token.
pub const DEFAULT_SCOPES: &[&str] = &["tweet.read", "users.read", "follows.read", "offline.access"];
