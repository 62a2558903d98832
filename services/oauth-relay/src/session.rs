//! In-memory session store
//!
//! Holds the per-attempt correlation values (PKCE verifier and CSRF state)
//! between `/login` and `/callback`, and the token set once the callback
//! succeeds. Sessions are keyed by a random id carried in a cookie and
//! expire after the configured TTL of inactivity; a signed-in session lives
//! at least until its access token expires. Expired entries are swept
//! lazily on write.
//!
//! The store is an explicit handle in `AppState`; the protocol core never
//! touches it.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use tokio::sync::Mutex;
use tracing::debug;

use x_auth::{Token, UserProfile};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "x_relay_session";

/// Correlation values for one in-flight authorization attempt.
pub struct PendingAuthorization {
    pub verifier: String,
    pub state: String,
}

/// Tokens held for a signed-in session.
///
/// `expires_at` is a unix timestamp in milliseconds, computed from
/// `Token.expires_in` at the moment the token was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

impl SessionTokens {
    pub fn issued(token: &Token, now_millis: u64) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: expiry(now_millis, token.expires_in),
        }
    }

    /// Apply a refresh response. The held refresh token is replaced only
    /// when the provider sent a new one.
    pub fn apply_refresh(&mut self, token: &Token, now_millis: u64) {
        self.access_token = token.access_token.clone();
        self.expires_at = expiry(now_millis, token.expires_in);
        if let Some(rotated) = token.refresh_token.as_deref().filter(|r| !r.is_empty()) {
            self.refresh_token = Some(rotated.to_string());
        }
    }

    pub fn needs_refresh(&self, now_millis: u64, threshold: Duration) -> bool {
        now_millis.saturating_add(threshold.as_millis() as u64) >= self.expires_at
    }
}

/// `expires_in` is provider-supplied; clamp instead of overflowing.
fn expiry(now_millis: u64, expires_in_secs: u64) -> u64 {
    now_millis.saturating_add(expires_in_secs.saturating_mul(1000))
}

/// Upper bound on how long a signed-in session outlives its last use.
pub const MAX_SIGNED_IN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Default)]
struct Session {
    pending: Option<PendingAuthorization>,
    tokens: Option<SessionTokens>,
    profile: Option<UserProfile>,
}

struct Entry {
    session: Session,
    touched_at: Instant,
    /// Idle time after which the entry is dropped. Starts at the store TTL
    /// and grows to cover the access token once signed in.
    lifetime: Duration,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.touched_at.elapsed() < self.lifetime
    }
}

/// Thread-safe session map with TTL expiry.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a fresh session holding a pending authorization. Returns the
    /// new session id.
    pub async fn create(&self, pending: PendingAuthorization) -> String {
        let id = uuid::Uuid::new_v4().as_simple().to_string();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, e| e.is_live());
        sessions.insert(
            id.clone(),
            Entry {
                session: Session {
                    pending: Some(pending),
                    ..Default::default()
                },
                touched_at: Instant::now(),
                lifetime: self.ttl,
            },
        );
        debug!(sessions = sessions.len(), "session created");
        id
    }

    /// Start a new attempt on an existing session, or start a new session
    /// when `id` is unknown or expired. Returns the id in use.
    ///
    /// Any earlier sign-in on the session is dropped: the session only
    /// holds tokens again once this attempt's callback succeeds.
    pub async fn put_pending(&self, id: Option<&str>, pending: PendingAuthorization) -> String {
        if let Some(id) = id {
            let mut sessions = self.sessions.lock().await;
            if let Some(entry) = live_entry(&mut sessions, id) {
                entry.session = Session {
                    pending: Some(pending),
                    ..Default::default()
                };
                entry.touched_at = Instant::now();
                entry.lifetime = self.ttl;
                return id.to_string();
            }
        }
        self.create(pending).await
    }

    /// Remove and return the pending authorization. A second call for the
    /// same attempt returns `None`.
    pub async fn take_pending(&self, id: &str) -> Option<PendingAuthorization> {
        let mut sessions = self.sessions.lock().await;
        live_entry(&mut sessions, id)?.session.pending.take()
    }

    /// Store the result of a completed authorization. Returns the session's
    /// new lifetime, for the cookie's `Max-Age`.
    pub async fn sign_in(
        &self,
        id: &str,
        tokens: SessionTokens,
        profile: UserProfile,
        now_millis: u64,
    ) -> Option<Duration> {
        let mut sessions = self.sessions.lock().await;
        let entry = live_entry(&mut sessions, id)?;
        let lifetime = self.signed_in_lifetime(&tokens, now_millis);
        entry.session.tokens = Some(tokens);
        entry.session.profile = Some(profile);
        entry.touched_at = Instant::now();
        entry.lifetime = lifetime;
        Some(lifetime)
    }

    pub async fn tokens(&self, id: &str) -> Option<SessionTokens> {
        let mut sessions = self.sessions.lock().await;
        live_entry(&mut sessions, id)?.session.tokens.clone()
    }

    pub async fn profile(&self, id: &str) -> Option<UserProfile> {
        let mut sessions = self.sessions.lock().await;
        live_entry(&mut sessions, id)?.session.profile.clone()
    }

    /// Apply a refresh response to the session's tokens, keeping the held
    /// refresh token when the response has none. Returns the updated set
    /// and the session's new lifetime.
    pub async fn apply_refresh(
        &self,
        id: &str,
        token: &Token,
        now_millis: u64,
    ) -> Option<(SessionTokens, Duration)> {
        let mut sessions = self.sessions.lock().await;
        let entry = live_entry(&mut sessions, id)?;
        let tokens = entry.session.tokens.as_mut()?;
        tokens.apply_refresh(token, now_millis);
        let updated = tokens.clone();
        let lifetime = self.signed_in_lifetime(&updated, now_millis);
        entry.touched_at = Instant::now();
        entry.lifetime = lifetime;
        Some((updated, lifetime))
    }

    /// Drop the session entirely.
    pub async fn clear(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.values().filter(|e| e.is_live()).count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signed-in sessions live at least until the access token expires, so
    /// the token can still be refreshed near expiry. Never less than the
    /// store TTL, never more than [`MAX_SIGNED_IN_LIFETIME`].
    fn signed_in_lifetime(&self, tokens: &SessionTokens, now_millis: u64) -> Duration {
        let remaining = Duration::from_millis(tokens.expires_at.saturating_sub(now_millis));
        self.ttl.max(remaining.min(MAX_SIGNED_IN_LIFETIME))
    }
}

/// Look up a session, evicting it if it has outlived its lifetime.
fn live_entry<'a>(sessions: &'a mut HashMap<String, Entry>, id: &str) -> Option<&'a mut Entry> {
    if !sessions.get(id)?.is_live() {
        sessions.remove(id);
        return None;
    }
    sessions.get_mut(id)
}

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Extract the session id from the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value binding the browser to a session.
pub fn session_cookie(id: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token(access: &str, refresh: Option<&str>, expires_in: u64) -> Token {
        Token {
            token_type: "bearer".into(),
            expires_in,
            access_token: access.into(),
            scope: "users.read offline.access".into(),
            refresh_token: refresh.map(Into::into),
        }
    }

    fn pending(tag: &str) -> PendingAuthorization {
        PendingAuthorization {
            verifier: format!("verifier-{tag}"),
            state: format!("state-{tag}"),
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "1".into(),
            name: "Test User".into(),
            username: "test".into(),
        }
    }

    #[test]
    fn issued_tokens_compute_absolute_expiry() {
        let tokens = SessionTokens::issued(&token("at", Some("rt"), 7200), 1_000);
        assert_eq!(tokens.expires_at, 1_000 + 7_200_000);
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn refresh_without_rotation_keeps_previous_refresh_token() {
        let mut tokens = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), 0);
        tokens.apply_refresh(&token("at_2", None, 7200), 5_000);

        assert_eq!(tokens.access_token, "at_2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt_1"));
        assert_eq!(tokens.expires_at, 5_000 + 7_200_000);
    }

    #[test]
    fn refresh_with_empty_refresh_token_keeps_previous() {
        let mut tokens = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), 0);
        tokens.apply_refresh(&token("at_2", Some(""), 7200), 0);
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt_1"));
    }

    #[test]
    fn refresh_with_rotation_replaces_refresh_token() {
        let mut tokens = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), 0);
        tokens.apply_refresh(&token("at_2", Some("rt_2"), 7200), 0);
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt_2"));
    }

    #[test]
    fn oversized_expires_in_saturates() {
        let now = now_millis();
        let tokens = SessionTokens::issued(&token("at", Some("rt"), u64::MAX), now);
        assert_eq!(tokens.expires_at, u64::MAX);

        let mut refreshed = SessionTokens::issued(&token("at", Some("rt"), 7200), now);
        refreshed.apply_refresh(&token("at_2", None, u64::MAX / 100), now);
        assert_eq!(refreshed.expires_at, u64::MAX);
        assert!(!refreshed.needs_refresh(now, Duration::from_secs(300)));
        assert!(refreshed.needs_refresh(u64::MAX, Duration::from_secs(300)));
    }

    #[test]
    fn needs_refresh_within_threshold() {
        let tokens = SessionTokens::issued(&token("at", None, 600), 0);
        let threshold = Duration::from_secs(300);
        assert!(!tokens.needs_refresh(0, threshold));
        assert!(tokens.needs_refresh(300_000, threshold));
        assert!(tokens.needs_refresh(700_000, threshold));
    }

    #[tokio::test]
    async fn pending_authorization_is_single_use() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;

        let first = store.take_pending(&id).await.unwrap();
        assert_eq!(first.state, "state-a");
        assert_eq!(first.verifier, "verifier-a");
        assert!(store.take_pending(&id).await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(Duration::from_secs(600));
        let a = store.create(pending("a")).await;
        let b = store.create(pending("b")).await;
        assert_ne!(a, b);

        assert_eq!(store.take_pending(&b).await.unwrap().state, "state-b");
        assert_eq!(store.take_pending(&a).await.unwrap().state, "state-a");
    }

    #[tokio::test]
    async fn put_pending_reuses_live_session() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;
        let reused = store.put_pending(Some(&id), pending("b")).await;
        assert_eq!(reused, id);
        assert_eq!(store.take_pending(&id).await.unwrap().state, "state-b");

        let fresh = store.put_pending(Some("unknown"), pending("c")).await;
        assert_ne!(fresh, "unknown");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn expired_session_yields_nothing() {
        let store = SessionStore::new(Duration::from_millis(20));
        let id = store.create(pending("a")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.take_pending(&id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn sign_in_and_refresh_preserve_refresh_token() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;
        store.take_pending(&id).await;

        let issued = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), 0);
        assert!(store.sign_in(&id, issued, profile(), 0).await.is_some());
        assert_eq!(store.profile(&id).await.unwrap().username, "test");

        let (updated, _) = store
            .apply_refresh(&id, &token("at_2", None, 7200), 10)
            .await
            .unwrap();
        assert_eq!(updated.access_token, "at_2");
        assert_eq!(updated.refresh_token.as_deref(), Some("rt_1"));
        assert_eq!(store.tokens(&id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;
        assert!(store.clear(&id).await);
        assert!(!store.clear(&id).await);
        assert!(store.take_pending(&id).await.is_none());
    }

    #[tokio::test]
    async fn signed_in_session_outlives_pending_ttl() {
        let store = SessionStore::new(Duration::from_millis(20));
        let id = store.create(pending("a")).await;
        store.take_pending(&id).await;

        let now = now_millis();
        let issued = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), now);
        let lifetime = store.sign_in(&id, issued, profile(), now).await.unwrap();
        assert_eq!(lifetime, Duration::from_secs(7200));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.tokens(&id).await.unwrap().access_token, "at_1");
        assert_eq!(store.len().await, 1);

        let (_, lifetime) = store
            .apply_refresh(&id, &token("at_2", None, 3600), now)
            .await
            .unwrap();
        assert_eq!(lifetime, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn signed_in_lifetime_is_bounded() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;

        let now = now_millis();
        let short = SessionTokens::issued(&token("at", None, 60), now);
        assert_eq!(
            store.sign_in(&id, short, profile(), now).await,
            Some(Duration::from_secs(600))
        );

        let huge = SessionTokens::issued(&token("at", None, u64::MAX), now);
        assert_eq!(
            store.sign_in(&id, huge, profile(), now).await,
            Some(MAX_SIGNED_IN_LIFETIME)
        );
    }

    #[tokio::test]
    async fn new_attempt_drops_previous_sign_in() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = store.create(pending("a")).await;
        store.take_pending(&id).await;
        let issued = SessionTokens::issued(&token("at_1", Some("rt_1"), 7200), 0);
        store.sign_in(&id, issued, profile(), 0).await.unwrap();

        let reused = store.put_pending(Some(&id), pending("b")).await;
        assert_eq!(reused, id);
        assert!(store.tokens(&id).await.is_none());
        assert!(store.profile(&id).await.is_none());
        assert_eq!(store.take_pending(&id).await.unwrap().state, "state-b");
    }

    #[test]
    fn session_id_parsed_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; x_relay_session=abc123; other=1"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("x_relay_session="));
        assert!(session_id(&empty).is_none());
        assert!(session_id(&HeaderMap::new()).is_none());
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc", Duration::from_secs(600), true);
        assert!(cookie.starts_with("x_relay_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=600"));
        assert!(cookie.ends_with("; Secure"));

        let expired = expired_session_cookie(false);
        assert!(expired.contains("Max-Age=0"));
        assert!(!expired.contains("Secure"));
    }
}
