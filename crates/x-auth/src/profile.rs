//! Authenticated user lookup

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// The user an access token was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub username: String,
}

/// X API v2 wraps single-object responses in `data`.
#[derive(Deserialize)]
struct ProfileEnvelope {
    data: UserProfile,
}

/// Fetch the profile of the user behind `access_token`.
pub async fn fetch_user_profile(
    http: &reqwest::Client,
    profile_url: &str,
    access_token: &str,
) -> Result<UserProfile> {
    let response = http
        .get(profile_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::transport("profile request", e))?;

    let status = response.status();
    if status != StatusCode::OK {
        debug!(status = status.as_u16(), "profile endpoint rejected request");
        return Err(Error::ProfileFetch {
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::transport("profile response", e))?;
    let envelope: ProfileEnvelope = serde_json::from_slice(&body)
        .map_err(|e| Error::MalformedProfileResponse(e.to_string()))?;
    Ok(envelope.data)
}
