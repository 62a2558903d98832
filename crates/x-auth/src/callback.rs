//! Authorization callback validation
//!
//! The provider redirects the user agent back with either `code` + `state`
//! or `error` + `error_description`. Validation is a chain of gates; the
//! first failing gate ends the attempt and no token exchange happens.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Query parameters of the inbound callback.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Check a callback against the state stored when the attempt started.
///
/// Returns the authorization code on success. `expected_state` is `None`
/// when the correlation store has nothing for this attempt (expired,
/// cleared, or never started); that is treated as a mismatch.
pub fn validate_callback(params: &CallbackParams, expected_state: Option<&str>) -> Result<String> {
    if let Some(error) = non_empty(&params.error) {
        return Err(Error::AuthorizationDenied {
            error: error.to_string(),
            description: non_empty(&params.error_description)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let (Some(received), Some(expected)) = (non_empty(&params.state), expected_state) else {
        return Err(Error::StateMismatch);
    };
    if expected.is_empty() || !common::constant_time_eq(received.as_bytes(), expected.as_bytes()) {
        return Err(Error::StateMismatch);
    }

    non_empty(&params.code)
        .map(str::to_string)
        .ok_or(Error::MissingAuthorizationCode)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::generate_state;

    fn params(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(Into::into),
            state: state.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn matching_state_returns_code() {
        let state = generate_state().unwrap();
        let code = validate_callback(&params(Some("x"), Some(&state)), Some(&state)).unwrap();
        assert_eq!(code, "x");
    }

    #[test]
    fn different_state_is_rejected() {
        let s = generate_state().unwrap();
        let t = generate_state().unwrap();
        let result = validate_callback(&params(None, Some(&s)), Some(&t));
        assert!(matches!(result, Err(Error::StateMismatch)));

        // A code does not rescue a mismatched state
        let result = validate_callback(&params(Some("x"), Some(&s)), Some(&t));
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[test]
    fn modified_state_is_rejected() {
        let state = generate_state().unwrap();
        let mut tampered = state.clone();
        tampered.pop();
        tampered.push(if state.ends_with('A') { 'B' } else { 'A' });
        let result = validate_callback(&params(Some("x"), Some(&tampered)), Some(&state));
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[test]
    fn missing_state_is_rejected() {
        let result = validate_callback(&params(Some("x"), None), Some("expected"));
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[test]
    fn absent_expected_state_is_rejected() {
        let result = validate_callback(&params(Some("x"), Some("anything")), None);
        assert!(matches!(result, Err(Error::StateMismatch)));

        let result = validate_callback(&params(Some("x"), Some("")), Some(""));
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[test]
    fn provider_error_is_denied() {
        let callback = CallbackParams {
            error: Some("access_denied".into()),
            error_description: Some("user cancelled".into()),
            ..Default::default()
        };
        match validate_callback(&callback, Some("anything")) {
            Err(Error::AuthorizationDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "user cancelled");
            }
            other => panic!("expected AuthorizationDenied, got {other:?}"),
        }
    }

    #[test]
    fn provider_error_wins_over_valid_state() {
        let callback = CallbackParams {
            code: Some("x".into()),
            state: Some("s".into()),
            error: Some("server_error".into()),
            error_description: None,
        };
        let result = validate_callback(&callback, Some("s"));
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));
    }

    #[test]
    fn missing_code_after_valid_state() {
        let result = validate_callback(&params(None, Some("s")), Some("s"));
        assert!(matches!(result, Err(Error::MissingAuthorizationCode)));

        let result = validate_callback(&params(Some(""), Some("s")), Some("s"));
        assert!(matches!(result, Err(Error::MissingAuthorizationCode)));
    }
}
