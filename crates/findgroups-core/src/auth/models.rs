//! Tokens, accounts and token-endpoint payloads.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Longest lifetime accepted from a token response (one day).
const MAX_LIFETIME_SECS: u64 = 86_400;

/// A bearer credential and the instant it stops being accepted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Wrap a token secret with an explicit expiry.
    #[must_use]
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Wrap a token secret valid for `expires_in` seconds from now.
    #[must_use]
    pub fn from_lifetime(secret: impl Into<String>, expires_in: u64) -> Self {
        let secs = i64::try_from(expires_in.min(MAX_LIFETIME_SECS)).unwrap_or_default();
        Self::new(secret, Utc::now() + TimeDelta::seconds(secs))
    }

    /// The bearer secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// When the token expires.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is still valid `skew` from now.
    #[must_use]
    pub fn is_valid_for(&self, skew: TimeDelta) -> bool {
        !self.secret.is_empty() && self.expires_at - skew > Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A signed-in user known to this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `{oid}.{tid}`, stable across sign-ins.
    pub home_account_id: String,
    /// Preferred username (usually the UPN).
    pub username: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
}

/// Successful token-endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token; may be empty if the server misbehaves.
    #[serde(default)]
    pub access_token: String,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Present when `offline_access` was granted.
    pub refresh_token: Option<String>,
    /// Present when `openid` was granted.
    pub id_token: Option<String>,
    /// Space-separated scopes actually granted.
    #[serde(default)]
    pub scope: String,
}

/// OAuth2 error body returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code such as `invalid_grant`.
    pub error: String,
    /// Human-readable explanation.
    #[serde(default)]
    pub error_description: String,
}

/// Build an `Account` from the claims of an id token.
///
/// # Errors
///
/// Returns an error if the token is not a JWT or lacks `oid`/`tid`.
pub fn account_from_id_token(id_token: &str) -> Result<Account, AuthError> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::Claims(
            "invalid JWT format - expected 3 parts".to_string(),
        ));
    }

    let payload = base64url_decode(parts[1])?;
    let claims: serde_json::Value = serde_json::from_str(&payload)
        .map_err(|e| AuthError::Claims(format!("parsing claims: {e}")))?;

    let oid = claims["oid"]
        .as_str()
        .ok_or_else(|| AuthError::Claims("missing oid claim".to_string()))?;
    let tid = claims["tid"]
        .as_str()
        .ok_or_else(|| AuthError::Claims("missing tid claim".to_string()))?;
    let username = ["preferred_username", "upn", "unique_name"]
        .iter()
        .find_map(|k| claims[*k].as_str())
        .unwrap_or("unknown");

    Ok(Account {
        home_account_id: format!("{oid}.{tid}"),
        username: username.to_string(),
        tenant_id: tid.to_string(),
    })
}

fn base64url_decode(input: &str) -> Result<String, AuthError> {
    use base64::Engine;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|e| AuthError::Claims(format!("base64 decode: {e}")))?;
    String::from_utf8(decoded).map_err(|e| AuthError::Claims(format!("invalid UTF-8: {e}")))
}
