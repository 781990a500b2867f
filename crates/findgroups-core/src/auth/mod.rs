//! Sign-in against the Microsoft identity platform.
//!
//! This module provides:
//! - `TokenProvider`: silent-first token acquisition with interactive fallback
//! - `PublicClient`: OAuth2 public client (refresh-token redemption, and
//!   authorization code + PKCE through a loopback redirect)
//! - `AccountCache`: accounts, refresh tokens and access tokens seen so far

pub mod cache;
pub mod loopback;
pub mod models;
pub mod pkce;
pub mod provider;
pub mod public_client;

use thiserror::Error;

pub use cache::AccountCache;
pub use models::{AccessToken, Account};
pub use provider::{AccessTokenSource, IdentityClient, TokenProvider};
pub use public_client::{AuthorizeHandler, PublicClient};

/// Delegated permissions requested for every Graph call.
pub const GRAPH_SCOPES: [&str; 4] = [
    "User.Read",
    "Group.Read.All",
    "Directory.Read.All",
    "Directory.AccessAsUser.All",
];

/// Returns `GRAPH_SCOPES` as owned strings.
#[must_use]
pub fn graph_scopes() -> Vec<String> {
    GRAPH_SCOPES.iter().map(ToString::to_string).collect()
}

/// Errors that can occur while acquiring a token.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Silent acquisition cannot proceed without the user.
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    /// The token endpoint answered with an OAuth2 error.
    #[error("token request rejected ({code}): {description}")]
    Rejected {
        /// OAuth2 `error` code.
        code: String,
        /// OAuth2 `error_description`.
        description: String,
    },

    /// The token endpoint could not be reached or answered garbage.
    #[error("token request failed: {0}")]
    Transport(String),

    /// The browser sign-in did not deliver a usable authorization code.
    #[error("sign-in redirect failed: {0}")]
    Callback(String),

    /// Interactive sign-in completed without an access token.
    #[error("identity provider returned no access token")]
    MissingAccessToken,

    /// The id token could not be decoded.
    #[error("invalid id token: {0}")]
    Claims(String),

    /// Reading or writing the account cache failed.
    #[error("account cache error: {0}")]
    Cache(String),

    /// The client is not configured well enough to sign in.
    #[error("auth configuration error: {0}")]
    Config(String),
}
