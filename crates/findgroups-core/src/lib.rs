//! Core library for findgroups - list Entra ID group memberships via Microsoft Graph.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant path resolution
//! - Schema and example config generation
//! - Sign-in against the Microsoft identity platform (silent, then interactive)
//! - A Graph client that pages through group listings
//! - Common types and error handling

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod listing;
pub mod paths;
pub mod schema;

pub use auth::{AccountCache, AuthError, PublicClient, TokenProvider};
pub use config::{AppConfig, AuthConfig, GraphConfig, LogLevel, LoggingConfig, PathsConfig, RuntimeConfig};
pub use error::{CoreError, Result};
pub use graph::{DirectoryObject, GraphClient, UserProfile};
pub use listing::{Listing, RunReport, run_listings};
pub use paths::{AppPaths, default_state_dir};
pub use schema::{generate_example_config, generate_schema};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "findgroups";

/// Graph client wired to the identity-platform public client.
pub type DirectoryClient = GraphClient<TokenProvider<PublicClient>>;

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Build a Graph client that signs in with the configured public client.
///
/// The account cache is persisted under the state directory only when
/// `auth.persist_accounts` is set.
///
/// # Errors
///
/// Returns an error if the client id is missing, the persisted account
/// cache cannot be read, or an HTTP client cannot be built.
pub fn connect(config: &AppConfig, paths: &AppPaths) -> Result<DirectoryClient> {
    let cache = if config.auth.persist_accounts {
        AccountCache::load(&paths.accounts_file())?
    } else {
        AccountCache::in_memory()
    };

    let public_client = PublicClient::new(&config.auth, cache, config.runtime.request_timeout())?;
    GraphClient::from_config(TokenProvider::new(public_client), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_prefix_is_uppercase_app_name() {
        assert_eq!(env_prefix(), "FINDGROUPS");
    }

    #[test]
    fn connect_requires_client_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::discover(Some(dir.path())).expect("paths");
        let err = connect(&AppConfig::default(), &paths).expect_err("no client id");
        assert!(matches!(err, CoreError::Auth(AuthError::Config(_))));

        let cfg = AppConfig::default().with_client_id_override(Some("client".to_string()));
        assert!(connect(&cfg, &paths).is_ok());
    }
}
