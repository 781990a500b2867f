//! Silent-first token acquisition with a single interactive fallback.

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::auth::models::{AccessToken, Account};

/// The identity-provider operations the token provider builds on.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Accounts that have signed in before, most recently used first.
    async fn accounts(&self) -> Vec<Account>;

    /// Acquire a token for `account` without user interaction.
    ///
    /// Must fail with [`AuthError::InteractionRequired`] when only the user
    /// can unblock the request.
    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: &Account,
    ) -> Result<AccessToken, AuthError>;

    /// Acquire a token through the user-facing sign-in and consent prompt.
    async fn acquire_token_interactive(&self, scopes: &[String]) -> Result<AccessToken, AuthError>;
}

/// Anything that can hand out bearer tokens for a scope set.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A token valid for `scopes`.
    async fn access_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError>;
}

/// Acquires tokens silently when an account is known, interactively otherwise.
#[derive(Debug)]
pub struct TokenProvider<C> {
    client: C,
}

impl<C: IdentityClient> TokenProvider<C> {
    /// Wrap an identity client.
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// The wrapped identity client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Acquire a token for `scopes`.
    ///
    /// Tries the first known account silently; only an
    /// [`AuthError::InteractionRequired`] outcome falls through to one
    /// interactive attempt. With no known account the silent path is skipped.
    ///
    /// # Errors
    ///
    /// Returns the silent error if it is not an interaction-required signal,
    /// the interactive error, or [`AuthError::MissingAccessToken`] when the
    /// interactive flow yields an empty token.
    pub async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        let accounts = self.client.accounts().await;

        if let Some(account) = accounts.first() {
            match self.client.acquire_token_silent(scopes, account).await {
                Ok(token) => {
                    log::trace!("silent token for {}", account.username);
                    return Ok(token);
                }
                Err(AuthError::InteractionRequired(reason)) => {
                    log::info!(
                        "silent sign-in for {} needs interaction: {reason}",
                        account.username
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            log::debug!("no cached account, signing in interactively");
        }

        let token = self.client.acquire_token_interactive(scopes).await?;
        if token.secret().is_empty() {
            return Err(AuthError::MissingAccessToken);
        }
        Ok(token)
    }
}

#[async_trait]
impl<C: IdentityClient> AccessTokenSource for TokenProvider<C> {
    async fn access_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        self.acquire_token(scopes).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::auth::graph_scopes;

    #[derive(Debug, Clone, Copy)]
    enum Silent {
        Succeeds,
        NeedsInteraction,
        Fails,
    }

    #[derive(Debug)]
    struct FakeIdentity {
        has_account: bool,
        silent: Silent,
        interactive_secret: &'static str,
        silent_calls: AtomicUsize,
        interactive_calls: AtomicUsize,
    }

    impl FakeIdentity {
        const fn new(has_account: bool, silent: Silent) -> Self {
            Self {
                has_account,
                silent,
                interactive_secret: "interactive",
                silent_calls: AtomicUsize::new(0),
                interactive_calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.silent_calls.load(Ordering::SeqCst),
                self.interactive_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl IdentityClient for FakeIdentity {
        async fn accounts(&self) -> Vec<Account> {
            if self.has_account {
                vec![Account {
                    home_account_id: "o.t".to_string(),
                    username: "ada@contoso.com".to_string(),
                    tenant_id: "t".to_string(),
                }]
            } else {
                Vec::new()
            }
        }

        async fn acquire_token_silent(
            &self,
            _scopes: &[String],
            _account: &Account,
        ) -> Result<AccessToken, AuthError> {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            match self.silent {
                Silent::Succeeds => Ok(AccessToken::from_lifetime("silent", 3600)),
                Silent::NeedsInteraction => {
                    Err(AuthError::InteractionRequired("invalid_grant".to_string()))
                }
                Silent::Fails => Err(AuthError::Transport("connection refused".to_string())),
            }
        }

        async fn acquire_token_interactive(
            &self,
            _scopes: &[String],
        ) -> Result<AccessToken, AuthError> {
            self.interactive_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::from_lifetime(self.interactive_secret, 3600))
        }
    }

    #[tokio::test]
    async fn silent_success_skips_interactive() {
        let provider = TokenProvider::new(FakeIdentity::new(true, Silent::Succeeds));
        let token = provider.acquire_token(&graph_scopes()).await.expect("token");
        assert_eq!(token.secret(), "silent");
        assert_eq!(provider.client().calls(), (1, 0));
    }

    #[tokio::test]
    async fn interaction_required_falls_back_exactly_once() {
        let provider = TokenProvider::new(FakeIdentity::new(true, Silent::NeedsInteraction));
        let token = provider.acquire_token(&graph_scopes()).await.expect("token");
        assert_eq!(token.secret(), "interactive");
        assert_eq!(provider.client().calls(), (1, 1));
    }

    #[tokio::test]
    async fn other_silent_errors_are_not_retried() {
        let provider = TokenProvider::new(FakeIdentity::new(true, Silent::Fails));
        let err = provider
            .acquire_token(&graph_scopes())
            .await
            .expect_err("silent failure");
        assert!(matches!(err, AuthError::Transport(_)));
        assert_eq!(provider.client().calls(), (1, 0));
    }

    #[tokio::test]
    async fn no_account_goes_straight_to_interactive() {
        let provider = TokenProvider::new(FakeIdentity::new(false, Silent::Succeeds));
        provider.acquire_token(&graph_scopes()).await.expect("token");
        assert_eq!(provider.client().calls(), (0, 1));
    }

    #[tokio::test]
    async fn empty_interactive_token_is_fatal() {
        let mut identity = FakeIdentity::new(false, Silent::Succeeds);
        identity.interactive_secret = "";
        let provider = TokenProvider::new(identity);
        let err = provider
            .access_token(&graph_scopes())
            .await
            .expect_err("empty token");
        assert!(matches!(err, AuthError::MissingAccessToken));
    }
}
