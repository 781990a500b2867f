//! OAuth2 public client for the Microsoft identity platform (v2.0 endpoints).
//!
//! Silent acquisition serves cached access tokens and redeems refresh
//! tokens. Interactive acquisition runs the authorization code flow with
//! PKCE: a loopback listener receives the redirect, the system browser shows
//! the sign-in and consent prompt.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use url::Url;

use crate::auth::cache::AccountCache;
use crate::auth::loopback::LoopbackRedirect;
use crate::auth::models::{
    AccessToken, Account, OAuthErrorResponse, TokenResponse, account_from_id_token,
};
use crate::auth::pkce::{PkceChallenge, random_state};
use crate::auth::provider::IdentityClient;
use crate::auth::{AuthError, cache::RESERVED_SCOPES};
use crate::config::AuthConfig;

/// Cached access tokens this close to expiry are not served.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// OAuth2 error codes that only the user can resolve.
const INTERACTION_CODES: [&str; 4] = [
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

/// Receives the authorize URL in place of the system browser.
pub type AuthorizeHandler = Box<dyn Fn(&Url) + Send + Sync>;

/// Public (no secret) client registered with the identity platform.
pub struct PublicClient {
    http_client: reqwest::Client,
    settings: AuthConfig,
    cache: Mutex<AccountCache>,
    authorize_handler: Option<AuthorizeHandler>,
}

impl std::fmt::Debug for PublicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicClient")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .field("custom_authorize_handler", &self.authorize_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl PublicClient {
    /// Create a client for `settings`, backed by `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if no client id is configured or the HTTP client
    /// cannot be built.
    pub fn new(
        settings: &AuthConfig,
        cache: AccountCache,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        if settings.client_id.trim().is_empty() {
            return Err(AuthError::Config(
                "no client id configured - set auth.client_id, FINDGROUPS__AUTH__CLIENT_ID or --client-id"
                    .to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config(format!("creating HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            settings: settings.clone(),
            cache: Mutex::new(cache),
            authorize_handler: None,
        })
    }

    /// Hand the authorize URL to `handler` instead of printing it and
    /// launching the browser.
    #[must_use]
    pub fn with_authorize_handler(mut self, handler: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.authorize_handler = Some(Box::new(handler));
        self
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.settings.authority())
    }

    /// Build the authorize URL the browser is sent to.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authority is not a valid URL.
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
        pkce: &PkceChallenge,
        state: &str,
    ) -> Result<Url, AuthError> {
        let endpoint = format!("{}/oauth2/v2.0/authorize", self.settings.authority());
        let mut url = Url::parse(&endpoint)
            .map_err(|e| AuthError::Config(format!("invalid authority {endpoint}: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &request_scope(scopes))
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "select_account");

        Ok(url)
    }

    fn with_cache<R>(&self, f: impl FnOnce(&mut AccountCache) -> R) -> Result<R, AuthError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|_| AuthError::Cache("account cache lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    async fn redeem(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let endpoint = self.token_endpoint();
        log::debug!("POST {endpoint}");

        let response = self
            .http_client
            .post(&endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<OAuthErrorResponse>(&text) {
                Ok(err) => AuthError::Rejected {
                    code: err.error,
                    description: err.error_description,
                },
                Err(_) => AuthError::Transport(format!("token endpoint returned {status}: {text}")),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Transport(format!("parsing token response: {e}")))
    }

    fn remember(
        &self,
        account: Account,
        response: &TokenResponse,
        scopes: &[String],
    ) -> Result<AccessToken, AuthError> {
        let token = AccessToken::from_lifetime(response.access_token.clone(), response.expires_in);
        let username = account.username.clone();
        let stored = self.with_cache(|cache| {
            cache.store(account, response.refresh_token.clone(), scopes, token.clone())
        })?;
        // the in-memory entry is updated even when saving fails
        if let Err(e) = stored {
            log::warn!("signed in as {username}, but the account cache was not saved: {e}");
        }
        Ok(token)
    }

    fn placeholder_account(&self) -> Account {
        Account {
            home_account_id: format!("{}.{}", self.settings.client_id, self.settings.tenant),
            username: "(unnamed account)".to_string(),
            tenant_id: self.settings.tenant.clone(),
        }
    }

    fn open_browser(&self, url: &Url) {
        if let Some(handler) = &self.authorize_handler {
            handler(url);
            return;
        }
        eprintln!("Sign in to continue. If no browser opens, visit:\n\n  {url}\n");
        if !self.settings.open_browser {
            return;
        }
        if let Err(e) = open::that_detached(url.as_str()) {
            log::warn!("could not open a browser: {e}");
        }
    }
}

#[async_trait]
impl IdentityClient for PublicClient {
    async fn accounts(&self) -> Vec<Account> {
        self.with_cache(|cache| cache.accounts()).unwrap_or_default()
    }

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: &Account,
    ) -> Result<AccessToken, AuthError> {
        let skew = TimeDelta::minutes(EXPIRY_SKEW_MINUTES);
        let (cached, refresh_token) = self.with_cache(|cache| {
            (
                cache.access_token(account, scopes, skew),
                cache.refresh_token(account),
            )
        })?;

        if let Some(token) = cached {
            return Ok(token);
        }

        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::InteractionRequired(format!(
                "no refresh token cached for {}",
                account.username
            )));
        };

        let scope = request_scope(scopes);
        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.redeem(&params).await.map_err(|e| match e {
            AuthError::Rejected { code, description }
                if INTERACTION_CODES.contains(&code.as_str()) =>
            {
                AuthError::InteractionRequired(format!("{code}: {description}"))
            }
            other => other,
        })?;

        log::debug!("refreshed token for {}", account.username);
        self.remember(account.clone(), &response, scopes)
    }

    async fn acquire_token_interactive(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        let listener = LoopbackRedirect::bind(self.settings.redirect_port).await?;
        let redirect_uri = listener.redirect_uri();
        let pkce = PkceChallenge::new();
        let state = random_state();

        let url = self.authorize_url(&redirect_uri, scopes, &pkce, &state)?;
        self.open_browser(&url);

        let timeout = Duration::from_secs(self.settings.interactive_timeout.max(1));
        let code = listener.wait_for_code(&state, timeout).await?;

        let scope = request_scope(scopes);
        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("scope", scope.as_str()),
        ];
        let response = self.redeem(&params).await?;
        if response.access_token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }

        let account = match response.id_token.as_deref() {
            Some(id_token) => account_from_id_token(id_token)?,
            None => {
                log::warn!("no id token returned; remembering the sign-in under a placeholder account");
                self.placeholder_account()
            }
        };
        log::info!("signed in as {}", account.username);
        self.remember(account, &response, scopes)
    }
}

/// Requested scopes plus the reserved ones, space separated.
fn request_scope(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    for reserved in RESERVED_SCOPES {
        if !all.iter().any(|s| s.eq_ignore_ascii_case(reserved)) {
            all.push(reserved);
        }
    }
    all.join(" ")
}
