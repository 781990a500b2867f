//! Microsoft Graph client for the directory listings.
//!
//! Every call goes through [`AuthenticatedClient`], so each request (every
//! page included) carries a freshly acquired bearer token.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::CoreError;
use crate::auth::AccessTokenSource;
use crate::config::AppConfig;
use crate::graph::models::{DirectoryObject, ODataPage, UserProfile, graph_error_message};
use crate::graph::pager::{Page, PageSource, PagedLister};
use crate::graph::request::{AuthenticatedClient, GraphRequest};

/// Graph API client.
#[derive(Debug)]
pub struct GraphClient<A> {
    http: AuthenticatedClient<A>,
    base_url: String,
}

impl<A: AccessTokenSource> GraphClient<A> {
    /// Create a client against `base_url` (e.g. `https://graph.microsoft.com/v1.0`).
    pub fn new(http: AuthenticatedClient<A>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from configuration, with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn from_config(tokens: A, config: &AppConfig) -> Result<Self, CoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.runtime.request_timeout())
            .build()
            .map_err(|e| CoreError::Other(format!("creating HTTP client: {e}")))?;

        Ok(Self::new(
            AuthenticatedClient::new(http_client, tokens),
            &config.graph.base_url,
        ))
    }

    /// The authenticated transport.
    pub const fn http(&self) -> &AuthenticatedClient<A> {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Ids of the groups the signed-in user is a direct member of
    /// (`POST /me/getMemberGroups`, `securityEnabledOnly: false`).
    pub fn my_member_groups(&self) -> PagedLister<'_, Self, String> {
        PagedLister::new(
            self,
            GraphRequest::post(
                self.url("me/getMemberGroups"),
                serde_json::json!({ "securityEnabledOnly": false }),
            ),
        )
    }

    /// Every group in the organization (`GET /groups`).
    pub fn groups(&self) -> PagedLister<'_, Self, DirectoryObject> {
        PagedLister::new(self, GraphRequest::get(self.url("groups")))
    }

    /// Groups and roles `user_principal_name` is a member of
    /// (`GET /users/{upn}/memberOf`).
    pub fn member_of(&self, user_principal_name: &str) -> PagedLister<'_, Self, DirectoryObject> {
        let path = format!(
            "users/{}/memberOf",
            urlencoding::encode(user_principal_name)
        );
        PagedLister::new(self, GraphRequest::get(self.url(&path)))
    }

    /// Profile of the signed-in user (`GET /me`).
    ///
    /// # Errors
    ///
    /// Returns an error if token acquisition or the request fails.
    pub async fn me(&self) -> Result<UserProfile, CoreError> {
        self.execute(&GraphRequest::get(self.url("me"))).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: &GraphRequest) -> Result<T, CoreError> {
        let response = self.http.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = graph_error_message(&text);
            if status == StatusCode::NOT_FOUND {
                return Err(CoreError::NotFound(format!("{}: {message}", request.url)));
            }
            return Err(CoreError::Transport(format!(
                "{request} failed: {status} - {message}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::Serialization(format!("parsing response from {request}: {e}")))
    }
}

#[async_trait]
impl<A, T> PageSource<T> for GraphClient<A>
where
    A: AccessTokenSource,
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, request: &GraphRequest) -> Result<Page<T>, CoreError> {
        let page: ODataPage<T> = self.execute(request).await?;
        Ok(Page {
            items: page.value,
            next: page.next_link.map(|link| request.continue_at(link)),
        })
    }
}
