//! Request descriptors and the bearer-token request factory.

use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use crate::CoreError;
use crate::auth::{AccessTokenSource, graph_scopes};

/// A request that has not been sent yet: method, absolute URL, optional JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// JSON body for POST requests.
    pub body: Option<Value>,
}

impl GraphRequest {
    /// A GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    /// A POST request with a JSON body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
        }
    }

    /// The same request aimed at a continuation link.
    ///
    /// Method and body carry over, so a paged POST action stays a POST.
    #[must_use]
    pub fn continue_at(&self, next_link: impl Into<String>) -> Self {
        Self {
            method: self.method.clone(),
            url: next_link.into(),
            body: self.body.clone(),
        }
    }
}

impl std::fmt::Display for GraphRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// HTTP client that stamps a freshly acquired bearer token on every request.
#[derive(Debug)]
pub struct AuthenticatedClient<A> {
    http_client: reqwest::Client,
    tokens: A,
    scopes: Vec<String>,
}

impl<A: AccessTokenSource> AuthenticatedClient<A> {
    /// Wrap `http_client`; tokens are requested for the Graph scope set.
    pub fn new(http_client: reqwest::Client, tokens: A) -> Self {
        Self {
            http_client,
            tokens,
            scopes: graph_scopes(),
        }
    }

    /// The scopes requested for every call.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// The token source.
    pub const fn tokens(&self) -> &A {
        &self.tokens
    }

    /// Acquire a token, then send `request` with `Authorization: bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Auth`] without sending anything if no token can
    /// be acquired, [`CoreError::Transport`] if the request cannot be sent.
    pub async fn send(&self, request: &GraphRequest) -> Result<reqwest::Response, CoreError> {
        let token = self.tokens.access_token(&self.scopes).await?;

        let mut builder = self
            .http_client
            .request(request.method.clone(), &request.url)
            .header(AUTHORIZATION, format!("bearer {}", token.secret()));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        log::debug!("{request}");
        builder
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("{request}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_keeps_method_and_body() {
        let first = GraphRequest::post(
            "https://graph.example/me/getMemberGroups",
            serde_json::json!({ "securityEnabledOnly": false }),
        );
        let next = first.continue_at("https://graph.example/next?page=2");
        assert_eq!(next.method, Method::POST);
        assert_eq!(next.body, first.body);
        assert_eq!(next.url, "https://graph.example/next?page=2");

        let get = GraphRequest::get("https://graph.example/groups").continue_at("n");
        assert_eq!(get.method, Method::GET);
        assert!(get.body.is_none());
        assert_eq!(get.to_string(), "GET n");
    }
}
