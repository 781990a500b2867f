//! Token acquisition against a fake identity-platform token endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use url::Url;

use findgroups_core::auth::pkce::challenge_for;
use findgroups_core::auth::{
    AccessToken, AccessTokenSource, Account, AccountCache, AuthError, IdentityClient,
    PublicClient, TokenProvider, graph_scopes,
};
use findgroups_core::AuthConfig;

#[derive(Debug, Default)]
struct FakeAuthority {
    hits: AtomicUsize,
    /// `code_challenge` of the last authorize URL handed to the "browser".
    challenge: Mutex<Option<String>>,
}

type TokenForm = HashMap<String, String>;

async fn token(
    State(fake): State<Arc<FakeAuthority>>,
    Path(tenant): Path<String>,
    Form(form): Form<TokenForm>,
) -> Response {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(tenant, "common");
    assert_eq!(form["client_id"], "client-123");
    assert!(form["scope"].contains("offline_access"));

    match form["grant_type"].as_str() {
        "refresh_token" => redeem_refresh_token(&form),
        "authorization_code" => redeem_code(&fake, &form),
        other => (StatusCode::BAD_REQUEST, format!("unsupported grant {other}")).into_response(),
    }
}

fn redeem_refresh_token(form: &TokenForm) -> Response {
    match form["refresh_token"].as_str() {
        "good" => Json(json!({
            "token_type": "Bearer",
            "access_token": "fresh",
            "expires_in": 3600,
            "refresh_token": "rotated",
            "scope": form["scope"],
        }))
        .into_response(),
        "revoked" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70000: The refresh token has been revoked."
            })),
        )
            .into_response(),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "temporarily_unavailable",
                "error_description": "try again later"
            })),
        )
            .into_response(),
    }
}

fn redeem_code(fake: &FakeAuthority, form: &TokenForm) -> Response {
    let challenge = fake.challenge.lock().unwrap().clone();
    if challenge != Some(challenge_for(&form["code_verifier"])) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS501481: The Code_Verifier does not match."
            })),
        )
            .into_response();
    }
    assert!(form["redirect_uri"].starts_with("http://localhost:"));

    let mut body = json!({
        "token_type": "Bearer",
        "access_token": "interactive",
        "expires_in": 3600,
        "refresh_token": "rt-1",
        "scope": form["scope"],
    });
    if form["code"] == "code-with-id" {
        body["id_token"] = json!(ada_id_token());
    }
    Json(body).into_response()
}

fn ada_id_token() -> String {
    let claims = json!({
        "oid": "oid-ada",
        "tid": "tid-contoso",
        "preferred_username": "ada@contoso.com",
    });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

async fn spawn_authority() -> (String, Arc<FakeAuthority>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());
    let fake = Arc::new(FakeAuthority::default());

    let app = Router::new()
        .route("/{tenant}/oauth2/v2.0/token", post(token))
        .with_state(Arc::clone(&fake));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (host, fake)
}

fn ada() -> Account {
    Account {
        home_account_id: "oid-ada.tid-contoso".to_string(),
        username: "ada@contoso.com".to_string(),
        tenant_id: "tid-contoso".to_string(),
    }
}

fn settings(authority_host: &str) -> AuthConfig {
    AuthConfig {
        client_id: "client-123".to_string(),
        authority_host: authority_host.to_string(),
        open_browser: false,
        interactive_timeout: 10,
        ..AuthConfig::default()
    }
}

/// A client whose cache holds `ada` with an expired access token.
fn client_with_refresh_token(authority_host: &str, refresh_token: &str) -> PublicClient {
    let mut cache = AccountCache::in_memory();
    cache
        .store(
            ada(),
            Some(refresh_token.to_string()),
            &graph_scopes(),
            AccessToken::new("stale", Utc::now() - TimeDelta::hours(1)),
        )
        .unwrap();

    PublicClient::new(&settings(authority_host), cache, Duration::from_secs(5)).unwrap()
}

/// Stands in for the user: completes the sign-in by following the
/// authorize URL's redirect with `code`.
fn user_signs_in(
    fake: &Arc<FakeAuthority>,
    code: &'static str,
    prompts: &Arc<AtomicUsize>,
) -> impl Fn(&Url) + Send + Sync + 'static {
    let fake = Arc::clone(fake);
    let prompts = Arc::clone(prompts);
    move |url: &Url| {
        prompts.fetch_add(1, Ordering::SeqCst);
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        *fake.challenge.lock().unwrap() = Some(query["code_challenge"].clone());

        let redirect = format!(
            "{}/?code={code}&state={}",
            query["redirect_uri"].replace("localhost", "127.0.0.1"),
            query["state"]
        );
        tokio::spawn(async move {
            reqwest::get(redirect).await.unwrap();
        });
    }
}

#[tokio::test]
async fn refresh_token_is_redeemed_then_cached() {
    let (host, fake) = spawn_authority().await;
    let provider = TokenProvider::new(client_with_refresh_token(&host, "good"));

    let first = provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(first.secret(), "fresh");

    let second = provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(second.secret(), "fresh");
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);

    assert_eq!(provider.client().accounts().await, vec![ada()]);
}

#[tokio::test]
async fn revoked_refresh_token_requires_interaction() {
    let (host, _fake) = spawn_authority().await;
    let client = client_with_refresh_token(&host, "revoked");

    let err = client
        .acquire_token_silent(&graph_scopes(), &ada())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InteractionRequired(ref msg) if msg.contains("invalid_grant")));
}

#[tokio::test]
async fn other_token_errors_are_not_retried_interactively() {
    let (host, fake) = spawn_authority().await;
    let provider = TokenProvider::new(client_with_refresh_token(&host, "flaky"));

    let err = provider.access_token(&graph_scopes()).await.unwrap_err();
    assert!(
        matches!(err, AuthError::Rejected { ref code, .. } if code == "temporarily_unavailable")
    );
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interactive_sign_in_is_remembered_for_silent_reuse() {
    let (host, fake) = spawn_authority().await;
    let prompts = Arc::new(AtomicUsize::new(0));
    let client = PublicClient::new(&settings(&host), AccountCache::in_memory(), Duration::from_secs(5))
        .unwrap()
        .with_authorize_handler(user_signs_in(&fake, "code-with-id", &prompts));
    let provider = TokenProvider::new(client);

    let first = provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(first.secret(), "interactive");
    assert_eq!(provider.client().accounts().await, vec![ada()]);

    let second = provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(second.secret(), "interactive");
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_in_without_id_token_is_still_reused() {
    let (host, fake) = spawn_authority().await;
    let prompts = Arc::new(AtomicUsize::new(0));
    let client = PublicClient::new(&settings(&host), AccountCache::in_memory(), Duration::from_secs(5))
        .unwrap()
        .with_authorize_handler(user_signs_in(&fake, "code-without-id", &prompts));
    let provider = TokenProvider::new(client);

    for _ in 0..3 {
        let token = provider.access_token(&graph_scopes()).await.unwrap();
        assert_eq!(token.secret(), "interactive");
    }
    assert_eq!(provider.client().accounts().await.len(), 1);
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unwritable_account_cache_does_not_fail_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("not-a-dir");
    std::fs::write(&not_a_dir, "").unwrap();
    let cache = AccountCache::load(&not_a_dir.join("accounts.json")).unwrap();

    let (host, fake) = spawn_authority().await;
    let prompts = Arc::new(AtomicUsize::new(0));
    let client = PublicClient::new(&settings(&host), cache, Duration::from_secs(5))
        .unwrap()
        .with_authorize_handler(user_signs_in(&fake, "code-with-id", &prompts));
    let provider = TokenProvider::new(client);

    let token = provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(token.secret(), "interactive");

    provider.access_token(&graph_scopes()).await.unwrap();
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
}
