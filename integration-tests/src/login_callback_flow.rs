//! End-to-end login/callback scenarios across gate, session layer and
//! wrapped application

use crate::test_utils::*;
use async_trait::async_trait;
use axum::{Extension, Router, http::StatusCode, routing::get};
use oauth_gate::{
    AccessCredential, CallbackPolicy, GateConfig, OAuthProvider, ProviderError, ProviderUrls,
    REQUEST_SECRET_KEY, REQUEST_TOKEN_KEY, RequestToken, StaticProvider,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_sessions::Session;

fn provider_for(config: &GateConfig) -> StaticProvider {
    StaticProvider::new(ProviderUrls::from_config(config).expect("provider urls should resolve"))
        .with_request_token("requestkey", "requestsecret")
        .with_expected_verifier("gotit")
        .with_access_token("someaccesstoken", "someaccesssecret")
        .with_profile(json!({"screen_name": "bob", "id": 1234}))
}

/// Provider whose account-verification endpoint is down
struct BrokenProfileProvider {
    inner: StaticProvider,
}

#[async_trait]
impl OAuthProvider for BrokenProfileProvider {
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, ProviderError> {
        self.inner.request_token(callback_url).await
    }

    fn authorize_url(&self, token: &RequestToken) -> String {
        self.inner.authorize_url(token)
    }

    async fn access_token(
        &self,
        pending: &RequestToken,
        verifier: &str,
    ) -> Result<AccessCredential, ProviderError> {
        self.inner.access_token(pending, verifier).await
    }

    async fn verify_credentials(
        &self,
        _credential: &AccessCredential,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::transport(
            "account verification endpoint unreachable",
        ))
    }
}

async fn dump_twitter_user(session: Session) -> String {
    let user: Option<Value> = session.get("twitter_user").await.expect("session read");
    let token: Option<String> = session
        .get(REQUEST_TOKEN_KEY)
        .await
        .expect("session read");
    let secret: Option<String> = session
        .get(REQUEST_SECRET_KEY)
        .await
        .expect("session read");
    json!({"user": user, "token": token, "secret": secret}).to_string()
}

async fn echo_access(Extension(access): Extension<AccessCredential>) -> String {
    json!({"token": access.token, "secret": access.secret}).to_string()
}

#[tokio::test]
async fn full_login_round_trip_with_custom_paths() -> anyhow::Result<()> {
    let config = GateConfig::new("key", "secret", "http://term.ie")
        .with_login_path("/signin")
        .with_callback_path("/signin/callback")
        .with_redirect_to("/account")
        .with_session_key("twitter_user");
    let provider = Arc::new(provider_for(&config));
    let gate = config.create_gate(provider.clone())?;

    let inner = Router::new().route("/dump", get(dump_twitter_user));
    let app = gated_app(gate, inner);

    let login = fetch(&app, "/signin", None).await;
    assert_eq!(login.status(), StatusCode::FOUND);
    assert_eq!(
        login.headers().get("location").unwrap(),
        "http://term.ie/oauth/authorize?oauth_token=requestkey"
    );
    let cookie = cookie_of(&login).expect("login should establish a session");
    assert_eq!(
        provider.calls().callback_urls,
        vec!["http://app.example.com/signin/callback".to_string()]
    );

    let callback = fetch(&app, "/signin/callback?oauth_verifier=gotit", Some(&cookie)).await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(callback.headers().get("location").unwrap(), "/account");
    assert_eq!(provider.calls().verifiers, vec!["gotit".to_string()]);

    let dump = fetch(&app, "/dump", Some(&cookie)).await;
    let state: Value = serde_json::from_str(&body_of(dump).await)?;
    assert_eq!(state["user"]["screen_name"], "bob");
    assert_eq!(state["user"]["id"], 1234);
    assert_eq!(state["token"], Value::Null);
    assert_eq!(state["secret"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn pending_state_is_scoped_to_the_session() -> anyhow::Result<()> {
    let config = GateConfig::new("key", "secret", "http://term.ie");
    let provider = Arc::new(provider_for(&config));
    let gate = config.create_gate(provider)?;
    let app = gated_app(gate, Router::new());

    let login = fetch(&app, "/oauth_login", None).await;
    assert_eq!(login.status(), StatusCode::FOUND);
    let cookie = cookie_of(&login).expect("login should establish a session");

    // A fresh client never logged in, so its callback has nothing to redeem.
    let stranger = fetch(&app, "/oauth_callback?oauth_verifier=gotit", None).await;
    assert_eq!(stranger.status(), StatusCode::BAD_REQUEST);

    // The original session is untouched by the stranger's attempt.
    let callback = fetch(&app, "/oauth_callback?oauth_verifier=gotit", Some(&cookie)).await;
    assert_eq!(callback.status(), StatusCode::FOUND);

    Ok(())
}

#[tokio::test]
async fn profile_fetch_failure_still_consumes_pending_pair() -> anyhow::Result<()> {
    let config = GateConfig::new("key", "secret", "http://term.ie");
    let provider = Arc::new(BrokenProfileProvider {
        inner: provider_for(&config),
    });
    let gate = config.create_gate(provider)?;
    let app = gated_app(gate, Router::new());

    let login = fetch(&app, "/oauth_login", None).await;
    let cookie = cookie_of(&login).expect("login should establish a session");

    let callback = fetch(&app, "/oauth_callback?oauth_verifier=gotit", Some(&cookie)).await;
    assert_eq!(callback.status(), StatusCode::BAD_GATEWAY);
    let body = body_of(callback).await;
    assert!(
        !body.contains("unreachable"),
        "provider-internal detail leaked: {body}"
    );

    // The exchange itself succeeded, so the pair was consumed; retrying is a
    // fresh-session case now.
    let replay = fetch(&app, "/oauth_callback?oauth_verifier=gotit", Some(&cookie)).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn delegate_mode_passes_tokens_to_the_wrapped_app() -> anyhow::Result<()> {
    let config = GateConfig::new("key", "secret", "http://term.ie")
        .with_callback_policy(CallbackPolicy::DelegateWithTokens);
    let provider = Arc::new(provider_for(&config));
    let gate = config.create_gate(provider)?;

    let inner = Router::new().route("/oauth_callback", get(echo_access));
    let app = gated_app(gate, inner);

    let login = fetch(&app, "/oauth_login", None).await;
    let cookie = cookie_of(&login).expect("login should establish a session");

    let callback = fetch(&app, "/oauth_callback?oauth_verifier=gotit", Some(&cookie)).await;
    assert_eq!(callback.status(), StatusCode::OK);
    let seen: Value = serde_json::from_str(&body_of(callback).await)?;
    assert_eq!(seen["token"], "someaccesstoken");
    assert_eq!(seen["secret"], "someaccesssecret");

    Ok(())
}

#[tokio::test]
async fn only_exact_path_matches_are_intercepted() {
    let config = GateConfig::new("key", "secret", "http://term.ie");
    let provider = Arc::new(provider_for(&config));
    let gate = config.create_gate(provider).unwrap();

    let inner = Router::new().fallback(|| async { "inner" });
    let app = gated_app(gate, inner);

    for uri in ["/oauth_login/extra", "/oauth_loginx", "/elsewhere"] {
        let response = fetch(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri} should pass through");
        assert_eq!(body_of(response).await, "inner");
    }

    let login = fetch(&app, "/oauth_login", None).await;
    assert_eq!(login.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn login_failure_response_is_complete() {
    let config = GateConfig::new("key", "wrong", "http://term.ie");
    let provider = Arc::new(provider_for(&config).rejecting_consumer());
    let gate = config.create_gate(provider).unwrap();
    let app = gated_app(gate, Router::new());

    let response = fetch(&app, "/oauth_login", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain"
    );
    let length: usize = response
        .headers()
        .get("content-length")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .expect("content-length should be present");

    let body = body_of(response).await;
    assert_eq!(body, "Whoa, OAuth was given the wrong consumer key or secret");
    assert_eq!(length, body.len());
}
