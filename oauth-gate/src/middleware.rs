//! Axum middleware implementation of the OAuth login flow

use crate::config::{CallbackPolicy, GateConfig};
use crate::error::{GateError, GateResult};
use crate::provider::{OAuthProvider, ProviderError};
use crate::session::{clear_pending, load_pending, store_pending};
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, StatusCode, Uri, header},
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{debug, warn};
use url::Url;

/// OAuth login middleware
///
/// Intercepts the configured login and callback paths and forwards every
/// other request to the wrapped application. Attach it with
/// [`axum::middleware::from_fn`]; a `tower_sessions::SessionManagerLayer`
/// must be installed outside it so requests carry a session.
#[derive(Clone)]
pub struct OAuthGate {
    config: GateConfig,
    provider: Arc<dyn OAuthProvider>,
}

impl OAuthGate {
    /// Create a new gate around a provider client
    ///
    /// Fails immediately when required configuration is missing, so a
    /// misconfigured deployment dies at startup instead of on the first
    /// login attempt.
    pub fn new(config: GateConfig, provider: Arc<dyn OAuthProvider>) -> GateResult<Self> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    /// The active configuration
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Process one request
    ///
    /// Every expected failure is translated into a complete plain-text
    /// response here; nothing propagates to the caller.
    pub async fn process(&self, request: Request, next: Next) -> Response {
        let path = request.uri().path();

        if path == self.config.login_path {
            debug!(path, "handling oauth login");
            match self.do_login(request).await {
                Ok(response) => response,
                Err(err) => self.error_response(&err),
            }
        } else if path == self.config.callback_path {
            debug!(path, "handling oauth callback");
            match self.do_callback(request, next).await {
                Ok(response) => response,
                Err(err) => self.error_response(&err),
            }
        } else {
            next.run(request).await
        }
    }

    /// Acquire a request token and send the user to the provider
    async fn do_login(&self, request: Request) -> GateResult<Response> {
        let session = self.session(&request)?;
        let callback_url = self.callback_url(&request)?;
        debug!(%callback_url, "requesting temporary credential");

        let pending = self
            .provider
            .request_token(&callback_url)
            .await
            .map_err(|err| {
                warn!(error = %err, "request token acquisition failed");
                GateError::ProviderCredentials
            })?;
        // A provider that answers without a usable pair is as rejected as one
        // that errors outright.
        if pending.token.is_empty() || pending.secret.is_empty() {
            return Err(GateError::ProviderCredentials);
        }

        store_pending(&session, &pending).await?;

        redirect(&self.provider.authorize_url(&pending))
    }

    /// Validate the provider callback and finish the login
    async fn do_callback(&self, mut request: Request, next: Next) -> GateResult<Response> {
        let session = self.session(&request)?;

        let pending = load_pending(&session)
            .await?
            .ok_or(GateError::MissingPendingToken)?;
        let verifier = verifier_param(request.uri()).ok_or(GateError::MissingVerifier)?;

        let access = match self.provider.access_token(&pending, &verifier).await {
            Ok(access) => access,
            Err(ProviderError::Authorization) => return Err(GateError::ProviderAuthorization),
            Err(err) => {
                warn!(error = %err, "access token exchange failed");
                return Err(GateError::provider(err.to_string()));
            }
        };

        // The pending pair is single-use: drop it before the profile fetch or
        // downstream delegation can fail.
        clear_pending(&session).await?;

        match self.config.callback_policy {
            CallbackPolicy::RedirectWithProfile => {
                let profile = self
                    .provider
                    .verify_credentials(&access)
                    .await
                    .map_err(|err| {
                        warn!(error = %err, "account verification fetch failed");
                        GateError::provider(err.to_string())
                    })?;
                session.insert(&self.config.session_key, &profile).await?;
                debug!(session_key = %self.config.session_key, "stored verified account data");
                redirect(&self.config.redirect_to)
            }
            CallbackPolicy::DelegateWithTokens => {
                request.extensions_mut().insert(access);
                Ok(next.run(request).await)
            }
        }
    }

    /// The session attached to the request by the surrounding session layer
    fn session(&self, request: &Request) -> GateResult<Session> {
        request.extensions().get::<Session>().cloned().ok_or_else(|| {
            GateError::session(
                "request carries no session; install a tower_sessions::SessionManagerLayer \
                 outside this middleware",
            )
        })
    }

    /// Absolute callback URL for this request, from the Host header or the
    /// configured fallback
    fn callback_url(&self, request: &Request) -> GateResult<String> {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| self.config.server_name.clone())
            .ok_or_else(|| {
                GateError::internal("request has no Host header and no server_name is configured")
            })?;

        let base = Url::parse(&format!("http://{host}"))
            .map_err(|_| GateError::internal(format!("'{host}' is not a usable host")))?;
        let url = base.join(&self.config.callback_path).map_err(|_| {
            GateError::internal("callback_path does not join onto the request host")
        })?;
        Ok(url.to_string())
    }

    fn error_response(&self, err: &GateError) -> Response {
        warn!(error = %err, status = %err.status_code(), "oauth flow failed");
        plain_text(err.status_code(), &err.public_message())
    }
}

impl fmt::Debug for OAuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First non-empty `oauth_verifier` query parameter
fn verifier_param(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if name == "oauth_verifier" && !value.is_empty() {
            return Some(value.into_owned());
        }
    }
    None
}

/// Complete plain-text response with explicit content headers
fn plain_text(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(message.len()));
    response
}

/// Empty 302 response pointing at `location`
fn redirect(location: &str) -> GateResult<Response> {
    let location = HeaderValue::from_str(location).map_err(|_| {
        GateError::internal(format!("'{location}' is not a usable redirect target"))
    })?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AccessCredential, ProviderUrls, StaticProvider};
    use crate::session::{REQUEST_SECRET_KEY, REQUEST_TOKEN_KEY};
    use axum::{Extension, Router, middleware::from_fn, routing::get};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    fn test_config() -> GateConfig {
        GateConfig::new("key", "secret", "http://term.ie")
            .with_request_token_path("/oauth/example/request_token.php")
            .with_access_token_path("/oauth/example/access_token.php")
            .with_authorize_path("/oauth/example/authorize.php")
    }

    fn test_provider(config: &GateConfig) -> StaticProvider {
        StaticProvider::new(ProviderUrls::from_config(config).unwrap())
            .with_request_token("requestkey", "requestsecret")
            .with_expected_verifier("gotit")
            .with_access_token("someaccesstoken", "someaccesssecret")
            .with_profile(json!({"screen_name": "bob"}))
    }

    async fn dump_session(session: Session) -> String {
        let token: Option<String> = session.get(REQUEST_TOKEN_KEY).await.unwrap();
        let secret: Option<String> = session.get(REQUEST_SECRET_KEY).await.unwrap();
        let user: Option<Value> = session.get("oauth_user").await.unwrap();
        json!({"token": token, "secret": secret, "user": user}).to_string()
    }

    async fn show_tokens(Extension(access): Extension<AccessCredential>) -> String {
        format!("{}{}", access.token, access.secret)
    }

    fn app(gate: OAuthGate) -> Router {
        Router::new()
            .route("/", get(|| async { "foo" }))
            .route("/oauth_callback", get(show_tokens))
            .route("/session_dump", get(dump_session))
            .layer(from_fn(move |req, next| {
                let gate = gate.clone();
                async move { gate.process(req, next).await }
            }))
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false))
    }

    fn gate_with(config: GateConfig, provider: Arc<StaticProvider>) -> OAuthGate {
        OAuthGate::new(config, provider).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("response should carry a session cookie")
            .to_string()
    }

    #[tokio::test]
    async fn test_passthrough_for_other_paths() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "foo");
    }

    #[test]
    fn test_construction_requires_consumer_fields() {
        let config = GateConfig::default();
        let provider = Arc::new(test_provider(&test_config()));
        let err = OAuthGate::new(config, provider).unwrap_err();

        let text = err.to_string();
        assert!(text.contains("consumer_key is required"));
        assert!(text.contains("consumer_secret is required"));
        assert!(text.contains("consumer_site is required"));
    }

    #[tokio::test]
    async fn test_login_redirects_to_authorize_url() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider.clone()));

        let request = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://term.ie/oauth/example/authorize.php?oauth_token=requestkey"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(
            provider.calls().callback_urls,
            vec!["http://app.example.com/oauth_callback".to_string()]
        );

        // The pending pair is now waiting in the session for the callback.
        let cookie = session_cookie(&response);
        let dump = Request::builder()
            .uri("/session_dump")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let dump_response = app.oneshot(dump).await.unwrap();
        let state: Value = serde_json::from_str(&body_string(dump_response).await).unwrap();
        assert_eq!(state["token"], "requestkey");
        assert_eq!(state["secret"], "requestsecret");
    }

    #[tokio::test]
    async fn test_login_uses_server_name_fallback() {
        let config = test_config().with_server_name("fallback.example.com");
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider.clone()));

        let request = Request::builder()
            .uri("/oauth_login")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            provider.calls().callback_urls,
            vec!["http://fallback.example.com/oauth_callback".to_string()]
        );
    }

    #[tokio::test]
    async fn test_login_with_rejected_consumer_is_500() {
        let config = test_config();
        let provider =
            Arc::new(test_provider(&config).rejecting_consumer());
        let app = app(gate_with(config, provider));

        let request = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        let expected = "Whoa, OAuth was given the wrong consumer key or secret";
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok()),
            Some(expected.len().to_string().as_str())
        );
        assert_eq!(body_string(response).await, expected);
    }

    #[tokio::test]
    async fn test_callback_without_pending_pair_is_400() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let request = Request::builder()
            .uri("/oauth_callback?oauth_verifier=gotit")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("oauth_request_token"));
        assert!(body.contains("oauth_request_secret"));
    }

    #[tokio::test]
    async fn test_callback_without_verifier_is_400() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let login = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let login_response = app.clone().oneshot(login).await.unwrap();
        let cookie = session_cookie(&login_response);

        for uri in ["/oauth_callback", "/oauth_callback?oauth_verifier="] {
            let request = Request::builder()
                .uri(uri)
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(body_string(response).await.contains("verifier"));
        }
    }

    #[tokio::test]
    async fn test_callback_with_forged_verifier_is_401() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let login = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let login_response = app.clone().oneshot(login).await.unwrap();
        let cookie = session_cookie(&login_response);

        let request = Request::builder()
            .uri("/oauth_callback?oauth_verifier=forged")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "Someone's been forgin'!");
    }

    #[tokio::test]
    async fn test_callback_redirects_and_stores_profile() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let login = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let login_response = app.clone().oneshot(login).await.unwrap();
        let cookie = session_cookie(&login_response);

        let callback = Request::builder()
            .uri("/oauth_callback?oauth_verifier=gotit")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(callback).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/oauth_complete"
        );

        let dump = Request::builder()
            .uri("/session_dump")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let dump_response = app.oneshot(dump).await.unwrap();
        let state: Value = serde_json::from_str(&body_string(dump_response).await).unwrap();

        assert_eq!(state["token"], Value::Null);
        assert_eq!(state["secret"], Value::Null);
        assert_eq!(state["user"]["screen_name"], "bob");
    }

    #[tokio::test]
    async fn test_successful_callback_consumes_pending_pair() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let login = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let login_response = app.clone().oneshot(login).await.unwrap();
        let cookie = session_cookie(&login_response);

        let callback = Request::builder()
            .uri("/oauth_callback?oauth_verifier=gotit")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let first = app.clone().oneshot(callback).await.unwrap();
        assert_eq!(first.status(), StatusCode::FOUND);

        // The pair was deleted, so a replay is indistinguishable from a
        // callback that never logged in.
        let replay = Request::builder()
            .uri("/oauth_callback?oauth_verifier=gotit")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let second = app.oneshot(replay).await.unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delegate_policy_hands_tokens_to_inner_app() {
        let config = test_config().with_callback_policy(CallbackPolicy::DelegateWithTokens);
        let provider = Arc::new(test_provider(&config));
        let app = app(gate_with(config, provider));

        let login = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let login_response = app.clone().oneshot(login).await.unwrap();
        let cookie = session_cookie(&login_response);

        let callback = Request::builder()
            .uri("/oauth_callback?oauth_verifier=gotit")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(callback).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "someaccesstokensomeaccesssecret"
        );

        let dump = Request::builder()
            .uri("/session_dump")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let dump_response = app.oneshot(dump).await.unwrap();
        let state: Value = serde_json::from_str(&body_string(dump_response).await).unwrap();
        assert_eq!(state["token"], Value::Null);
        assert_eq!(state["secret"], Value::Null);
        assert_eq!(state["user"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_session_layer_is_500() {
        let config = test_config();
        let provider = Arc::new(test_provider(&config));
        let gate = gate_with(config, provider);

        // No SessionManagerLayer installed.
        let bare = Router::new()
            .route("/", get(|| async { "foo" }))
            .layer(from_fn(move |req, next| {
                let gate = gate.clone();
                async move { gate.process(req, next).await }
            }));

        let request = Request::builder()
            .uri("/oauth_login")
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = bare.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(response).await;
        assert!(!body.contains("SessionManagerLayer"), "internal detail leaked: {body}");
    }

    #[test]
    fn test_verifier_param_parsing() {
        let uri: Uri = "/oauth_callback?oauth_verifier=gotit".parse().unwrap();
        assert_eq!(verifier_param(&uri), Some("gotit".to_string()));

        let uri: Uri = "/oauth_callback?oauth_verifier=".parse().unwrap();
        assert_eq!(verifier_param(&uri), None);

        let uri: Uri = "/oauth_callback".parse().unwrap();
        assert_eq!(verifier_param(&uri), None);

        let uri: Uri = "/oauth_callback?oauth_verifier=got%20it".parse().unwrap();
        assert_eq!(verifier_param(&uri), Some("got it".to_string()));
    }
}
