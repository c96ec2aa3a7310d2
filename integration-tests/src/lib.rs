//! Integration tests for the OAuth gate middleware
//!
//! These tests wire the gate into an axum router with a real session layer
//! and drive the login/callback flow with cookie round trips, the way a
//! deployment would see it.

#![allow(unused_imports)] // Allow unused imports in integration tests

pub mod login_callback_flow;

/// Common test utilities for integration tests
pub mod test_utils {
    use axum::{Router, body::Body, extract::Request, middleware::from_fn, response::Response};
    use oauth_gate::OAuthGate;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    /// Wrap an inner router with the gate and a fresh in-memory session layer
    pub fn gated_app(gate: OAuthGate, inner: Router) -> Router {
        inner
            .layer(from_fn(move |req, next| {
                let gate = gate.clone();
                async move { gate.process(req, next).await }
            }))
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false))
    }

    /// GET a path, optionally replaying a session cookie
    pub async fn fetch(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri).header("host", "app.example.com");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let request = builder.body(Body::empty()).expect("request should build");
        app.clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// The session cookie a response set, if any
    pub fn cookie_of(response: &Response) -> Option<String> {
        response
            .headers()
            .get("set-cookie")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Collect a response body into a string
    pub async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
    }
}
