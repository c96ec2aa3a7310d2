//! # OAuth Gate
//!
//! Three-legged OAuth 1.0(a) login middleware for Axum applications.
//!
//! The gate sits in front of your application's router and intercepts two
//! well-known paths: a login path that acquires a request token and sends
//! the user to the provider, and a callback path that validates the
//! provider's answer and exchanges it for an access credential. Every other
//! request passes through untouched.
//!
//! ## Features
//!
//! - **Exact-path interception**: only the configured login and callback
//!   paths are handled; the wrapped application owns everything else
//! - **Fail-fast configuration**: missing consumer credentials abort at
//!   construction, each missing field named
//! - **Deterministic failure mapping**: every provider or protocol failure
//!   becomes a fixed, complete HTTP response
//! - **Pluggable provider client**: signature computation and HTTP transport
//!   live behind the [`OAuthProvider`] trait
//! - **Session-backed flow state**: the pending request token rides in the
//!   `tower_sessions` session between the two steps
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware::from_fn};
//! use oauth_gate::{GateConfig, ProviderUrls, StaticProvider};
//! use std::sync::Arc;
//! use tower_sessions::{MemoryStore, SessionManagerLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GateConfig::new("consumer-key", "consumer-secret", "https://api.twitter.com");
//!     let provider = Arc::new(StaticProvider::new(ProviderUrls::from_config(&config)?));
//!     let gate = config.create_gate(provider)?;
//!
//!     let app: Router = Router::new()
//!         .route("/", get(|| async { "Hello, logged-in world!" }))
//!         .layer(from_fn(move |req, next| {
//!             let gate = gate.clone();
//!             async move { gate.process(req, next).await }
//!         }))
//!         .layer(SessionManagerLayer::new(MemoryStore::default()));
//!
//!     // Serve `app`...
//!     Ok(())
//! }
//! ```
//!
//! A `SessionManagerLayer` must be installed *outside* the gate: the pending
//! request token rides in the request's session between the login and
//! callback steps.
//!
//! ## Environment Configuration
//!
//! ```bash
//! OAUTH_GATE_CONSUMER_KEY=...
//! OAUTH_GATE_CONSUMER_SECRET=...
//! OAUTH_GATE_CONSUMER_SITE=https://api.twitter.com
//!
//! # Optional overrides
//! OAUTH_GATE_LOGIN_PATH=/oauth_login
//! OAUTH_GATE_CALLBACK_PATH=/oauth_callback
//! OAUTH_GATE_REDIRECT_TO=/oauth_complete
//! OAUTH_GATE_SESSION_KEY=oauth_user
//! OAUTH_GATE_CALLBACK_POLICY=redirect
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod provider;
pub mod session;

// Re-export main types for convenience
pub use config::{CallbackPolicy, GateConfig};
pub use error::{GateError, GateResult};
pub use middleware::OAuthGate;
pub use provider::{
    AccessCredential, OAuthProvider, ProviderError, ProviderUrls, RequestToken, StaticProvider,
};
pub use session::{REQUEST_SECRET_KEY, REQUEST_TOKEN_KEY};

/// Version information for the middleware
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
