//! Provider client contract and the in-memory implementation

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use url::Url;

/// Default provider path for temporary-credential requests
pub const DEFAULT_REQUEST_TOKEN_PATH: &str = "/oauth/request_token";

/// Default provider path for access-token exchange
pub const DEFAULT_ACCESS_TOKEN_PATH: &str = "/oauth/access_token";

/// Default provider path for user authorization
pub const DEFAULT_AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Errors reported by a provider client
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the consumer key or secret
    #[error("provider rejected the consumer credentials")]
    Credentials,

    /// The provider rejected the verifier or request signature
    #[error("provider rejected the verifier or signature")]
    Authorization,

    /// The provider could not be reached or answered unexpectedly
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}

/// Temporary credential pair issued at the start of the flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    /// The request token
    pub token: String,
    /// The request token secret
    pub secret: String,
}

impl RequestToken {
    /// Create a request token pair
    pub fn new<T: Into<String>, S: Into<String>>(token: T, secret: S) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

/// Authorized credential pair returned after verifier exchange
///
/// In delegate mode this is inserted into the request's extensions for the
/// wrapped application to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredential {
    /// The access token
    pub token: String,
    /// The access token secret
    pub secret: String,
}

impl AccessCredential {
    /// Create an access credential pair
    pub fn new<T: Into<String>, S: Into<String>>(token: T, secret: S) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

/// Provider endpoint URLs resolved from a [`GateConfig`]
#[derive(Debug, Clone)]
pub struct ProviderUrls {
    /// Temporary-credential request endpoint
    pub request_token: String,
    /// Access-token exchange endpoint
    pub access_token: String,
    /// User-authorization endpoint
    pub authorize: String,
}

impl ProviderUrls {
    /// Resolve the provider endpoints from the configured site and optional
    /// path overrides
    pub fn from_config(config: &GateConfig) -> GateResult<Self> {
        let site = Url::parse(&config.consumer_site)
            .map_err(|_| GateError::configuration(["consumer_site must be an absolute URL"]))?;

        let join = |path: &str| -> GateResult<String> {
            site.join(path).map(|url| url.to_string()).map_err(|_| {
                GateError::configuration([format!("'{path}' is not a valid provider path")])
            })
        };

        Ok(Self {
            request_token: join(
                config
                    .request_token_path
                    .as_deref()
                    .unwrap_or(DEFAULT_REQUEST_TOKEN_PATH),
            )?,
            access_token: join(
                config
                    .access_token_path
                    .as_deref()
                    .unwrap_or(DEFAULT_ACCESS_TOKEN_PATH),
            )?,
            authorize: join(
                config
                    .authorize_path
                    .as_deref()
                    .unwrap_or(DEFAULT_AUTHORIZE_PATH),
            )?,
        })
    }
}

/// Signing/transport client for an OAuth 1.0(a) provider
///
/// Implementations own signature computation and HTTP transport; the gate
/// only drives the protocol state machine through this interface. One client
/// instance is shared across all requests handled by a gate, so
/// implementations must be safe for concurrent read-mostly use.
#[async_trait]
pub trait OAuthProvider: Send + Sync + 'static {
    /// Ask the provider for a temporary credential, passing `callback_url`
    /// as the `oauth_callback` parameter
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, ProviderError>;

    /// The user-authorization URL for a previously issued request token
    fn authorize_url(&self, token: &RequestToken) -> String;

    /// Exchange an authorized request token plus verifier for an access
    /// credential
    async fn access_token(
        &self,
        pending: &RequestToken,
        verifier: &str,
    ) -> Result<AccessCredential, ProviderError>;

    /// Fetch the account-verification document for an access credential
    async fn verify_credentials(
        &self,
        credential: &AccessCredential,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Calls a [`StaticProvider`] has served, in order
#[derive(Debug, Clone, Default)]
pub struct ProviderCalls {
    /// Callback URLs passed to `request_token`
    pub callback_urls: Vec<String>,
    /// Verifiers passed to `access_token`
    pub verifiers: Vec<String>,
}

/// In-memory provider stub for tests and local wiring
///
/// Issues a fixed request token, accepts a fixed verifier, and returns a
/// fixed access credential and profile document. Records the callback URLs
/// and verifiers it is handed so tests can assert on them.
pub struct StaticProvider {
    urls: ProviderUrls,
    issued: Option<RequestToken>,
    expected_verifier: Option<String>,
    access: AccessCredential,
    profile: serde_json::Value,
    calls: Mutex<ProviderCalls>,
}

impl StaticProvider {
    /// Create a provider that issues a default request token and accepts any
    /// non-empty verifier
    pub fn new(urls: ProviderUrls) -> Self {
        Self {
            urls,
            issued: Some(RequestToken::new("request-token", "request-secret")),
            expected_verifier: None,
            access: AccessCredential::new("access-token", "access-secret"),
            profile: serde_json::Value::Null,
            calls: Mutex::new(ProviderCalls::default()),
        }
    }

    /// Set the request token pair this provider issues
    pub fn with_request_token<T: Into<String>, S: Into<String>>(
        mut self,
        token: T,
        secret: S,
    ) -> Self {
        self.issued = Some(RequestToken::new(token, secret));
        self
    }

    /// Reject token issuance, as a provider does for a bad consumer key or
    /// secret
    pub fn rejecting_consumer(mut self) -> Self {
        self.issued = None;
        self
    }

    /// Only accept this verifier during token exchange
    pub fn with_expected_verifier<S: Into<String>>(mut self, verifier: S) -> Self {
        self.expected_verifier = Some(verifier.into());
        self
    }

    /// Set the access credential pair returned after exchange
    pub fn with_access_token<T: Into<String>, S: Into<String>>(
        mut self,
        token: T,
        secret: S,
    ) -> Self {
        self.access = AccessCredential::new(token, secret);
        self
    }

    /// Set the account-verification document
    pub fn with_profile(mut self, profile: serde_json::Value) -> Self {
        self.profile = profile;
        self
    }

    /// A snapshot of the calls served so far
    pub fn calls(&self) -> ProviderCalls {
        self.calls.lock().expect("provider call log poisoned").clone()
    }
}

#[async_trait]
impl OAuthProvider for StaticProvider {
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, ProviderError> {
        self.calls
            .lock()
            .expect("provider call log poisoned")
            .callback_urls
            .push(callback_url.to_string());

        match &self.issued {
            Some(token) => Ok(token.clone()),
            None => Err(ProviderError::Credentials),
        }
    }

    fn authorize_url(&self, token: &RequestToken) -> String {
        match Url::parse(&self.urls.authorize) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("oauth_token", &token.token);
                url.to_string()
            }
            Err(_) => self.urls.authorize.clone(),
        }
    }

    async fn access_token(
        &self,
        pending: &RequestToken,
        verifier: &str,
    ) -> Result<AccessCredential, ProviderError> {
        self.calls
            .lock()
            .expect("provider call log poisoned")
            .verifiers
            .push(verifier.to_string());

        let issued = self.issued.as_ref().ok_or(ProviderError::Authorization)?;
        if pending.token != issued.token || pending.secret != issued.secret {
            return Err(ProviderError::Authorization);
        }
        if let Some(expected) = &self.expected_verifier {
            if verifier != expected {
                return Err(ProviderError::Authorization);
            }
        }

        Ok(self.access.clone())
    }

    async fn verify_credentials(
        &self,
        _credential: &AccessCredential,
    ) -> Result<serde_json::Value, ProviderError> {
        Ok(self.profile.clone())
    }
}
