//! Configuration for the OAuth gate

use crate::error::{GateError, GateResult};
use crate::middleware::OAuthGate;
use crate::provider::OAuthProvider;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// What the gate does once the callback has produced an access credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallbackPolicy {
    /// Fetch the account-verification document, store the decoded JSON in the
    /// session under the configured session key, and redirect to
    /// [`GateConfig::redirect_to`]
    #[default]
    RedirectWithProfile,

    /// Attach the access credential to the request and hand the request to
    /// the wrapped application
    DelegateWithTokens,
}

impl FromStr for CallbackPolicy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redirect" | "redirect_with_profile" => Ok(Self::RedirectWithProfile),
            "delegate" | "delegate_with_tokens" => Ok(Self::DelegateWithTokens),
            other => Err(GateError::configuration([format!(
                "unknown callback policy '{other}' (expected 'redirect' or 'delegate')"
            )])),
        }
    }
}

impl fmt::Display for CallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RedirectWithProfile => write!(f, "redirect"),
            Self::DelegateWithTokens => write!(f, "delegate"),
        }
    }
}

/// Gate configuration
///
/// Built once, validated once, immutable afterwards. The three consumer
/// fields are required; everything else has a sensible default.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Path that initiates the OAuth flow
    pub login_path: String,

    /// Path the provider redirects back to after user authorization
    pub callback_path: String,

    /// Where to send the user after a completed login (redirect policy only)
    pub redirect_to: String,

    /// Session key under which verified account data is stored
    pub session_key: String,

    /// Consumer key registered with the OAuth provider
    pub consumer_key: String,

    /// Consumer secret registered with the OAuth provider
    pub consumer_secret: String,

    /// Base site of the OAuth provider, e.g. `https://api.twitter.com`
    pub consumer_site: String,

    /// Override for the provider's request-token path
    pub request_token_path: Option<String>,

    /// Override for the provider's access-token path
    pub access_token_path: Option<String>,

    /// Override for the provider's user-authorization path
    pub authorize_path: Option<String>,

    /// Fallback host used to build the callback URL when the request carries
    /// no `Host` header
    pub server_name: Option<String>,

    /// What happens after a successful callback
    pub callback_policy: CallbackPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/oauth_login".to_string(),
            callback_path: "/oauth_callback".to_string(),
            redirect_to: "/oauth_complete".to_string(),
            session_key: "oauth_user".to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            consumer_site: String::new(),
            request_token_path: None,
            access_token_path: None,
            authorize_path: None,
            server_name: None,
            callback_policy: CallbackPolicy::default(),
        }
    }
}

impl GateConfig {
    /// Create a configuration with the required consumer credentials and
    /// defaults for everything else
    pub fn new<K, S, T>(consumer_key: K, consumer_secret: S, consumer_site: T) -> Self
    where
        K: Into<String>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            consumer_site: consumer_site.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from `OAUTH_GATE_*` environment variables
    pub fn from_env() -> GateResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("OAUTH_GATE_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Ok(path) = env::var("OAUTH_GATE_CALLBACK_PATH") {
            config.callback_path = path;
        }
        if let Ok(target) = env::var("OAUTH_GATE_REDIRECT_TO") {
            config.redirect_to = target;
        }
        if let Ok(key) = env::var("OAUTH_GATE_SESSION_KEY") {
            config.session_key = key;
        }
        if let Ok(key) = env::var("OAUTH_GATE_CONSUMER_KEY") {
            config.consumer_key = key;
        }
        if let Ok(secret) = env::var("OAUTH_GATE_CONSUMER_SECRET") {
            config.consumer_secret = secret;
        }
        if let Ok(site) = env::var("OAUTH_GATE_CONSUMER_SITE") {
            config.consumer_site = site;
        }
        if let Ok(path) = env::var("OAUTH_GATE_REQUEST_TOKEN_PATH") {
            config.request_token_path = Some(path);
        }
        if let Ok(path) = env::var("OAUTH_GATE_ACCESS_TOKEN_PATH") {
            config.access_token_path = Some(path);
        }
        if let Ok(path) = env::var("OAUTH_GATE_AUTHORIZE_PATH") {
            config.authorize_path = Some(path);
        }
        if let Ok(host) = env::var("OAUTH_GATE_SERVER_NAME") {
            config.server_name = Some(host);
        }
        if let Ok(policy) = env::var("OAUTH_GATE_CALLBACK_POLICY") {
            config.callback_policy = policy.parse()?;
        }

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Every problem is collected so a misconfigured deployment reports all
    /// missing fields at once instead of one per restart.
    pub fn validate(&self) -> GateResult<()> {
        let mut problems = Vec::new();

        if self.consumer_key.is_empty() {
            problems.push("consumer_key is required".to_string());
        }
        if self.consumer_secret.is_empty() {
            problems.push("consumer_secret is required".to_string());
        }
        if self.consumer_site.is_empty() {
            problems.push("consumer_site is required".to_string());
        } else {
            match Url::parse(&self.consumer_site) {
                Ok(url) if !url.cannot_be_a_base() => {}
                _ => problems.push("consumer_site must be an absolute URL".to_string()),
            }
        }
        if !self.login_path.starts_with('/') {
            problems.push("login_path must begin with '/'".to_string());
        }
        if !self.callback_path.starts_with('/') {
            problems.push("callback_path must begin with '/'".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GateError::configuration(problems))
        }
    }

    /// Validate this configuration and build the middleware around the given
    /// provider client
    pub fn create_gate(self, provider: Arc<dyn OAuthProvider>) -> GateResult<OAuthGate> {
        OAuthGate::new(self, provider)
    }

    /// Set the login path
    pub fn with_login_path<S: Into<String>>(mut self, path: S) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the callback path
    pub fn with_callback_path<S: Into<String>>(mut self, path: S) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Set the post-login redirect target
    pub fn with_redirect_to<S: Into<String>>(mut self, target: S) -> Self {
        self.redirect_to = target.into();
        self
    }

    /// Set the session key for verified account data
    pub fn with_session_key<S: Into<String>>(mut self, key: S) -> Self {
        self.session_key = key.into();
        self
    }

    /// Override the provider's request-token path
    pub fn with_request_token_path<S: Into<String>>(mut self, path: S) -> Self {
        self.request_token_path = Some(path.into());
        self
    }

    /// Override the provider's access-token path
    pub fn with_access_token_path<S: Into<String>>(mut self, path: S) -> Self {
        self.access_token_path = Some(path.into());
        self
    }

    /// Override the provider's user-authorization path
    pub fn with_authorize_path<S: Into<String>>(mut self, path: S) -> Self {
        self.authorize_path = Some(path.into());
        self
    }

    /// Set the fallback host for callback-URL construction
    pub fn with_server_name<S: Into<String>>(mut self, host: S) -> Self {
        self.server_name = Some(host.into());
        self
    }

    /// Set the callback policy
    pub fn with_callback_policy(mut self, policy: CallbackPolicy) -> Self {
        self.callback_policy = policy;
        self
    }
}
