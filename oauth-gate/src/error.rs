//! Error types for the OAuth gate

use axum::http::StatusCode;
use thiserror::Error;

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

/// Errors that can occur while driving the OAuth login flow
#[derive(Debug, Error)]
pub enum GateError {
    /// Required configuration is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider rejected the consumer key or secret at login
    #[error("Whoa, OAuth was given the wrong consumer key or secret")]
    ProviderCredentials,

    /// The session holds no pending request token pair
    #[error(
        "Your session didn't specify either a oauth_request_token or a oauth_request_secret; \
         start again from the login path"
    )]
    MissingPendingToken,

    /// The provider callback carried no usable verifier
    #[error(
        "The OAuth provider is not secure: it does not implement the oauth_verifier of OAuth 1.0a"
    )]
    MissingVerifier,

    /// The provider rejected the verifier or signature during token exchange
    #[error("Someone's been forgin'!")]
    ProviderAuthorization,

    /// The provider failed for a transport-class reason
    #[error("OAuth provider error: {0}")]
    Provider(String),

    /// The session layer is absent or failed
    #[error("session error: {0}")]
    Session(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Create a configuration error listing every missing or invalid field
    pub fn configuration<I, S>(problems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined = problems
            .into_iter()
            .map(|p| p.into())
            .collect::<Vec<_>>()
            .join(", ");
        Self::Configuration(joined)
    }

    /// Create a provider transport error
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a session error
    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::Session(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// The HTTP status this error is surfaced as
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ProviderCredentials => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingPendingToken | Self::MissingVerifier => StatusCode::BAD_REQUEST,
            Self::ProviderAuthorization => StatusCode::UNAUTHORIZED,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The response body shown to the client for this error
    ///
    /// Protocol errors carry their fixed, human-readable text; infrastructure
    /// errors are collapsed into a generic message so provider- or
    /// session-internal detail never leaks into a response.
    pub fn public_message(&self) -> String {
        match self {
            Self::ProviderCredentials
            | Self::MissingPendingToken
            | Self::MissingVerifier
            | Self::ProviderAuthorization => self.to_string(),
            Self::Provider(_) => "The OAuth provider returned an unexpected response".to_string(),
            Self::Configuration(_) | Self::Session(_) | Self::Internal(_) => {
                "OAuth login failed because of an internal error".to_string()
            }
        }
    }
}

impl From<tower_sessions::session::Error> for GateError {
    fn from(err: tower_sessions::session::Error) -> Self {
        GateError::Session(err.to_string())
    }
}
