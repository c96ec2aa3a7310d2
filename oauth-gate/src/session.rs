//! Pending request-token storage in the caller's session
//!
//! The pair lives under two fixed keys between the login step and the
//! callback step, distinct from the configurable key that holds verified
//! account data.

use crate::error::GateResult;
use crate::provider::RequestToken;
use tower_sessions::Session;

/// Session key holding the pending request token
pub const REQUEST_TOKEN_KEY: &str = "oauth_request_token";

/// Session key holding the pending request secret
pub const REQUEST_SECRET_KEY: &str = "oauth_request_secret";

/// Store the pending pair issued by the provider
pub(crate) async fn store_pending(session: &Session, pending: &RequestToken) -> GateResult<()> {
    session.insert(REQUEST_TOKEN_KEY, &pending.token).await?;
    session.insert(REQUEST_SECRET_KEY, &pending.secret).await?;
    Ok(())
}

/// Read the pending pair; `None` unless both keys are present
pub(crate) async fn load_pending(session: &Session) -> GateResult<Option<RequestToken>> {
    let token = session.get::<String>(REQUEST_TOKEN_KEY).await?;
    let secret = session.get::<String>(REQUEST_SECRET_KEY).await?;

    match (token, secret) {
        (Some(token), Some(secret)) => Ok(Some(RequestToken { token, secret })),
        _ => Ok(None),
    }
}

/// Remove the pending pair
///
/// Both removes run before an error is surfaced so the pair is never left
/// half-deleted.
pub(crate) async fn clear_pending(session: &Session) -> GateResult<()> {
    let token = session.remove::<String>(REQUEST_TOKEN_KEY).await;
    let secret = session.remove::<String>(REQUEST_SECRET_KEY).await;
    token?;
    secret?;
    Ok(())
}
