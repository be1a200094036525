//! Authentication middleware for the REST API.
//!
//! Extracts the credential from the request, resolves it through the
//! `IdentityResolver`, and injects the resolved `Identity` into request
//! extensions.

use crate::errors::SignalError;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use common::secret::SecretString;
use common::types::Identity;
use std::sync::Arc;
use tracing::instrument;

/// Name of the session cookie set by the web client's login flow.
pub const SESSION_COOKIE: &str = "jwt";

/// Credential carried in the headers, if any.
///
/// `Authorization: Bearer` takes precedence over the `jwt` cookie.
pub fn header_credential(headers: &HeaderMap) -> Option<SecretString> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::from(t.to_string()))
}

fn cookie_token(headers: &HeaderMap) -> Option<SecretString> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| SecretString::from(value.to_string()))
}

/// Middleware that requires a resolvable credential.
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if the credential
///   is missing or rejected
/// - Continues to next handler with the `Identity` in extensions otherwise
#[instrument(skip_all, name = "ss.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, SignalError> {
    let token = header_credential(req.headers()).ok_or_else(|| {
        tracing::debug!(target: "ss.middleware.auth", "Missing credentials");
        SignalError::Unauthorized("Missing credentials".to_string())
    })?;

    let identity = state.resolver.resolve(&token).await?;
    remember_identity(&state, &identity).await;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Add a freshly resolved identity to the contact directory.
///
/// A directory failure is logged and never fails the request.
pub(crate) async fn remember_identity(state: &AppState, identity: &Identity) {
    if let Err(e) = state.directory.remember(identity).await {
        tracing::warn!(
            target: "ss.middleware.auth",
            identity = %identity,
            error = %e,
            "Failed to record identity in directory"
        );
    }
}
