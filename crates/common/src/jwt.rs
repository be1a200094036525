//! JWT utilities for Parley identity tokens.
//!
//! Identity tokens are HS256-signed JWTs carrying the user key in a `userId`
//! claim. This module provides:
//! - Size limits checked before any parsing
//! - Clock skew constants for `iat` validation
//! - The [`UserClaims`] structure with redacted `Debug`
//! - Signing and verification helpers shared by the service and its test tooling
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{verify_user_token, DEFAULT_CLOCK_SKEW};
//!
//! let claims = verify_user_token(token, secret.expose_secret().as_bytes(), DEFAULT_CLOCK_SKEW)?;
//! let identity = Identity::from(claims.user_id);
//! ```

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical identity tokens are a few hundred bytes. Anything larger is
/// rejected before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` timestamps more than this amount in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT validation.
///
/// Messages are generic on purpose; callers surface them to clients as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a valid HS256 JWT or its signature does not verify.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `exp` is in the past.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token verified but carries an empty `userId`.
    #[error("The access token is invalid or expired")]
    MissingUserId,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Identity token claims.
///
/// `userId` is the identity the signaling core routes on. It is redacted in
/// `Debug` output so claims can be traced without leaking user keys into
/// shared logs.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserClaims {
    /// User key (JSON `userId`)
    #[serde(rename = "userId")]
    pub user_id: String,

    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds); absent in some issuers' tokens
    #[serde(default)]
    pub iat: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("user_id", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl UserClaims {
    /// Claims for `user_id` valid for `lifetime` from now.
    #[must_use]
    pub fn new(user_id: impl Into<String>, lifetime: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        #[allow(clippy::cast_possible_wrap)]
        let lifetime_secs = lifetime.as_secs() as i64;
        Self {
            user_id: user_id.into(),
            exp: now.saturating_add(lifetime_secs),
            iat: now,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` when the limit is exceeded.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// A zero `iat` means the issuer omitted the claim and is accepted.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is beyond
/// `now + clock_skew`.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW at every call site
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Verify an HS256 identity token and return its claims.
///
/// Checks, in order: size, signature and `exp`, `iat` skew, non-empty `userId`.
///
/// # Errors
///
/// Returns the first [`JwtValidationError`] encountered.
pub fn verify_user_token(
    token: &str,
    secret: &[u8],
    clock_skew: Duration,
) -> Result<UserClaims, JwtValidationError> {
    check_token_size(token)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);

    let data = jsonwebtoken::decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token verification failed");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtValidationError::Expired,
            _ => JwtValidationError::MalformedToken,
        }
    })?;

    let claims = data.claims;
    validate_iat(claims.iat, clock_skew)?;

    if claims.user_id.trim().is_empty() {
        return Err(JwtValidationError::MissingUserId);
    }

    Ok(claims)
}

/// Sign claims as an HS256 identity token.
///
/// # Errors
///
/// Returns `JwtValidationError::MalformedToken` if the claims cannot be encoded.
pub fn sign_user_token(claims: &UserClaims, secret: &[u8]) -> Result<String, JwtValidationError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token signing failed");
        JwtValidationError::MalformedToken
    })
}
