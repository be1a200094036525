//! Identity resolution for connection and request credentials.
//!
//! # Security
//!
//! - Tokens travel as `SecretString` and are never logged
//! - Oversized tokens are rejected before parsing
//! - Only HS256 is accepted
//! - Failures surface a generic message to clients

use crate::errors::SignalError;
use common::jwt::{verify_user_token, DEFAULT_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use common::types::Identity;
use tracing::instrument;

/// Resolves an opaque credential into the identity it authenticates.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `token` to an identity.
    ///
    /// Returns `SignalError::Unauthorized` when the credential is rejected.
    async fn resolve(&self, token: &SecretString) -> Result<Identity, SignalError>;
}

/// Resolves HS256 JWTs carrying a `userId` claim.
pub struct JwtIdentityResolver {
    secret: SecretString,
}

impl JwtIdentityResolver {
    /// Create a resolver for tokens signed with `secret`.
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for JwtIdentityResolver {
    #[instrument(skip_all, name = "ss.auth.resolve")]
    async fn resolve(&self, token: &SecretString) -> Result<Identity, SignalError> {
        let claims = verify_user_token(
            token.expose_secret(),
            self.secret.expose_secret().as_bytes(),
            DEFAULT_CLOCK_SKEW,
        )
        .map_err(|e| {
            tracing::debug!(target: "ss.auth", reason = ?e, "Token rejected");
            SignalError::from(e)
        })?;

        Ok(Identity::from(claims.user_id))
    }
}

/// Mock identity resolver for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    /// Resolver backed by a fixed token → identity table.
    #[derive(Default)]
    pub struct MockIdentityResolver {
        tokens: HashMap<String, Identity>,
    }

    impl MockIdentityResolver {
        /// Create an empty resolver that rejects everything.
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` as `identity`.
        #[must_use]
        pub fn with_token(mut self, token: &str, identity: &str) -> Self {
            self.tokens
                .insert(token.to_string(), Identity::from(identity));
            self
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for MockIdentityResolver {
        async fn resolve(&self, token: &SecretString) -> Result<Identity, SignalError> {
            self.tokens
                .get(token.expose_secret())
                .cloned()
                .ok_or_else(|| SignalError::Unauthorized("unknown token".to_string()))
        }
    }
}
