//! Token and SDP fixtures.

use common::jwt::{sign_user_token, UserClaims};
use serde_json::{json, Value};
use std::time::Duration;

/// Secret the test server verifies tokens with.
pub const TEST_JWT_SECRET: &str = "signal-test-secret-0123456789abcdef";

/// A valid one-hour token for `user_id`.
pub fn test_token(user_id: &str) -> String {
    TestTokenBuilder::new().for_user(user_id).build()
}

/// A token for `user_id` that expired an hour ago.
pub fn expired_token(user_id: &str) -> String {
    TestTokenBuilder::new()
        .for_user(user_id)
        .expires_in(-3600)
        .build()
}

/// Builder for signed test tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(60)
///     .build();
/// ```
pub struct TestTokenBuilder {
    user_id: String,
    expires_in: i64,
    secret: String,
}

impl TestTokenBuilder {
    pub fn new() -> Self {
        Self {
            user_id: "test-user".to_string(),
            expires_in: 3600,
            secret: TEST_JWT_SECRET.to_string(),
        }
    }

    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    /// Seconds from now; negative for an already expired token.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }

    /// Sign with a different secret (for rejection tests).
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn build(self) -> String {
        let mut claims = UserClaims::new(self.user_id, Duration::ZERO);
        claims.exp = claims.iat + self.expires_in;
        sign_user_token(&claims, self.secret.as_bytes()).expect("failed to sign test token")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sample_offer() -> Value {
    json!({ "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n" })
}

pub fn sample_answer() -> Value {
    json!({ "type": "answer", "sdp": "v=0\r\no=- 3 4 IN IP4 127.0.0.1\r\n" })
}

pub fn sample_candidate(n: u32) -> Value {
    json!({
        "candidate": format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"),
        "sdpMid": "0",
        "sdpMLineIndex": 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::jwt::{verify_user_token, DEFAULT_CLOCK_SKEW, JwtValidationError};

    #[test]
    fn test_token_verifies_with_test_secret() {
        let claims =
            verify_user_token(&test_token("alice"), TEST_JWT_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW)
                .unwrap();
        assert_eq!(claims.user_id, "alice");
    }

    #[test]
    fn test_expired_token_rejected() {
        let result =
            verify_user_token(&expired_token("alice"), TEST_JWT_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW);
        assert!(matches!(result, Err(JwtValidationError::Expired)));
    }

    #[test]
    fn test_candidates_are_distinct() {
        assert_ne!(sample_candidate(1), sample_candidate(2));
    }
}
