//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across Parley. `SecretString` and
//! `SecretBox<T>` implement `Debug` with redaction, so a struct that derives
//! `Debug` while holding one cannot leak it through `{:?}` or tracing fields.
//! Values are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SocketCredentials {
//!     user_id: String,
//!     token: SecretString, // Debug shows "[REDACTED]"
//! }
//!
//! let creds = SocketCredentials {
//!     user_id: "u1".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{creds:?}").contains("eyJ"));
//! let raw: &str = creds.token.expose_secret();
//! assert!(raw.starts_with("eyJ"));
//! ```
//!
//! Use `SecretString` for:
//! - Identity tokens received on connect or on API requests
//! - The HS256 signing secret
//!
//! Use `SecretBox<T>` for binary key material.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("signing-key");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("signing-key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("token-value");
        assert_eq!(secret.expose_secret(), "token-value");
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ConnectParams {
            user_id: String,
            token: SecretString,
        }

        let json = r#"{"user_id": "u1", "token": "abc.def.ghi"}"#;
        let params: ConnectParams = serde_json::from_str(json).expect("deserialize");

        assert_eq!(params.token.expose_secret(), "abc.def.ghi");

        let debug = format!("{params:?}");
        assert!(debug.contains("u1"));
        assert!(!debug.contains("abc.def.ghi"));
    }
}
