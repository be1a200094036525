//! Signal Service configuration.
//!
//! Configuration is loaded from environment variables. The token secret is
//! redacted in Debug output.

use common::secret::SecretString;
use common::types::Identity;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket + REST bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default ring timeout in seconds.
pub const DEFAULT_CALL_RING_TIMEOUT_SECONDS: u64 = 30;

/// Default connection mailbox capacity.
pub const DEFAULT_CONNECTION_BUFFER: usize = 200;

/// Default CORS origin (the web client's dev server).
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "ss";

/// Signal Service configuration.
#[derive(Clone)]
pub struct Config {
    /// HS256 secret for identity tokens.
    pub jwt_secret: SecretString,

    /// WebSocket + REST bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Health/metrics bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// How long an unanswered call rings before it is ended.
    pub call_ring_timeout: Duration,

    /// Refuse offers when either party already has a non-ended call.
    pub exclusive_calls: bool,

    /// Accept `?userId=` and unauthenticated `register` (development only).
    pub allow_anonymous_identity: bool,

    /// Capacity of each connection actor's mailbox.
    pub connection_buffer: usize,

    /// CORS origins allowed to call the REST API.
    pub allowed_origins: Vec<String>,

    /// Identities seeded into the in-memory user directory.
    pub directory_users: Vec<Identity>,

    /// Unique identifier for this instance.
    pub instance_id: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("call_ring_timeout", &self.call_ring_timeout)
            .field("exclusive_calls", &self.exclusive_calls)
            .field("allow_anonymous_identity", &self.allow_anonymous_identity)
            .field("connection_buffer", &self.connection_buffer)
            .field("allowed_origins", &self.allowed_origins)
            .field("directory_users", &self.directory_users.len())
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = vars
            .get("SS_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SS_JWT_SECRET".to_string()))?;
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let bind_address = vars
            .get("SS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SS_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let ring_timeout_seconds: u64 = parse_or_default(
            vars,
            "SS_CALL_RING_TIMEOUT_SECONDS",
            DEFAULT_CALL_RING_TIMEOUT_SECONDS,
        )?;
        if ring_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SS_CALL_RING_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let exclusive_calls = parse_bool(vars, "SS_EXCLUSIVE_CALLS", true)?;
        let allow_anonymous_identity = parse_bool(vars, "SS_ALLOW_ANONYMOUS_IDENTITY", false)?;

        let connection_buffer: usize =
            parse_or_default(vars, "SS_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;
        if connection_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "SS_CONNECTION_BUFFER must be greater than 0".to_string(),
            ));
        }

        let allowed_origins = vars
            .get("SS_ALLOWED_ORIGINS")
            .map_or(DEFAULT_ALLOWED_ORIGINS, String::as_str)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let directory_users = vars
            .get("SS_DIRECTORY_USERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Identity::from)
                    .collect()
            })
            .unwrap_or_default();

        let instance_id = vars.get("SS_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            jwt_secret,
            bind_address,
            health_bind_address,
            call_ring_timeout: Duration::from_secs(ring_timeout_seconds),
            exclusive_calls,
            allow_anonymous_identity,
            connection_buffer,
            allowed_origins,
            directory_users,
            instance_id,
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw} is not a valid number"))),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{key}={v} is not a boolean"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("SS_JWT_SECRET".to_string(), "test-secret".to_string())])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.jwt_secret.expose_secret(), "test-secret");
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.call_ring_timeout, Duration::from_secs(30));
        assert!(config.exclusive_calls);
        assert!(!config.allow_anonymous_identity);
        assert_eq!(config.connection_buffer, DEFAULT_CONNECTION_BUFFER);
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert!(config.directory_users.is_empty());
        assert!(config.instance_id.starts_with("ss-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("SS_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("SS_CALL_RING_TIMEOUT_SECONDS".to_string(), "5".to_string());
        vars.insert("SS_EXCLUSIVE_CALLS".to_string(), "false".to_string());
        vars.insert("SS_ALLOW_ANONYMOUS_IDENTITY".to_string(), "1".to_string());
        vars.insert("SS_CONNECTION_BUFFER".to_string(), "16".to_string());
        vars.insert(
            "SS_ALLOWED_ORIGINS".to_string(),
            "https://a.example, https://b.example".to_string(),
        );
        vars.insert("SS_DIRECTORY_USERS".to_string(), "u1,u2, u3".to_string());
        vars.insert("SS_INSTANCE_ID".to_string(), "ss-test-1".to_string());

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.call_ring_timeout, Duration::from_secs(5));
        assert!(!config.exclusive_calls);
        assert!(config.allow_anonymous_identity);
        assert_eq!(config.connection_buffer, 16);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            config.directory_users,
            vec![Identity::from("u1"), Identity::from("u2"), Identity::from("u3")]
        );
        assert_eq!(config.instance_id, "ss-test-1");
    }

    #[test]
    fn test_missing_jwt_secret() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SS_JWT_SECRET"));
    }

    #[test]
    fn test_empty_jwt_secret_is_missing() {
        let vars = HashMap::from([("SS_JWT_SECRET".to_string(), String::new())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_zero_ring_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("SS_CALL_RING_TIMEOUT_SECONDS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_non_numeric_ring_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("SS_CALL_RING_TIMEOUT_SECONDS".to_string(), "soon".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_connection_buffer_rejected() {
        let mut vars = base_vars();
        vars.insert("SS_CONNECTION_BUFFER".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut vars = base_vars();
        vars.insert("SS_EXCLUSIVE_CALLS".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test-secret"));
    }
}
