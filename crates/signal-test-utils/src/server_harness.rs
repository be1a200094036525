//! Test server harness for E2E testing
//!
//! Provides `TestSignalServer` for spawning real Signal Service instances in tests.

use crate::fixtures::{test_token, TEST_JWT_SECRET};
use signal_service::actors::{ActorMetrics, HubSettings, SignalingHubHandle};
use signal_service::config::Config;
use signal_service::routes::{build_routes, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Signal Service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_presence_flow() -> Result<(), anyhow::Error> {
///     let server = TestSignalServer::spawn().await?;
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/presence", server.url()))
///         .bearer_auth(server.token_for("alice"))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSignalServer {
    addr: SocketAddr,
    config: Config,
    hub: SignalingHubHandle,
    _handle: JoinHandle<()>,
}

impl TestSignalServer {
    /// Spawn a server with the default test configuration.
    ///
    /// The directory is seeded with `alice`, `bob` and `carol`.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[]).await
    }

    /// Spawn a server with extra `SS_*` variables layered over the defaults.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("SS_JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
            ("SS_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "SS_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:0".to_string(),
            ),
            (
                "SS_DIRECTORY_USERS".to_string(),
                "alice,bob,carol".to_string(),
            ),
            ("SS_INSTANCE_ID".to_string(), "ss-test".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let hub = SignalingHubHandle::new(HubSettings::from_config(&config), ActorMetrics::new());
        let state = Arc::new(AppState::from_config(&config, hub.clone()));
        let app = build_routes(state, &config.allowed_origins);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            hub,
            _handle: handle,
        })
    }

    /// Base HTTP URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL of the `/socket` endpoint, without query.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle to the running hub, for status checks.
    pub fn hub(&self) -> &SignalingHubHandle {
        &self.hub
    }

    /// A valid token for `user_id`, signed with the server's secret.
    pub fn token_for(&self, user_id: &str) -> String {
        test_token(user_id)
    }
}

impl Drop for TestSignalServer {
    fn drop(&mut self) {
        self._handle.abort();
        self.hub.cancel();
    }
}
