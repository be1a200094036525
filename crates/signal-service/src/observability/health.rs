//! Health endpoints for the Signal Service.
//!
//! - `GET /health` - Liveness: the hub actor is still running
//! - `GET /ready` - Readiness: startup finished and the hub answers a status
//!   query while still accepting connections
//!
//! `/metrics` is merged onto the same listener by `main` from the Prometheus
//! exporter handle.

use crate::actors::{HubStatus, SignalingHubHandle};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long `/ready` waits for the hub before calling it unresponsive.
pub const HUB_STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// State behind `/health` and `/ready`.
#[derive(Debug)]
pub struct HealthState {
    /// Flipped on once the API listener is bound, off again on shutdown.
    started: AtomicBool,
    hub: SignalingHubHandle,
}

impl HealthState {
    /// Health state backed by `hub`; not ready until [`HealthState::set_ready`].
    #[must_use]
    pub fn new(hub: SignalingHubHandle) -> Self {
        Self {
            started: AtomicBool::new(false),
            hub,
        }
    }

    pub fn set_ready(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Mark not ready so load balancers stop routing new sockets here.
    pub fn set_not_ready(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.hub.is_cancelled()
    }

    /// Ask the hub whether it can take new connections.
    pub async fn check_hub(&self) -> Result<HubStatus, NotReady> {
        match tokio::time::timeout(HUB_STATUS_TIMEOUT, self.hub.get_status()).await {
            Ok(Ok(status)) if status.accepting_new => Ok(status),
            Ok(Ok(_)) => Err(NotReady::Draining),
            Ok(Err(e)) => {
                debug!(target: "ss.health", error = %e, "Hub status query failed");
                Err(NotReady::HubStopped)
            }
            Err(_) => Err(NotReady::HubUnresponsive),
        }
    }
}

/// Why `/ready` answered 503.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReady {
    Starting,
    Draining,
    HubStopped,
    HubUnresponsive,
}

/// Body of `GET /ready`.
#[derive(Debug, Serialize)]
struct Readiness {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<NotReady>,
    #[serde(skip_serializing_if = "Option::is_none")]
    open_connections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    online_identities: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_calls: Option<usize>,
}

impl Readiness {
    fn ready(status: &HubStatus) -> Self {
        Self {
            status: "ready",
            reason: None,
            open_connections: Some(status.open_connections),
            online_identities: Some(status.online_identities),
            active_calls: Some(status.active_calls),
        }
    }

    fn not_ready(reason: NotReady) -> Self {
        Self {
            status: "not_ready",
            reason: Some(reason),
            open_connections: None,
            online_identities: None,
            active_calls: None,
        }
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<Readiness>) {
    if !state.is_started() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness::not_ready(NotReady::Starting)),
        );
    }

    match state.check_hub().await {
        Ok(status) => (StatusCode::OK, Json(Readiness::ready(&status))),
        Err(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness::not_ready(reason)),
        ),
    }
}
