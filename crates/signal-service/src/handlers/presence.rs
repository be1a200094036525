//! Presence snapshot handler.

use crate::errors::SignalError;
use crate::routes::AppState;
use axum::{extract::State, Json};
use common::types::Identity;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/presence
///
/// Same payload as the `getOnlineUsers` event, for clients that poll.
#[instrument(skip_all, name = "ss.handlers.get_presence")]
pub async fn get_presence(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Identity>>, SignalError> {
    let online = state.hub.online_identities().await?;
    Ok(Json(online))
}
