//! Contact list handler.

use crate::collaborators::UserSummary;
use crate::errors::SignalError;
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use common::types::Identity;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/users
///
/// Returns every known user except the caller.
#[instrument(skip_all, name = "ss.handlers.list_users")]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Identity>,
) -> Result<Json<Vec<UserSummary>>, SignalError> {
    let users = state.directory.list_excluding(&caller).await?;
    Ok(Json(users))
}
