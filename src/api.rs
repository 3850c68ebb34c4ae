//! HTTP API endpoints for state management.
//!
//! These endpoints are used by the host UI for exporting/importing poll state.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::state::export::StateExport;
use crate::state::{PollError, PollStore};

/// Export all polls and the current selection as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<PollStore>>) -> Json<StateExport> {
    Json(state.export_state().await)
}

/// Import a poll state snapshot.
///
/// POST /api/state/import
///
/// Replaces all polls and the selection with the imported data.
/// Connected clients receive the new state through the broadcast.
pub async fn import_state(
    State(state): State<Arc<PollStore>>,
    Json(export): Json<StateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e @ PollError::InvalidImport(_)) => {
            tracing::warn!("State import rejected: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Import failed: {}", e),
            )
                .into_response()
        }
    }
}
