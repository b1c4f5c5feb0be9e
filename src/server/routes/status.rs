//! Monitor status endpoint.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::engine::StatusSnapshot;
use crate::server::state::AppState;

/// GET /api/status - Current counters and queue/log sizes
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, StatusCode> {
    let ctx = state.ctx.clone();
    // Reads the persisted log from disk.
    tokio::task::spawn_blocking(move || ctx.snapshot())
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(?e, "Status snapshot task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
