//! Sync control handlers

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::state::AppState;
use crate::sync::{RunArchive, SyncMode, SyncRequest};
use shared::error::{AppError, ErrorCode};
use shared::sync::SyncSession;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub operation_id: Uuid,
    #[serde(default)]
    pub mode: SyncMode,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: Uuid,
}

/// POST /api/sync — start a run, return its id immediately.
///
/// 409 when the operation already has an active run.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<TriggerResponse>, AppError> {
    let since = match request.mode {
        SyncMode::Full => None,
        SyncMode::Incremental => state
            .archive
            .last_completed_at(request.operation_id)
            .await
            .map_err(ServiceError::from)?,
    };

    let run_id = state.orchestrator.clone().trigger(SyncRequest {
        operation_id: request.operation_id,
        mode: request.mode,
        max_pages: request.max_pages,
        since,
    })?;

    Ok(Json(TriggerResponse { run_id }))
}

/// GET /api/sync/runs/{run_id} — latest session snapshot.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<SyncSession>, AppError> {
    state
        .sessions
        .get(run_id)
        .map(Json)
        .ok_or_else(|| AppError::new(ErrorCode::RunNotFound))
}

/// POST /api/sync/operations/{operation_id}/cancel — stop the active run.
///
/// Takes effect at the next page/batch boundary, never mid-page.
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> Result<Json<shared::error::ApiResponse<()>>, AppError> {
    if state.orchestrator.cancel(operation_id) {
        Ok(Json(shared::error::ApiResponse::ok()))
    } else {
        Err(AppError::new(ErrorCode::RunNotFound))
    }
}
