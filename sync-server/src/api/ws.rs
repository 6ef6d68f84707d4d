//! WebSocket stream of run progress
//!
//! Pushes every committed session snapshot for one run to the client,
//! closing after the terminal snapshot. Lagging clients are resynced from
//! the latest snapshot instead of killed.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::sink::SinkExt;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::state::AppState;
use shared::error::{AppError, ErrorCode};

/// GET /api/sync/runs/{run_id}/ws — upgrade to WebSocket
pub async fn run_progress_ws(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    // Refuse the upgrade outright for unknown runs
    if state.sessions.get(run_id).is_none() {
        return Err(AppError::new(ErrorCode::RunNotFound));
    }
    Ok(ws.on_upgrade(move |socket| stream_progress(socket, state, run_id)))
}

async fn stream_progress(mut socket: WebSocket, state: AppState, run_id: Uuid) {
    let mut rx = state.sessions.subscribe();

    // Current snapshot first, so the client starts consistent
    let Some(current) = state.sessions.get(run_id) else {
        return;
    };
    let terminal = current.phase.is_terminal();
    if send_snapshot(&mut socket, &current).await.is_err() || terminal {
        let _ = socket.close().await;
        return;
    }

    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                if snapshot.run_id != run_id {
                    continue;
                }
                let terminal = snapshot.phase.is_terminal();
                if send_snapshot(&mut socket, &snapshot).await.is_err() {
                    return;
                }
                if terminal {
                    let _ = socket.close().await;
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(%run_id, skipped, "Progress subscriber lagged, resyncing");
                match state.sessions.get(run_id) {
                    Some(snapshot) => {
                        let terminal = snapshot.phase.is_terminal();
                        if send_snapshot(&mut socket, &snapshot).await.is_err() || terminal {
                            let _ = socket.close().await;
                            return;
                        }
                    }
                    None => {
                        let _ = socket.close().await;
                        return;
                    }
                }
            }
            Err(RecvError::Closed) => {
                let _ = socket.close().await;
                return;
            }
        }
    }
}

async fn send_snapshot(
    socket: &mut WebSocket,
    snapshot: &shared::sync::SyncSession,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(snapshot).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}
