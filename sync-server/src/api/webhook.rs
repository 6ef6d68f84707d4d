//! Inbound provider webhooks
//!
//! The route takes the raw body — signature verification needs the exact
//! bytes the provider signed, not a re-serialized JSON value.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::state::AppState;
use crate::webhooks::WebhookOutcome;
use shared::error::{AppError, ErrorCode};
use shared::provider::ProviderKind;

/// POST /api/webhooks/{provider}
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    let kind: ProviderKind = provider
        .parse()
        .map_err(|_| AppError::with_message(ErrorCode::NotFound, format!("unknown provider {provider}")))?;

    let outcome = state.webhooks.handle(kind, &headers, &body).await?;

    crate::db::audit::log(
        &state.pool,
        outcome.operation_id,
        "webhook_applied",
        Some(&serde_json::json!({
            "provider": kind,
            "order_id": outcome.order_id,
            "created": outcome.created,
        })),
    )
    .await;

    Ok(Json(outcome))
}
