//! Cost link configuration
//!
//! Upserting a link triggers cost recalculation synchronously. A
//! recalculation failure is reported as a warning next to the successful
//! link write — it never rolls the write back.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::costs::{CostLinkStore, ProductCostLink, RecalcSummary};
use crate::error::ServiceError;
use crate::state::AppState;
use shared::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CostLinkRequest {
    pub operation_id: Uuid,
    pub store_id: Uuid,
    pub sku: String,
    pub cost_price: Decimal,
    pub shipping_cost: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CostLinkResponse {
    pub link: ProductCostLink,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recalculation: Option<RecalcSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /api/cost-links
pub async fn upsert_cost_link(
    State(state): State<AppState>,
    Json(request): Json<CostLinkRequest>,
) -> Result<Json<CostLinkResponse>, AppError> {
    if request.sku.trim().is_empty() {
        return Err(AppError::validation("sku must not be empty"));
    }

    let link = state
        .cost_links
        .upsert(ProductCostLink {
            operation_id: request.operation_id,
            store_id: request.store_id,
            sku: request.sku,
            cost_price: request.cost_price,
            shipping_cost: request.shipping_cost,
            updated_at: Utc::now(),
        })
        .await
        .map_err(ServiceError::from)?;

    match state
        .costs
        .recalculate(link.operation_id, &link.sku)
        .await
    {
        Ok(summary) => Ok(Json(CostLinkResponse {
            link,
            recalculation: Some(summary),
            warning: None,
        })),
        Err(e) => {
            tracing::warn!(
                operation_id = %link.operation_id,
                sku = %link.sku,
                "Cost recalculation failed after link write: {e}"
            );
            Ok(Json(CostLinkResponse {
                link,
                recalculation: None,
                warning: Some(format!("cost link saved, recalculation failed: {e}")),
            }))
        }
    }
}
