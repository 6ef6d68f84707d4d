//! Staging: raw provider records become canonical ledger rows
//!
//! The single write path shared by the sync orchestrator and the webhook
//! processor. Both go through the same mapper, the same idempotent upsert
//! key and the same cost gating, so interleaved webhook and poll updates
//! converge to the same row.

use chrono::Utc;
use uuid::Uuid;

use crate::costs::{CostLinkStore, CostTable};
use crate::error::SyncError;
use crate::ledger::OrderLedger;
use crate::mapper;
use crate::providers::RawOrderRecord;
use shared::order::Order;

/// Result of staging one record.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub order: Order,
    pub created: bool,
}

/// Map and upsert one raw record for an operation.
///
/// Costs are derived twice when needed: once for the candidate, and again
/// when the merge produced a different status or SKU set than the candidate
/// carried (e.g. a stale page against an already-delivered row).
pub async fn stage_record(
    ledger: &dyn OrderLedger,
    cost_links: &dyn CostLinkStore,
    operation_id: Uuid,
    store_id: Uuid,
    record: &RawOrderRecord,
) -> Result<StageOutcome, SyncError> {
    let now = Utc::now();
    let mut candidate = mapper::map(record, operation_id, store_id, now);

    let links = cost_links
        .links_for_skus(operation_id, &candidate.skus)
        .await?;
    let table = CostTable::from_links(&links);
    let (product, shipping) = table.compute(&candidate.skus, candidate.status);
    candidate.product_cost = product;
    candidate.shipping_cost = shipping;

    let outcome = ledger.upsert(candidate).await?;
    let mut merged = outcome.order;

    let links = cost_links
        .links_for_skus(operation_id, &merged.skus)
        .await?;
    let table = CostTable::from_links(&links);
    let (product, shipping) = table.compute(&merged.skus, merged.status);
    if product != merged.product_cost || shipping != merged.shipping_cost {
        ledger
            .set_costs(operation_id, &merged.id, product, shipping)
            .await?;
        merged.product_cost = product;
        merged.shipping_cost = shipping;
    }

    Ok(StageOutcome {
        order: merged,
        created: outcome.created,
    })
}
