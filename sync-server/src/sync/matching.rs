//! Matching engine
//!
//! Pairs checkout-platform orders with their fulfillment-provider
//! counterparts inside one operation. The cascade is deterministic and
//! conservative: an exact shared reference wins outright; the
//! phone-plus-total rule only matches when exactly one candidate passes —
//! with financial data involved, declining beats guessing, so ties are
//! flagged for manual review instead of auto-resolved.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::costs::{CostLinkStore, CostTable};
use crate::error::SyncError;
use crate::ledger::{merge_match, MatchSide, OrderLedger};
use shared::order::Order;

/// Tuning for one matching pass.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Max distance between the two order dates for the phone+total rule
    pub window_days: i64,
    /// Unmatched rows examined per batch (bounds memory)
    pub batch_size: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            batch_size: 200,
        }
    }
}

/// Counters for one matching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub examined: u64,
    pub matched: u64,
    /// Rule-2 ties left for manual review
    pub ambiguous: u64,
    pub errors: u64,
}

enum MatchAttempt {
    Matched,
    Ambiguous(usize),
    NoMatch,
}

/// Run one matching pass over every unmatched order in the operation.
///
/// `on_batch` fires after each processed batch with the running summary and
/// the total queued row count, so the caller can publish progress.
/// Cancellation is honored between batches, never inside one.
pub async fn run_pass<F>(
    ledger: &dyn OrderLedger,
    cost_links: &dyn CostLinkStore,
    operation_id: Uuid,
    config: &MatchConfig,
    cancel: &CancellationToken,
    mut on_batch: F,
) -> Result<MatchSummary, SyncError>
where
    F: FnMut(&MatchSummary, u64),
{
    // Snapshot the id queue first: matching removes rows from the unmatched
    // set, which would shift offsets mid-walk.
    let mut queue: Vec<String> = Vec::new();
    let mut offset = 0;
    loop {
        let batch = ledger
            .unmatched(operation_id, config.batch_size, offset)
            .await?;
        if batch.is_empty() {
            break;
        }
        offset += batch.len();
        queue.extend(batch.into_iter().map(|o| o.id));
    }

    let total_queued = queue.len() as u64;
    let mut summary = MatchSummary::default();

    for chunk in queue.chunks(config.batch_size.max(1)) {
        if cancel.is_cancelled() {
            break;
        }
        for id in chunk {
            // A row may already have been absorbed as an earlier row's
            // counterpart within this pass
            let Some(order) = ledger.get(operation_id, id).await? else {
                continue;
            };
            if order.needs_review || order.is_matched() {
                continue;
            }
            summary.examined += 1;

            match attempt_match(ledger, cost_links, &order, config).await {
                Ok(MatchAttempt::Matched) => summary.matched += 1,
                Ok(MatchAttempt::Ambiguous(candidates)) => {
                    summary.ambiguous += 1;
                    tracing::warn!(
                        %operation_id,
                        order_id = %order.id,
                        candidates,
                        "Ambiguous match, flagging for manual review"
                    );
                    ledger.flag_review(operation_id, &order.id).await?;
                }
                Ok(MatchAttempt::NoMatch) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(order_id = %order.id, "Match attempt failed: {e}");
                }
            }
        }
        on_batch(&summary, total_queued);
    }

    Ok(summary)
}

/// Find and commit the counterpart for one unmatched order.
async fn attempt_match(
    ledger: &dyn OrderLedger,
    cost_links: &dyn CostLinkStore,
    order: &Order,
    config: &MatchConfig,
) -> Result<MatchAttempt, SyncError> {
    let operation_id = order.operation_id;

    let (platform, carrier) = if order.provider_order_id.is_some() {
        // Platform-side row: look for its carrier counterpart
        let reference = order.provider_order_id.as_deref().unwrap_or_default();
        let by_reference = ledger
            .find_by_external_reference(operation_id, reference)
            .await?;
        if let Some(counterpart) = by_reference.into_iter().find(|o| !o.is_matched()) {
            (order.clone(), counterpart)
        } else {
            match rule_two(ledger, order, config, MatchSide::Fulfillment).await? {
                RuleTwo::One(counterpart) => (order.clone(), counterpart),
                RuleTwo::Several(n) => return Ok(MatchAttempt::Ambiguous(n)),
                RuleTwo::None => return Ok(MatchAttempt::NoMatch),
            }
        }
    } else {
        // Fulfillment-side row: look for the owning platform order
        let by_reference = match order.external_reference.as_deref() {
            Some(reference) => ledger
                .find_by_provider_order_id(operation_id, reference)
                .await?
                .filter(|p| !p.is_matched()),
            None => None,
        };
        if let Some(platform) = by_reference {
            (platform, order.clone())
        } else {
            match rule_two(ledger, order, config, MatchSide::Checkout).await? {
                RuleTwo::One(platform) => (platform, order.clone()),
                RuleTwo::Several(n) => return Ok(MatchAttempt::Ambiguous(n)),
                RuleTwo::None => return Ok(MatchAttempt::NoMatch),
            }
        }
    };

    let now = Utc::now();
    let merged = merge_match(&platform, &carrier, now);
    let merged = ledger
        .absorb(operation_id, &platform.id, &carrier.id, merged)
        .await?;

    // The merged row usually advanced in status; re-derive its costs
    let links = cost_links
        .links_for_skus(operation_id, &merged.skus)
        .await?;
    let table = CostTable::from_links(&links);
    let (product, shipping) = table.compute(&merged.skus, merged.status);
    if product != merged.product_cost || shipping != merged.shipping_cost {
        ledger
            .set_costs(operation_id, &merged.id, product, shipping)
            .await?;
    }

    Ok(MatchAttempt::Matched)
}

enum RuleTwo {
    One(Order),
    Several(usize),
    None,
}

/// Rule 2: exact phone + total within the matching window, opposite side.
///
/// The pair only commits when it is unambiguous from both directions: one
/// candidate on the opposite side, and no competing row on this order's own
/// side with the same phone and total. A one-directional check would let
/// whichever side happens to be examined first claim a counterpart that two
/// of its siblings have equal right to.
async fn rule_two(
    ledger: &dyn OrderLedger,
    order: &Order,
    config: &MatchConfig,
    side: MatchSide,
) -> Result<RuleTwo, SyncError> {
    let Some(phone) = order.customer.phone.as_deref() else {
        return Ok(RuleTwo::None);
    };
    if order.total.is_zero() {
        return Ok(RuleTwo::None);
    }

    let candidates = ledger
        .find_by_phone_total(
            order.operation_id,
            phone,
            order.total,
            order.order_date,
            config.window_days,
            side,
        )
        .await?;

    match candidates.len() {
        0 => Ok(RuleTwo::None),
        1 => {
            let own_side = match side {
                MatchSide::Checkout => MatchSide::Fulfillment,
                MatchSide::Fulfillment => MatchSide::Checkout,
            };
            let competitors = ledger
                .find_by_phone_total(
                    order.operation_id,
                    phone,
                    order.total,
                    order.order_date,
                    config.window_days,
                    own_side,
                )
                .await?;
            if competitors.len() > 1 {
                return Ok(RuleTwo::Several(competitors.len()));
            }
            Ok(RuleTwo::One(candidates.into_iter().next().expect("len 1")))
        }
        n => Ok(RuleTwo::Several(n)),
    }
}
