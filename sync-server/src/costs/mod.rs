//! Product cost configuration and recalculation
//!
//! A [`ProductCostLink`] maps a normalized SKU to its unit cost and shipping
//! cost per operation. Link mutations trigger [`CostService::recalculate`],
//! which rewrites the derived cost fields on every affected order under the
//! status gating rules, then fires the operation's cache invalidation key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::OrderStatus;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::{LedgerError, OrderLedger};
use crate::mapper::normalize_sku_token;

/// Batch size for the fallback full-operation pass.
const RECALC_BATCH: usize = 500;

/// Per-SKU cost configuration for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCostLink {
    pub operation_id: Uuid,
    pub store_id: Uuid,
    /// Normalized (lower-cased) SKU token
    pub sku: String,
    pub cost_price: Decimal,
    pub shipping_cost: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Storage for cost links.
#[async_trait]
pub trait CostLinkStore: Send + Sync {
    async fn upsert(&self, link: ProductCostLink) -> Result<ProductCostLink, LedgerError>;

    /// Links for any of the given normalized SKUs within an operation.
    async fn links_for_skus(
        &self,
        operation_id: Uuid,
        skus: &[String],
    ) -> Result<Vec<ProductCostLink>, LedgerError>;
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryCostLinkStore {
    links: RwLock<HashMap<(Uuid, String), ProductCostLink>>,
}

impl MemoryCostLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CostLinkStore for MemoryCostLinkStore {
    async fn upsert(&self, mut link: ProductCostLink) -> Result<ProductCostLink, LedgerError> {
        link.sku = normalize_sku_token(&link.sku);
        self.links
            .write()
            .insert((link.operation_id, link.sku.clone()), link.clone());
        Ok(link)
    }

    async fn links_for_skus(
        &self,
        operation_id: Uuid,
        skus: &[String],
    ) -> Result<Vec<ProductCostLink>, LedgerError> {
        let guard = self.links.read();
        Ok(skus
            .iter()
            .filter_map(|sku| guard.get(&(operation_id, sku.clone())).cloned())
            .collect())
    }
}

// ============================================================================
// Cost derivation
// ============================================================================

/// Resolved cost lookup for one order's SKU set.
pub struct CostTable {
    by_sku: HashMap<String, (Decimal, Decimal)>,
}

impl CostTable {
    pub fn from_links(links: &[ProductCostLink]) -> Self {
        Self {
            by_sku: links
                .iter()
                .map(|l| (l.sku.clone(), (l.cost_price, l.shipping_cost)))
                .collect(),
        }
    }

    /// Derive `(product_cost, shipping_cost)` for an order.
    ///
    /// Product cost sums the unit costs of every linked SKU; shipping cost
    /// takes the maximum linked rate (one parcel per order). Either figure is
    /// zero when the status does not recognize that cost as incurred.
    pub fn compute(&self, skus: &[String], status: OrderStatus) -> (Decimal, Decimal) {
        let mut product = Decimal::ZERO;
        let mut shipping = Decimal::ZERO;
        for sku in skus {
            if let Some((cost, ship)) = self.by_sku.get(sku) {
                product += *cost;
                shipping = shipping.max(*ship);
            }
        }
        (
            if status.product_cost_eligible() {
                product
            } else {
                Decimal::ZERO
            },
            if status.shipping_cost_eligible() {
                shipping
            } else {
                Decimal::ZERO
            },
        )
    }
}

// ============================================================================
// Cache invalidation seam
// ============================================================================

/// Named-key invalidation consumed by dashboard aggregation.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, operation_id: Uuid);
}

/// Default implementation: emits the invalidation as a structured log line
/// for the aggregation layer's consumer.
pub struct LoggingInvalidator;

impl CacheInvalidator for LoggingInvalidator {
    fn invalidate(&self, operation_id: Uuid) {
        tracing::debug!(key = %format!("operation:{operation_id}:aggregates"), "Cache invalidated");
    }
}

/// Test double that records invalidated keys.
#[derive(Default)]
pub struct RecordingInvalidator {
    pub keys: Mutex<Vec<Uuid>>,
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, operation_id: Uuid) {
        self.keys.lock().push(operation_id);
    }
}

// ============================================================================
// Recalculation service
// ============================================================================

/// Outcome of one recalculation pass.
#[derive(Debug, Clone, Serialize)]
pub struct RecalcSummary {
    pub scanned: u64,
    pub rewritten: u64,
    /// True when the SKU matched no orders and the full-operation pass ran
    pub fallback: bool,
}

pub struct CostService {
    ledger: Arc<dyn OrderLedger>,
    links: Arc<dyn CostLinkStore>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl CostService {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        links: Arc<dyn CostLinkStore>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            ledger,
            links,
            invalidator,
        }
    }

    /// Rewrite derived costs after a cost-link change.
    ///
    /// Looks up orders referencing the changed SKU; when none match (stored
    /// SKUs in a different concatenation shape), falls back to a full pass
    /// over the operation rather than silently doing nothing. Runs after the
    /// link write — a failure here never rolls the link back.
    pub async fn recalculate(
        &self,
        operation_id: Uuid,
        changed_sku: &str,
    ) -> Result<RecalcSummary, LedgerError> {
        let sku = normalize_sku_token(changed_sku);
        let direct = self.ledger.orders_with_sku(operation_id, &sku).await?;

        let mut summary = RecalcSummary {
            scanned: 0,
            rewritten: 0,
            fallback: direct.is_empty(),
        };

        if !direct.is_empty() {
            self.recalc_orders(operation_id, &direct, &mut summary)
                .await?;
        } else {
            tracing::warn!(
                %operation_id,
                sku = %sku,
                "No orders reference changed SKU, running full recalculation"
            );
            let mut offset = 0;
            loop {
                let batch = self
                    .ledger
                    .orders_for_operation(operation_id, RECALC_BATCH, offset)
                    .await?;
                if batch.is_empty() {
                    break;
                }
                offset += batch.len();
                self.recalc_orders(operation_id, &batch, &mut summary)
                    .await?;
            }
        }

        self.invalidator.invalidate(operation_id);
        tracing::info!(
            %operation_id,
            sku = %sku,
            scanned = summary.scanned,
            rewritten = summary.rewritten,
            fallback = summary.fallback,
            "Cost recalculation finished"
        );
        Ok(summary)
    }

    async fn recalc_orders(
        &self,
        operation_id: Uuid,
        orders: &[shared::order::Order],
        summary: &mut RecalcSummary,
    ) -> Result<(), LedgerError> {
        for order in orders {
            summary.scanned += 1;
            let links = self.links.links_for_skus(operation_id, &order.skus).await?;
            let table = CostTable::from_links(&links);
            let (product, shipping) = table.compute(&order.skus, order.status);
            if product != order.product_cost || shipping != order.shipping_cost {
                self.ledger
                    .set_costs(operation_id, &order.id, product, shipping)
                    .await?;
                summary.rewritten += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn link(op: Uuid, sku: &str, cost: Decimal, ship: Decimal) -> ProductCostLink {
        ProductCostLink {
            operation_id: op,
            store_id: Uuid::new_v4(),
            sku: sku.into(),
            cost_price: cost,
            shipping_cost: ship,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cost_table_sums_product_and_takes_max_shipping() {
        let op = Uuid::new_v4();
        let links = vec![
            link(op, "abc123", dec!(10.00), dec!(5.00)),
            link(op, "xyz999", dec!(4.50), dec!(7.50)),
        ];
        let table = CostTable::from_links(&links);
        let (product, shipping) = table.compute(
            &["abc123".into(), "xyz999".into()],
            OrderStatus::Shipped,
        );
        assert_eq!(product, dec!(14.50));
        assert_eq!(shipping, dec!(7.50));
    }

    #[test]
    fn test_cost_table_respects_status_gating() {
        let op = Uuid::new_v4();
        let links = vec![link(op, "abc123", dec!(10.00), dec!(5.00))];
        let table = CostTable::from_links(&links);

        // Confirmed: product yes, shipping no
        let (product, shipping) = table.compute(&["abc123".into()], OrderStatus::Confirmed);
        assert_eq!(product, dec!(10.00));
        assert_eq!(shipping, Decimal::ZERO);

        // Cancelled: both zero
        let (product, shipping) = table.compute(&["abc123".into()], OrderStatus::Cancelled);
        assert_eq!(product, Decimal::ZERO);
        assert_eq!(shipping, Decimal::ZERO);
    }

    #[test]
    fn test_unlinked_skus_cost_nothing() {
        let table = CostTable::from_links(&[]);
        let (product, shipping) = table.compute(&["abc123".into()], OrderStatus::Delivered);
        assert_eq!(product, Decimal::ZERO);
        assert_eq!(shipping, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_memory_store_normalizes_sku() {
        let store = MemoryCostLinkStore::new();
        let op = Uuid::new_v4();
        store
            .upsert(link(op, "  ABC123 ", dec!(1), dec!(2)))
            .await
            .unwrap();
        let found = store
            .links_for_skus(op, &["abc123".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
