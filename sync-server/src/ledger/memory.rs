//! In-memory ledger for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use shared::order::Order;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    merge, side_of, within_window, LedgerError, MatchSide, OrderLedger, UpsertOutcome,
};
use shared::provider::ProviderSide;

/// Ledger backed by per-operation BTreeMaps.
///
/// Iteration order is the id order, which keeps matching and recalculation
/// passes deterministic — the same guarantee the Postgres queries give via
/// `ORDER BY id`.
#[derive(Default)]
pub struct MemoryOrderLedger {
    inner: RwLock<HashMap<Uuid, BTreeMap<String, Order>>>,
}

impl MemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn one_sided(order: &Order) -> bool {
        order.provider_order_id.is_some() ^ order.carrier_order_id.is_some()
    }

    fn is_unmatched(order: &Order) -> bool {
        !order.needs_review && Self::one_sided(order)
    }

    fn on_side(order: &Order, side: MatchSide) -> bool {
        match side {
            MatchSide::Checkout => side_of(order.data_source) == ProviderSide::Checkout,
            MatchSide::Fulfillment => side_of(order.data_source) == ProviderSide::Fulfillment,
        }
    }
}

#[async_trait]
impl OrderLedger for MemoryOrderLedger {
    async fn upsert(&self, candidate: Order) -> Result<UpsertOutcome, LedgerError> {
        let now = Utc::now();
        let mut guard = self.inner.write();
        let rows = guard.entry(candidate.operation_id).or_default();

        let existing_id = if let Some(key) = &candidate.provider_order_id {
            rows.values()
                .find(|o| o.provider_order_id.as_deref() == Some(key.as_str()))
                .map(|o| o.id.clone())
        } else if let Some(key) = &candidate.carrier_order_id {
            rows.values()
                .find(|o| o.carrier_order_id.as_deref() == Some(key.as_str()))
                .map(|o| o.id.clone())
        } else {
            None
        };

        match existing_id {
            Some(id) => {
                let existing = rows.get(&id).expect("indexed row present");
                let merged = merge(existing, &candidate, now);
                if merged.id != id {
                    rows.remove(&id);
                }
                let order = merged.clone();
                rows.insert(merged.id.clone(), merged);
                Ok(UpsertOutcome {
                    order,
                    created: false,
                })
            }
            None => {
                let order = candidate.clone();
                rows.insert(candidate.id.clone(), candidate);
                Ok(UpsertOutcome {
                    order,
                    created: true,
                })
            }
        }
    }

    async fn get(&self, operation_id: Uuid, id: &str) -> Result<Option<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .and_then(|rows| rows.get(id).cloned()))
    }

    async fn set_costs(
        &self,
        operation_id: Uuid,
        id: &str,
        product_cost: Decimal,
        shipping_cost: Decimal,
    ) -> Result<(), LedgerError> {
        let mut guard = self.inner.write();
        let order = guard
            .get_mut(&operation_id)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        order.product_cost = product_cost;
        order.shipping_cost = shipping_cost;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn flag_review(&self, operation_id: Uuid, id: &str) -> Result<(), LedgerError> {
        let mut guard = self.inner.write();
        let order = guard
            .get_mut(&operation_id)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        order.needs_review = true;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn unmatched(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .map(|rows| {
                rows.values()
                    .filter(|o| Self::is_unmatched(o))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_provider_order_id(
        &self,
        operation_id: Uuid,
        provider_order_id: &str,
    ) -> Result<Option<Order>, LedgerError> {
        Ok(self.inner.read().get(&operation_id).and_then(|rows| {
            rows.values()
                .find(|o| o.provider_order_id.as_deref() == Some(provider_order_id))
                .cloned()
        }))
    }

    async fn find_by_external_reference(
        &self,
        operation_id: Uuid,
        reference: &str,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .map(|rows| {
                rows.values()
                    .filter(|o| {
                        Self::on_side(o, MatchSide::Fulfillment)
                            && o.external_reference.as_deref() == Some(reference)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_phone_total(
        &self,
        operation_id: Uuid,
        phone: &str,
        total: Decimal,
        around: DateTime<Utc>,
        window_days: i64,
        side: MatchSide,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .map(|rows| {
                rows.values()
                    .filter(|o| {
                        Self::one_sided(o)
                            && Self::on_side(o, side)
                            && o.customer.phone.as_deref() == Some(phone)
                            && o.total == total
                            && within_window(o.order_date, around, window_days)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn absorb(
        &self,
        operation_id: Uuid,
        keep_id: &str,
        absorbed_id: &str,
        merged: Order,
    ) -> Result<Order, LedgerError> {
        let mut guard = self.inner.write();
        let rows = guard
            .get_mut(&operation_id)
            .ok_or_else(|| LedgerError::NotFound(keep_id.to_string()))?;
        if !rows.contains_key(keep_id) {
            return Err(LedgerError::NotFound(keep_id.to_string()));
        }
        rows.remove(absorbed_id);
        rows.remove(keep_id);
        let order = merged.clone();
        rows.insert(merged.id.clone(), merged);
        Ok(order)
    }

    async fn orders_with_sku(
        &self,
        operation_id: Uuid,
        sku: &str,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .map(|rows| {
                rows.values()
                    .filter(|o| o.skus.iter().any(|s| s == sku))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn orders_for_operation(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self
            .inner
            .read()
            .get(&operation_id)
            .map(|rows| rows.values().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn operations_with_unmatched(&self) -> Result<Vec<Uuid>, LedgerError> {
        let guard = self.inner.read();
        let mut ops: Vec<Uuid> = guard
            .iter()
            .filter(|(_, rows)| rows.values().any(|o| Self::is_unmatched(o)))
            .map(|(op, _)| *op)
            .collect();
        ops.sort();
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shared::order::{CustomerSnapshot, OrderStatus};
    use shared::provider::DataSource;

    fn order(op: Uuid, provider_id: &str) -> Order {
        let now = Utc::now();
        Order {
            id: Order::derive_id(DataSource::Shopify, provider_id),
            store_id: Uuid::new_v4(),
            operation_id: op,
            data_source: DataSource::Shopify,
            provider_order_id: Some(provider_id.to_string()),
            carrier_order_id: None,
            external_reference: None,
            customer: CustomerSnapshot::default(),
            total: dec!(10.00),
            currency: "EUR".into(),
            product_cost: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            payment_status: Default::default(),
            status: OrderStatus::Confirmed,
            order_date: now,
            last_status_update: now,
            carrier_matched_at: None,
            carrier_imported: false,
            tracking_number: None,
            skus: vec!["abc123".into()],
            needs_review: false,
            raw: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = MemoryOrderLedger::new();
        let op = Uuid::new_v4();

        let first = ledger.upsert(order(op, "1001")).await.unwrap();
        assert!(first.created);
        let second = ledger.upsert(order(op, "1001")).await.unwrap();
        assert!(!second.created);

        let rows = ledger.orders_for_operation(op, 100, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_operations_scoped() {
        let ledger = MemoryOrderLedger::new();
        let op_a = Uuid::new_v4();
        let op_b = Uuid::new_v4();
        ledger.upsert(order(op_a, "1001")).await.unwrap();
        ledger.upsert(order(op_b, "1001")).await.unwrap();

        assert_eq!(ledger.orders_for_operation(op_a, 10, 0).await.unwrap().len(), 1);
        assert_eq!(ledger.orders_for_operation(op_b, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_excludes_flagged() {
        let ledger = MemoryOrderLedger::new();
        let op = Uuid::new_v4();
        let o = ledger.upsert(order(op, "1001")).await.unwrap().order;
        assert_eq!(ledger.unmatched(op, 10, 0).await.unwrap().len(), 1);

        ledger.flag_review(op, &o.id).await.unwrap();
        assert!(ledger.unmatched(op, 10, 0).await.unwrap().is_empty());
    }
}
