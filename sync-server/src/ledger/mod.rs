//! Order ledger access
//!
//! The ledger is the only cross-task shared mutable resource. Every write
//! path goes through [`OrderLedger::upsert`] with the same key resolution
//! and the same merge policy, so webhook-driven and poll-driven updates for
//! the same upstream order converge to one row regardless of arrival order.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use shared::order::Order;
use shared::provider::{DataSource, ProviderSide};
use uuid::Uuid;

pub use memory::MemoryOrderLedger;
pub use postgres::PgOrderLedger;

/// Ledger storage errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

/// Result of an idempotent upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub order: Order,
    /// True when a new row was inserted, false when an existing row merged
    pub created: bool,
}

/// Which side of the ledger a matching query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSide {
    /// Rows created by a checkout platform (no carrier attached yet)
    Checkout,
    /// Fulfillment-only rows (no checkout order attached yet)
    Fulfillment,
}

/// Storage contract for the canonical order ledger.
///
/// Implementations: [`PgOrderLedger`] for production, [`MemoryOrderLedger`]
/// for tests. All listing methods return rows ordered by id so downstream
/// passes are deterministic.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Insert-or-merge by the idempotent key: `(operation_id,
    /// provider_order_id)` when present, else `(operation_id,
    /// carrier_order_id)`, else a fresh row.
    async fn upsert(&self, candidate: Order) -> Result<UpsertOutcome, LedgerError>;

    async fn get(&self, operation_id: Uuid, id: &str) -> Result<Option<Order>, LedgerError>;

    /// Rewrite the derived cost fields. Costs are recomputed, never
    /// accumulated.
    async fn set_costs(
        &self,
        operation_id: Uuid,
        id: &str,
        product_cost: Decimal,
        shipping_cost: Decimal,
    ) -> Result<(), LedgerError>;

    /// Mark an order for manual review after an ambiguous match.
    async fn flag_review(&self, operation_id: Uuid, id: &str) -> Result<(), LedgerError>;

    /// One-sided rows awaiting a counterpart, excluding flagged ones.
    async fn unmatched(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError>;

    async fn find_by_provider_order_id(
        &self,
        operation_id: Uuid,
        provider_order_id: &str,
    ) -> Result<Option<Order>, LedgerError>;

    /// Fulfillment-only rows whose external reference equals `reference`.
    async fn find_by_external_reference(
        &self,
        operation_id: Uuid,
        reference: &str,
    ) -> Result<Vec<Order>, LedgerError>;

    /// One-sided rows on `side` with this exact phone and total, with order
    /// dates within `window_days` of `around`. Review-flagged rows are
    /// included — they are still physically-present candidates and must keep
    /// counting toward ambiguity.
    async fn find_by_phone_total(
        &self,
        operation_id: Uuid,
        phone: &str,
        total: Decimal,
        around: DateTime<Utc>,
        window_days: i64,
        side: MatchSide,
    ) -> Result<Vec<Order>, LedgerError>;

    /// Commit a match: replace `keep_id` with the merged row and delete the
    /// absorbed counterpart row, atomically.
    async fn absorb(
        &self,
        operation_id: Uuid,
        keep_id: &str,
        absorbed_id: &str,
        merged: Order,
    ) -> Result<Order, LedgerError>;

    /// Orders whose normalized SKU set contains `sku`.
    async fn orders_with_sku(
        &self,
        operation_id: Uuid,
        sku: &str,
    ) -> Result<Vec<Order>, LedgerError>;

    async fn orders_for_operation(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError>;

    /// Operations that currently have unmatched rows (for the sweeper).
    async fn operations_with_unmatched(&self) -> Result<Vec<Uuid>, LedgerError>;
}

// ============================================================================
// Merge policy
// ============================================================================

/// Which side a row's data originated from.
pub fn side_of(source: DataSource) -> ProviderSide {
    match source {
        DataSource::FulfillmentOnly => ProviderSide::Fulfillment,
        _ => ProviderSide::Checkout,
    }
}

/// Merge an incoming candidate into an existing row with the same key.
///
/// Ownership rules: checkout data wins for customer/commercial fields,
/// fulfillment data wins for tracking/carrier fields. A populated field
/// owned by the other side is never overwritten. Status only moves forward
/// along the lifecycle.
pub fn merge(existing: &Order, incoming: &Order, now: DateTime<Utc>) -> Order {
    let mut merged = existing.clone();
    let incoming_side = side_of(incoming.data_source);

    match incoming_side {
        ProviderSide::Checkout => {
            // Fresh checkout data refreshes the commercial snapshot
            merged.customer = incoming.customer.clone();
            merged.total = incoming.total;
            if !incoming.currency.is_empty() {
                merged.currency = incoming.currency.clone();
            }
            merged.payment_status = incoming.payment_status;
            merged.order_date = incoming.order_date;
            if !incoming.skus.is_empty() {
                merged.skus = incoming.skus.clone();
            }
            if merged.provider_order_id.is_none() {
                merged.provider_order_id = incoming.provider_order_id.clone();
            }
            // A fulfillment-only row being claimed by its checkout order
            // keeps its carrier side untouched but adopts the platform id
            if side_of(existing.data_source) == ProviderSide::Fulfillment
                && incoming.provider_order_id.is_some()
            {
                merged.data_source = incoming.data_source;
                merged.id = incoming.id.clone();
            }
        }
        ProviderSide::Fulfillment => {
            // Fulfillment refreshes only its own side
            if merged.carrier_order_id.is_none() {
                merged.carrier_order_id = incoming.carrier_order_id.clone();
            }
            if incoming.tracking_number.is_some() {
                merged.tracking_number = incoming.tracking_number.clone();
            }
            // Fill customer gaps, never overwrite checkout-owned values
            fill_customer_gaps(&mut merged, incoming);
            if merged.total.is_zero() {
                merged.total = incoming.total;
            }
            if merged.skus.is_empty() {
                merged.skus = incoming.skus.clone();
            }
        }
    }

    if merged.external_reference.is_none() {
        merged.external_reference = incoming.external_reference.clone();
    }

    if merged.status != incoming.status && merged.status.may_advance_to(incoming.status) {
        merged.status = incoming.status;
        merged.last_status_update = now;
    }

    // Latest provider payload retained for audit
    if !incoming.raw.is_null() {
        merged.raw = incoming.raw.clone();
    }
    merged.updated_at = now;
    merged
}

/// Merge a carrier counterpart into a checkout-platform row on match.
///
/// On top of the ownership rules this attaches the carrier identity and
/// stamps `carrier_matched_at`.
pub fn merge_match(platform: &Order, carrier: &Order, now: DateTime<Utc>) -> Order {
    let mut merged = merge(platform, carrier, now);
    merged.carrier_order_id = carrier
        .carrier_order_id
        .clone()
        .or_else(|| merged.carrier_order_id.clone());
    if merged.tracking_number.is_none() {
        merged.tracking_number = carrier.tracking_number.clone();
    }
    merged.carrier_matched_at = Some(now);
    merged.carrier_imported = true;
    merged
}

fn fill_customer_gaps(merged: &mut Order, incoming: &Order) {
    let c = &mut merged.customer;
    let i = &incoming.customer;
    if c.name.is_none() {
        c.name = i.name.clone();
    }
    if c.email.is_none() {
        c.email = i.email.clone();
    }
    if c.phone.is_none() {
        c.phone = i.phone.clone();
    }
    if c.street.is_none() {
        c.street = i.street.clone();
    }
    if c.city.is_none() {
        c.city = i.city.clone();
    }
    if c.zip.is_none() {
        c.zip = i.zip.clone();
    }
    if c.country.is_none() {
        c.country = i.country.clone();
    }
}

/// Whether two order dates fall within the matching window.
pub fn within_window(a: DateTime<Utc>, b: DateTime<Utc>, window_days: i64) -> bool {
    let delta = if a > b { a - b } else { b - a };
    delta <= Duration::days(window_days)
}
