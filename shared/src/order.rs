//! Canonical order model
//!
//! One [`Order`] per logical purchase, normalized across all upstream
//! providers. Rows are scoped to an operation; `(operation_id,
//! provider_order_id)` is the idempotent upsert key whenever the upstream
//! supplied an order id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::provider::DataSource;

// ============================================================================
// Lifecycle
// ============================================================================

/// Canonical order lifecycle.
///
/// Transitions are monotonic along the delivery path; `Cancelled` and
/// `Returned` are terminal exits reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    InTransit,
    InDelivery,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    /// Terminal exits: no automated transition leaves these states.
    /// `Delivered` ends the delivery path but may still exit to `Returned`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Position along the delivery path. Terminal exits have no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::InTransit => Some(3),
            OrderStatus::InDelivery => Some(4),
            OrderStatus::Delivered => Some(5),
            OrderStatus::Cancelled | OrderStatus::Returned => None,
        }
    }

    /// Whether an automated update may move this status to `next`.
    ///
    /// Forward moves along the delivery path are allowed, backward moves are
    /// not. `Cancelled`/`Returned` are reachable from any non-terminal state
    /// and absorbing once reached.
    pub fn may_advance_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return false;
        }
        match (self.rank(), next.rank()) {
            // Terminal exits: reachable from non-terminal states only
            (Some(_), None) => !self.is_terminal(),
            // Forward along the delivery path
            (Some(cur), Some(nxt)) => nxt > cur,
            // Nothing leaves a terminal exit automatically
            (None, _) => false,
        }
    }

    /// Database/text representation.
    pub fn as_db(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "in_transit" => Some(OrderStatus::InTransit),
            "in_delivery" => Some(OrderStatus::InDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "returned" => Some(OrderStatus::Returned),
            _ => None,
        }
    }

    /// Statuses for which product cost is recognized as incurred.
    pub fn product_cost_eligible(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Confirmed
                | OrderStatus::Shipped
                | OrderStatus::InTransit
                | OrderStatus::InDelivery
                | OrderStatus::Delivered
        )
    }

    /// Statuses for which shipping cost is recognized as incurred.
    ///
    /// Narrower than the product set: a confirmed-but-unshipped order has no
    /// shipping cost yet.
    pub fn shipping_cost_eligible(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Shipped
                | OrderStatus::InTransit
                | OrderStatus::InDelivery
                | OrderStatus::Delivered
        )
    }
}

/// Payment state as reported by the checkout platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// Customer snapshot
// ============================================================================

/// Customer data copied at ingest time — never live-linked to any upstream.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CustomerSnapshot {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

// ============================================================================
// Order entity
// ============================================================================

/// Canonical order — one row per logical purchase in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Stable id: derived from the owning upstream order id when available
    /// (`source:key`), else generated for manual entries.
    pub id: String,
    pub store_id: Uuid,
    pub operation_id: Uuid,

    // Provenance
    pub data_source: DataSource,
    /// Checkout-platform order id; unique per operation when present
    pub provider_order_id: Option<String>,
    /// Fulfillment-provider order id; set on import or match
    pub carrier_order_id: Option<String>,
    /// Platform order number echoed in a carrier payload, when the carrier
    /// supports attaching a reference. Strongest matching signal.
    pub external_reference: Option<String>,

    // Customer snapshot
    pub customer: CustomerSnapshot,

    // Commercial
    pub total: Decimal,
    pub currency: String,
    /// Derived; zero unless the status is product-cost eligible
    pub product_cost: Decimal,
    /// Derived; zero unless the status is shipping-cost eligible
    pub shipping_cost: Decimal,
    pub payment_status: PaymentStatus,

    // Lifecycle
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub last_status_update: DateTime<Utc>,
    pub carrier_matched_at: Option<DateTime<Utc>>,
    pub carrier_imported: bool,
    pub tracking_number: Option<String>,

    /// Normalized (lower-cased, split) SKU tokens from the line items
    pub skus: Vec<String>,
    /// Ambiguous-match marker: set when matching declined to guess
    pub needs_review: bool,

    /// Opaque provider payload retained for audit/debugging
    pub raw: Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Derive the stable ledger id for a provider-owned order.
    ///
    /// Follows the `source:key` convention so ids stay readable in logs and
    /// stable across re-ingestion.
    pub fn derive_id(source: DataSource, upstream_id: &str) -> String {
        format!("{}:{}", source.as_str(), upstream_id)
    }

    /// Whether both the checkout side and the fulfillment side are present.
    pub fn is_matched(&self) -> bool {
        self.provider_order_id.is_some() && self.carrier_order_id.is_some()
    }
}
