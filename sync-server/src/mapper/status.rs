//! Per-provider status vocabulary tables
//!
//! Each upstream speaks its own status dialect; these static tables are the
//! single place where provider strings meet the canonical lifecycle.

use shared::order::OrderStatus;
use shared::provider::ProviderKind;

/// Translate a provider status string into the canonical lifecycle.
///
/// Returns `None` for unrecognized values — the caller decides the fallback
/// (the mapper logs and uses `Pending`).
pub fn translate(provider: ProviderKind, raw: &str) -> Option<OrderStatus> {
    let raw = raw.trim().to_ascii_lowercase();
    match provider {
        ProviderKind::Shopify => match raw.as_str() {
            "pending" | "authorized" | "partially_refunded" => Some(OrderStatus::Pending),
            "paid" | "partially_paid" => Some(OrderStatus::Confirmed),
            "fulfilled" | "partial" => Some(OrderStatus::Shipped),
            "refunded" => Some(OrderStatus::Returned),
            "voided" | "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        },
        ProviderKind::Cartpanda => match raw.as_str() {
            "pending" | "awaiting_payment" => Some(OrderStatus::Pending),
            "paid" | "processing" => Some(OrderStatus::Confirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "canceled" | "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" | "chargeback" => Some(OrderStatus::Returned),
            _ => None,
        },
        ProviderKind::Digistore24 => match raw.as_str() {
            "pending" | "paying" | "unpaid" => Some(OrderStatus::Pending),
            "completed" | "paid" => Some(OrderStatus::Confirmed),
            "refunded" | "chargeback" => Some(OrderStatus::Returned),
            "aborted" | "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        },
        ProviderKind::Elogy => match raw.as_str() {
            "waiting" | "in_progress" => Some(OrderStatus::Confirmed),
            "delivery" => Some(OrderStatus::Shipped),
            "in_transit" => Some(OrderStatus::InTransit),
            "in_delivery" => Some(OrderStatus::InDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "return" | "returned" => Some(OrderStatus::Returned),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        },
        ProviderKind::Fhb => match raw.as_str() {
            "new" | "packing" => Some(OrderStatus::Confirmed),
            "sent" => Some(OrderStatus::Shipped),
            "transit" => Some(OrderStatus::InTransit),
            "delivering" => Some(OrderStatus::InDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "returned" => Some(OrderStatus::Returned),
            "storno" => Some(OrderStatus::Cancelled),
            _ => None,
        },
    }
}
