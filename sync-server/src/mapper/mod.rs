//! Canonical order mapper
//!
//! Pure translation from a [`RawOrderRecord`] to the canonical [`Order`]:
//! status vocabulary, customer/address normalization, SKU token extraction,
//! currency pass-through. No storage, no network — staging owns the upsert.

pub mod status;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::order::{CustomerSnapshot, Order, OrderStatus, PaymentStatus};
use shared::provider::ProviderSide;
use uuid::Uuid;

use crate::providers::RawOrderRecord;

/// Map a raw provider record into a canonical order for one operation.
///
/// Never fails: unknown status values fall back to `Pending` with a warning,
/// missing dates fall back to `now`.
pub fn map(record: &RawOrderRecord, operation_id: Uuid, store_id: Uuid, now: DateTime<Utc>) -> Order {
    let status = match status::translate(record.provider, &record.status_raw) {
        Some(s) => s,
        None => {
            tracing::warn!(
                provider = %record.provider,
                status = %record.status_raw,
                upstream_id = %record.upstream_id,
                "Unrecognized provider status, falling back to pending"
            );
            OrderStatus::Pending
        }
    };

    let id = format!("{}:{}", record.provider, record.upstream_id);
    let (provider_order_id, carrier_order_id, carrier_imported) = match record.provider.side() {
        ProviderSide::Checkout => (Some(record.upstream_id.clone()), None, false),
        ProviderSide::Fulfillment => (None, Some(record.upstream_id.clone()), true),
    };

    Order {
        id,
        store_id,
        operation_id,
        data_source: record.provider.data_source(),
        provider_order_id,
        carrier_order_id,
        external_reference: record.external_reference.clone(),
        customer: normalize_customer(record),
        total: record.total,
        currency: record.currency.trim().to_ascii_uppercase(),
        product_cost: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        payment_status: map_payment_status(record.payment_status_raw.as_deref()),
        status,
        order_date: record.order_date.unwrap_or(now),
        last_status_update: now,
        carrier_matched_at: None,
        carrier_imported,
        tracking_number: record.tracking_number.clone(),
        skus: normalize_sku_list(&record.sku_list),
        needs_review: false,
        raw: record.raw.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn map_payment_status(raw: Option<&str>) -> PaymentStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("paid") | Some("completed") | Some("partially_paid") => PaymentStatus::Paid,
        Some("refunded") | Some("chargeback") | Some("partially_refunded") => {
            PaymentStatus::Refunded
        }
        Some("voided") | Some("failed") | Some("aborted") => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

fn normalize_customer(record: &RawOrderRecord) -> CustomerSnapshot {
    CustomerSnapshot {
        name: clean(record.customer_name.as_deref()),
        email: clean(record.customer_email.as_deref()).map(|e| e.to_ascii_lowercase()),
        phone: record.customer_phone.as_deref().and_then(normalize_phone),
        street: clean(record.street.as_deref()),
        city: clean(record.city.as_deref()).map(|c| title_case(&c)),
        zip: clean(record.zip.as_deref()),
        country: clean(record.country.as_deref()).map(|c| c.to_ascii_uppercase()),
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Keep digits and a single leading `+`; drops spaces, dashes, parentheses.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    if out.is_empty() || out == "+" {
        None
    } else {
        Some(out)
    }
}

/// Capitalize each word, lower-casing the rest ("são paulo" → "São Paulo").
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize one SKU token: trimmed, lower-cased.
pub fn normalize_sku_token(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Split possibly-concatenated line-item SKU strings ("sku1+sku2") into a
/// sorted, deduplicated set of normalized tokens.
pub fn normalize_sku_list(raw_list: &[String]) -> Vec<String> {
    let mut tokens: Vec<String> = raw_list
        .iter()
        .flat_map(|raw| raw.split('+'))
        .map(normalize_sku_token)
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}
