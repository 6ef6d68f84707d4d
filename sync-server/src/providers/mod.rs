//! Provider adapters
//!
//! One adapter per upstream system, all behind the [`ProviderAdapter`]
//! capability trait and selected through the static [`AdapterRegistry`].
//! Adapters translate provider payloads/pages into [`RawOrderRecord`]s and
//! own their provider's auth, pagination and webhook conventions. They do
//! no ledger work — staging is downstream.

pub mod cartpanda;
pub mod digistore24;
pub mod elogy;
pub mod fhb;
pub mod retry;
pub mod shopify;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use rust_decimal::Decimal;
use serde_json::Value;
use shared::provider::ProviderKind;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SyncError;
use crate::integrations::Integration;

pub use cartpanda::CartpandaAdapter;
pub use digistore24::Digistore24Adapter;
pub use elogy::ElogyAdapter;
pub use fhb::FhbAdapter;
pub use shopify::ShopifyAdapter;

/// A provider order in its least-common-denominator shape, before canonical
/// mapping. Field semantics depend on the provider side: checkout platforms
/// fill the commercial fields, fulfillment providers the carrier fields.
#[derive(Debug, Clone)]
pub struct RawOrderRecord {
    pub provider: ProviderKind,
    /// The provider's own order id
    pub upstream_id: String,
    /// Checkout-platform order number echoed by a carrier, when supported
    pub external_reference: Option<String>,
    /// Provider status vocabulary, translated downstream by the mapper
    pub status_raw: String,
    pub payment_status_raw: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub total: Decimal,
    pub currency: String,
    /// Line-item SKU strings as sent by the provider, possibly concatenated
    /// ("sku1+sku2")
    pub sku_list: Vec<String>,
    pub tracking_number: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    /// Original payload, retained on the ledger row for audit
    pub raw: Value,
}

/// One page worth of pull-based results.
#[derive(Debug, Clone, Default)]
pub struct ProviderPage {
    pub records: Vec<RawOrderRecord>,
    /// Records that failed to parse — counted, never fatal
    pub malformed: u64,
    /// Cursor for the next page; `None` means the walk is done
    pub next_cursor: Option<String>,
    /// Authoritative total count, when the provider reports one
    pub total_count: Option<u64>,
}

/// Parameters for one page fetch.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub page_size: u32,
    /// Lower bound for incremental syncs
    pub since: Option<DateTime<Utc>>,
}

/// How a provider encodes its webhook signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

/// Signature material extracted from webhook headers.
#[derive(Debug, Clone)]
pub struct WebhookSignature {
    pub value: String,
    pub encoding: SignatureEncoding,
}

/// Capability interface implemented once per upstream provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fetch one page of orders. Implementations retry transient failures
    /// with bounded backoff before surfacing an error.
    async fn fetch_page(
        &self,
        integration: &Integration,
        request: &PageRequest,
    ) -> Result<ProviderPage, SyncError>;

    /// Extract the provider-side store identifier from an inbound webhook,
    /// used to resolve the owning operation.
    fn webhook_store_identifier(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<String, SyncError>;

    /// Signature material for webhook verification, when the provider
    /// signs deliveries.
    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature>;

    /// Parse a webhook payload into a single record.
    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<RawOrderRecord, SyncError>;
}

/// Static registry mapping provider kinds to their adapters.
///
/// Built once at startup; the sync orchestrator and webhook processor look
/// adapters up by kind instead of dispatching on payload shapes.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Arc<HashMap<ProviderKind, Arc<dyn ProviderAdapter>>>,
}

impl AdapterRegistry {
    /// Registry with the standard production adapters.
    pub fn standard(client: reqwest::Client, max_retries: u32) -> Self {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(ShopifyAdapter::new(client.clone(), max_retries)),
            Arc::new(CartpandaAdapter::new(client.clone(), max_retries)),
            Arc::new(Digistore24Adapter::new(client.clone(), max_retries)),
            Arc::new(ElogyAdapter::new(client.clone(), max_retries)),
            Arc::new(FhbAdapter::new(client, max_retries)),
        ];
        Self::with_adapters(adapters)
    }

    /// Registry from explicit adapters (tests use this with stub adapters).
    pub fn with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: Arc::new(adapters.into_iter().map(|a| (a.kind(), a)).collect()),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

/// Shared helper: read a decimal that providers send as string or number.
pub(crate) fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Shared helper: RFC 3339 timestamp field.
pub(crate) fn datetime_field(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
