//! FHB fulfillment adapter
//!
//! Pull: `GET /v1/orders` with basic auth (api key + secret), page-number
//! cursor from the response's `next_page`. Push: status webhooks signed with
//! HMAC-SHA256 (hex) in `X-FHB-Signature`, client resolved from the
//! `X-FHB-Client` header.
//!
//! FHB carries the platform order number in `variable_symbol` when the
//! upstream shop filled it in.

use async_trait::async_trait;
use http::HeaderMap;
use rust_decimal::Decimal;
use serde_json::Value;
use shared::provider::ProviderKind;

use super::retry::{classify_status, truncate_excerpt, with_backoff};
use super::{
    datetime_field, decimal_field, PageRequest, ProviderAdapter, ProviderPage, RawOrderRecord,
    SignatureEncoding, WebhookSignature,
};
use crate::error::SyncError;
use crate::integrations::Integration;

const BASE_URL: &str = "https://api.fhb.sk/v1";

pub struct FhbAdapter {
    client: reqwest::Client,
    max_retries: u32,
}

impl FhbAdapter {
    pub fn new(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    pub(crate) fn parse_order(value: &Value) -> Result<RawOrderRecord, SyncError> {
        let id = value
            .get("id")
            .and_then(|v| {
                v.as_str()
                    .map(String::from)
                    .or_else(|| v.as_i64().map(|n| n.to_string()))
            })
            .ok_or_else(|| SyncError::MalformedRecord("fhb order missing id".into()))?;

        let customer = value.get("customer").cloned().unwrap_or(Value::Null);

        let sku_list = value
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("sku").and_then(Value::as_str))
                    .filter(|sku| !sku.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(RawOrderRecord {
            provider: ProviderKind::Fhb,
            upstream_id: id,
            external_reference: value
                .get("variable_symbol")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            status_raw: value
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("new")
                .to_string(),
            payment_status_raw: None,
            customer_name: customer
                .get("name")
                .and_then(Value::as_str)
                .map(String::from),
            customer_email: customer
                .get("email")
                .and_then(Value::as_str)
                .map(String::from),
            customer_phone: customer
                .get("phone")
                .and_then(Value::as_str)
                .map(String::from),
            street: customer
                .get("street")
                .and_then(Value::as_str)
                .map(String::from),
            city: customer
                .get("city")
                .and_then(Value::as_str)
                .map(String::from),
            zip: customer.get("zip").and_then(Value::as_str).map(String::from),
            country: customer
                .get("country")
                .and_then(Value::as_str)
                .map(String::from),
            total: value
                .get("price_total")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO),
            currency: value
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            sku_list,
            tracking_number: value
                .get("tracking")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            order_date: value.get("ordered_at").and_then(datetime_field),
            raw: value.clone(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for FhbAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fhb
    }

    async fn fetch_page(
        &self,
        integration: &Integration,
        request: &PageRequest,
    ) -> Result<ProviderPage, SyncError> {
        let page: u32 = request
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(1);
        let mut url = format!(
            "{BASE_URL}/orders?client={}&per_page={}&page={page}",
            integration.store_identifier, request.page_size
        );
        if let Some(since) = request.since {
            url.push_str(&format!("&updated_from={}", since.to_rfc3339()));
        }

        let body: Value = with_backoff("fhb.fetch_page", self.max_retries, || {
            let req = self
                .client
                .get(&url)
                .basic_auth(&integration.api_key, integration.api_secret.as_deref());
            async move {
                let resp = req.send().await?;
                let status = resp.status();
                if !status.is_success() {
                    let excerpt = resp.text().await.unwrap_or_default();
                    return Err(classify_status(status, truncate_excerpt(&excerpt, 200)));
                }
                resp.json::<Value>().await.map_err(SyncError::from)
            }
        })
        .await?;

        let orders = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = ProviderPage::default();
        for order in &orders {
            match Self::parse_order(order) {
                Ok(record) => out.records.push(record),
                Err(e) => {
                    out.malformed += 1;
                    tracing::warn!(provider = "fhb", "Skipping malformed order: {e}");
                }
            }
        }

        out.next_cursor = body
            .get("next_page")
            .and_then(Value::as_u64)
            .map(|p| p.to_string());
        Ok(out)
    }

    fn webhook_store_identifier(
        &self,
        headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<String, SyncError> {
        headers
            .get("x-fhb-client")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| SyncError::MalformedRecord("missing X-FHB-Client header".into()))
    }

    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature> {
        headers
            .get("x-fhb-signature")
            .and_then(|v| v.to_str().ok())
            .map(|value| WebhookSignature {
                value: value.to_string(),
                encoding: SignatureEncoding::Hex,
            })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<RawOrderRecord, SyncError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRecord(format!("invalid webhook json: {e}")))?;
        let order = value.get("order").unwrap_or(&value);
        Self::parse_order(order)
    }
}
