//! CartPanda adapter
//!
//! Pull: `GET /api/{shop_slug}/orders` with bearer auth, page-number cursor.
//! Push: order webhooks signed with HMAC-SHA256 (hex) in `X-CartPanda-Hmac`,
//! shop resolved from the payload's `shop_slug` field.

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

const BASE_URL: &str = "https://accounts.cartpanda.com/api";

pub struct CartpandaAdapter {
    client: reqwest::Client,
    max_retries: u32,
}

impl CartpandaAdapter {
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
                v.as_i64()
                    .map(|n| n.to_string())
                    .or_else(|| v.as_str().map(String::from))
            })
            .ok_or_else(|| SyncError::MalformedRecord("cartpanda order missing id".into()))?;

        let customer = value.get("customer").cloned().unwrap_or(Value::Null);
        let shipping = value
            .get("shipping_address")
            .cloned()
            .unwrap_or(Value::Null);

        let sku_list = value
            .get("line_items")
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
            provider: ProviderKind::Cartpanda,
            upstream_id: id,
            external_reference: None,
            status_raw: value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("pending")
                .to_string(),
            payment_status_raw: value
                .get("payment_status")
                .and_then(Value::as_str)
                .map(String::from),
            customer_name: customer
                .get("full_name")
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
            street: shipping
                .get("address")
                .and_then(Value::as_str)
                .map(String::from),
            city: shipping
                .get("city")
                .and_then(Value::as_str)
                .map(String::from),
            zip: shipping.get("zip").and_then(Value::as_str).map(String::from),
            country: shipping
                .get("country")
                .and_then(Value::as_str)
                .map(String::from),
            total: value
                .get("total")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO),
            currency: value
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            sku_list,
            tracking_number: None,
            order_date: value.get("created_at").and_then(datetime_field),
            raw: value.clone(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for CartpandaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cartpanda
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
            "{BASE_URL}/{}/orders?limit={}&page={page}",
            integration.store_identifier, request.page_size
        );
        if let Some(since) = request.since {
            url.push_str(&format!("&updated_since={}", since.to_rfc3339()));
        }

        let body: Value = with_backoff("cartpanda.fetch_page", self.max_retries, || {
            let req = self.client.get(&url).bearer_auth(&integration.api_key);
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
            .pointer("/orders/data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = ProviderPage {
            total_count: body.pointer("/orders/total").and_then(Value::as_u64),
            ..Default::default()
        };
        for order in &orders {
            match Self::parse_order(order) {
                Ok(record) => out.records.push(record),
                Err(e) => {
                    out.malformed += 1;
                    tracing::warn!(provider = "cartpanda", "Skipping malformed order: {e}");
                }
            }
        }

        let has_next = body
            .pointer("/orders/next_page_url")
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if has_next && orders.len() as u32 >= request.page_size {
            out.next_cursor = Some((page + 1).to_string());
        }
        Ok(out)
    }

    fn webhook_store_identifier(
        &self,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<String, SyncError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRecord(format!("invalid webhook json: {e}")))?;
        value
            .get("shop_slug")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| SyncError::MalformedRecord("webhook missing shop_slug".into()))
    }

    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature> {
        headers
            .get("x-cartpanda-hmac")
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_json() -> Value {
        serde_json::json!({
            "id": 88001,
            "status": "paid",
            "payment_status": "paid",
            "total": "129.00",
            "currency": "BRL",
            "created_at": "2025-06-11T14:30:00Z",
            "customer": {"full_name": "João Costa", "email": "joao@example.com", "phone": "+5511988887777"},
            "shipping_address": {"address": "Av. Paulista 1000", "city": "são paulo", "zip": "01310-100", "country": "br"},
            "line_items": [{"sku": "KIT01"}, {"sku": "KIT02"}]
        })
    }

    #[test]
    fn test_parse_order() {
        let record = CartpandaAdapter::parse_order(&order_json()).unwrap();
        assert_eq!(record.upstream_id, "88001");
        assert_eq!(record.total, dec!(129.00));
        assert_eq!(record.sku_list.len(), 2);
        assert_eq!(record.customer_phone.as_deref(), Some("+5511988887777"));
    }

    #[test]
    fn test_webhook_shop_resolution_from_payload() {
        let adapter = CartpandaAdapter::new(reqwest::Client::new(), 3);
        let body = serde_json::json!({"shop_slug": "acme-br", "order": order_json()});
        let bytes = serde_json::to_vec(&body).unwrap();
        assert_eq!(
            adapter
                .webhook_store_identifier(&HeaderMap::new(), &bytes)
                .unwrap(),
            "acme-br"
        );
        let record = adapter.parse_webhook(&HeaderMap::new(), &bytes).unwrap();
        assert_eq!(record.upstream_id, "88001");
    }
}
