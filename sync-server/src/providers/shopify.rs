//! Shopify adapter
//!
//! Pull: Admin REST API `orders.json`, cursor = `since_id` of the last seen
//! order. Push: order webhooks signed with HMAC-SHA256 (base64) over the raw
//! body, shop resolved from the `X-Shopify-Shop-Domain` header.

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

const API_VERSION: &str = "2024-01";

pub struct ShopifyAdapter {
    client: reqwest::Client,
    max_retries: u32,
}

impl ShopifyAdapter {
    pub fn new(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    /// Parse one order object from a page or webhook payload.
    pub(crate) fn parse_order(value: &Value) -> Result<RawOrderRecord, SyncError> {
        let id = value
            .get("id")
            .and_then(|v| {
                v.as_i64()
                    .map(|n| n.to_string())
                    .or_else(|| v.as_str().map(String::from))
            })
            .ok_or_else(|| SyncError::MalformedRecord("shopify order missing id".into()))?;

        let customer = value.get("customer").cloned().unwrap_or(Value::Null);
        let address = value
            .get("shipping_address")
            .cloned()
            .unwrap_or(Value::Null);

        let name = match (
            customer.get("first_name").and_then(Value::as_str),
            customer.get("last_name").and_then(Value::as_str),
        ) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        };

        // Fulfillment state outranks the payment state when present
        let status_raw = value
            .get("fulfillment_status")
            .and_then(Value::as_str)
            .or_else(|| value.get("financial_status").and_then(Value::as_str))
            .unwrap_or("pending")
            .to_string();

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
            provider: ProviderKind::Shopify,
            upstream_id: id,
            external_reference: None,
            status_raw,
            payment_status_raw: value
                .get("financial_status")
                .and_then(Value::as_str)
                .map(String::from),
            customer_name: name,
            customer_email: value
                .get("email")
                .and_then(Value::as_str)
                .map(String::from),
            customer_phone: customer
                .get("phone")
                .and_then(Value::as_str)
                .or_else(|| value.get("phone").and_then(Value::as_str))
                .map(String::from),
            street: address
                .get("address1")
                .and_then(Value::as_str)
                .map(String::from),
            city: address.get("city").and_then(Value::as_str).map(String::from),
            zip: address.get("zip").and_then(Value::as_str).map(String::from),
            country: address
                .get("country_code")
                .and_then(Value::as_str)
                .map(String::from),
            total: value
                .get("total_price")
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
impl ProviderAdapter for ShopifyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Shopify
    }

    async fn fetch_page(
        &self,
        integration: &Integration,
        request: &PageRequest,
    ) -> Result<ProviderPage, SyncError> {
        let mut url = format!(
            "https://{}/admin/api/{API_VERSION}/orders.json?status=any&limit={}",
            integration.store_identifier, request.page_size
        );
        if let Some(since_id) = &request.cursor {
            url.push_str(&format!("&since_id={since_id}"));
        }
        if let Some(since) = request.since {
            url.push_str(&format!("&updated_at_min={}", since.to_rfc3339()));
        }

        let body: Value = with_backoff("shopify.fetch_page", self.max_retries, || {
            let req = self
                .client
                .get(&url)
                .header("X-Shopify-Access-Token", integration.api_key.as_str());
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
            .get("orders")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut page = ProviderPage::default();
        for order in &orders {
            match Self::parse_order(order) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    page.malformed += 1;
                    tracing::warn!(provider = "shopify", "Skipping malformed order: {e}");
                }
            }
        }

        // Short page means last page; otherwise continue from the last id
        if orders.len() as u32 >= request.page_size {
            page.next_cursor = page.records.last().map(|r| r.upstream_id.clone());
        }
        Ok(page)
    }

    fn webhook_store_identifier(
        &self,
        headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<String, SyncError> {
        headers
            .get("x-shopify-shop-domain")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                SyncError::MalformedRecord("missing X-Shopify-Shop-Domain header".into())
            })
    }

    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature> {
        headers
            .get("x-shopify-hmac-sha256")
            .and_then(|v| v.to_str().ok())
            .map(|value| WebhookSignature {
                value: value.to_string(),
                encoding: SignatureEncoding::Base64,
            })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<RawOrderRecord, SyncError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRecord(format!("invalid webhook json: {e}")))?;
        Self::parse_order(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_json() -> Value {
        serde_json::json!({
            "id": 4567,
            "email": "ana@example.com",
            "financial_status": "paid",
            "fulfillment_status": null,
            "total_price": "49.90",
            "currency": "EUR",
            "created_at": "2025-05-02T10:00:00Z",
            "customer": {"first_name": "Ana", "last_name": "Silva", "phone": "+351 911 111 111"},
            "shipping_address": {"address1": "Rua A 1", "city": "lisboa", "zip": "1000-001", "country_code": "PT"},
            "line_items": [{"sku": "ABC123+XYZ999", "quantity": 1}]
        })
    }

    #[test]
    fn test_parse_order() {
        let record = ShopifyAdapter::parse_order(&order_json()).unwrap();
        assert_eq!(record.upstream_id, "4567");
        assert_eq!(record.status_raw, "paid");
        assert_eq!(record.total, dec!(49.90));
        assert_eq!(record.customer_name.as_deref(), Some("Ana Silva"));
        assert_eq!(record.sku_list, vec!["ABC123+XYZ999".to_string()]);
    }

    #[test]
    fn test_fulfillment_status_outranks_financial() {
        let mut json = order_json();
        json["fulfillment_status"] = serde_json::json!("fulfilled");
        let record = ShopifyAdapter::parse_order(&json).unwrap();
        assert_eq!(record.status_raw, "fulfilled");
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let mut json = order_json();
        json.as_object_mut().unwrap().remove("id");
        assert!(matches!(
            ShopifyAdapter::parse_order(&json),
            Err(SyncError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_webhook_headers() {
        let adapter = ShopifyAdapter::new(reqwest::Client::new(), 3);
        let mut headers = HeaderMap::new();
        headers.insert("x-shopify-shop-domain", "acme.myshopify.com".parse().unwrap());
        headers.insert("x-shopify-hmac-sha256", "c2lnbg==".parse().unwrap());

        assert_eq!(
            adapter.webhook_store_identifier(&headers, b"{}").unwrap(),
            "acme.myshopify.com"
        );
        let sig = adapter.webhook_signature(&headers).unwrap();
        assert_eq!(sig.encoding, SignatureEncoding::Base64);
        assert_eq!(sig.value, "c2lnbg==");
    }
}
