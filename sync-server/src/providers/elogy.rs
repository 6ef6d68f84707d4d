//! eLogy fulfillment adapter
//!
//! Pull: `POST /api/v2/orders/search` with bearer auth and a page-number
//! cursor; the response carries an authoritative total. Push: shipment
//! status webhooks signed with HMAC-SHA256 (hex) in `X-Elogy-Signature`,
//! workspace resolved from the `X-Elogy-Workspace` header.
//!
//! eLogy echoes the checkout platform's order number in the `reference`
//! field, which makes it the strongest matching signal downstream.

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

const BASE_URL: &str = "https://app.elogy.io/api/v2";

pub struct ElogyAdapter {
    client: reqwest::Client,
    max_retries: u32,
}

impl ElogyAdapter {
    pub fn new(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    pub(crate) fn parse_shipment(value: &Value) -> Result<RawOrderRecord, SyncError> {
        let id = value
            .get("order_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::MalformedRecord("elogy shipment missing order_id".into()))?
            .to_string();

        let recipient = value.get("recipient").cloned().unwrap_or(Value::Null);

        let sku_list = value
            .get("products")
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
            provider: ProviderKind::Elogy,
            upstream_id: id,
            external_reference: value
                .get("reference")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            status_raw: value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("waiting")
                .to_string(),
            payment_status_raw: None,
            customer_name: recipient
                .get("name")
                .and_then(Value::as_str)
                .map(String::from),
            customer_email: recipient
                .get("email")
                .and_then(Value::as_str)
                .map(String::from),
            customer_phone: recipient
                .get("phone")
                .and_then(Value::as_str)
                .map(String::from),
            street: recipient
                .get("address")
                .and_then(Value::as_str)
                .map(String::from),
            city: recipient
                .get("city")
                .and_then(Value::as_str)
                .map(String::from),
            zip: recipient
                .get("zip")
                .and_then(Value::as_str)
                .map(String::from),
            country: recipient
                .get("country")
                .and_then(Value::as_str)
                .map(String::from),
            total: value
                .get("cod_amount")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO),
            currency: value
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            sku_list,
            tracking_number: value
                .get("tracking_number")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            order_date: value.get("created_at").and_then(datetime_field),
            raw: value.clone(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ElogyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Elogy
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
        let mut search = serde_json::json!({
            "workspace": integration.store_identifier,
            "page": page,
            "per_page": request.page_size,
        });
        if let Some(since) = request.since {
            search["updated_after"] = Value::String(since.to_rfc3339());
        }

        let url = format!("{BASE_URL}/orders/search");
        let body: Value = with_backoff("elogy.fetch_page", self.max_retries, || {
            let req = self
                .client
                .post(&url)
                .bearer_auth(&integration.api_key)
                .json(&search);
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

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = ProviderPage {
            total_count: body.get("total").and_then(Value::as_u64),
            ..Default::default()
        };
        for item in &items {
            match Self::parse_shipment(item) {
                Ok(record) => out.records.push(record),
                Err(e) => {
                    out.malformed += 1;
                    tracing::warn!(provider = "elogy", "Skipping malformed shipment: {e}");
                }
            }
        }

        if items.len() as u32 >= request.page_size {
            out.next_cursor = Some((page + 1).to_string());
        }
        Ok(out)
    }

    fn webhook_store_identifier(
        &self,
        headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<String, SyncError> {
        headers
            .get("x-elogy-workspace")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| SyncError::MalformedRecord("missing X-Elogy-Workspace header".into()))
    }

    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature> {
        headers
            .get("x-elogy-signature")
            .and_then(|v| v.to_str().ok())
            .map(|value| WebhookSignature {
                value: value.to_string(),
                encoding: SignatureEncoding::Hex,
            })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<RawOrderRecord, SyncError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRecord(format!("invalid webhook json: {e}")))?;
        let shipment = value.get("order").unwrap_or(&value);
        Self::parse_shipment(shipment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn shipment_json() -> Value {
        serde_json::json!({
            "order_id": "EL-55012",
            "reference": "1001",
            "status": "delivery",
            "tracking_number": "PT123456789",
            "cod_amount": "49.90",
            "currency": "EUR",
            "created_at": "2025-05-08T08:00:00Z",
            "recipient": {
                "name": "Ana Silva", "phone": "+351911111111",
                "address": "Rua A 1", "city": "Lisboa", "zip": "1000-001", "country": "PT"
            },
            "products": [{"sku": "abc123"}]
        })
    }

    #[test]
    fn test_parse_shipment() {
        let record = ElogyAdapter::parse_shipment(&shipment_json()).unwrap();
        assert_eq!(record.upstream_id, "EL-55012");
        assert_eq!(record.external_reference.as_deref(), Some("1001"));
        assert_eq!(record.status_raw, "delivery");
        assert_eq!(record.tracking_number.as_deref(), Some("PT123456789"));
        assert_eq!(record.total, dec!(49.90));
    }

    #[test]
    fn test_empty_reference_is_none() {
        let mut json = shipment_json();
        json["reference"] = Value::String(String::new());
        let record = ElogyAdapter::parse_shipment(&json).unwrap();
        assert!(record.external_reference.is_none());
    }
}
