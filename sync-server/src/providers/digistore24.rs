//! Digistore24 adapter
//!
//! Pull: `listPurchases` API call with the `X-DS-API-KEY` header, page-number
//! cursor with an authoritative page count. Push: IPN-style notifications
//! signed with HMAC-SHA256 (hex) in `X-DS-Signature`, vendor resolved from
//! the payload's `vendor_id` field.

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

const BASE_URL: &str = "https://www.digistore24.com/api/call";

pub struct Digistore24Adapter {
    client: reqwest::Client,
    max_retries: u32,
}

impl Digistore24Adapter {
    pub fn new(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    pub(crate) fn parse_purchase(value: &Value) -> Result<RawOrderRecord, SyncError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::MalformedRecord("digistore24 purchase missing id".into()))?
            .to_string();

        let buyer = value.get("buyer").cloned().unwrap_or(Value::Null);

        let name = match (
            buyer.get("first_name").and_then(Value::as_str),
            buyer.get("last_name").and_then(Value::as_str),
        ) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
            (None, None) => None,
        };

        let sku_list = value
            .get("sku")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();

        Ok(RawOrderRecord {
            provider: ProviderKind::Digistore24,
            upstream_id: id,
            external_reference: None,
            status_raw: value
                .get("billing_status")
                .and_then(Value::as_str)
                .unwrap_or("pending")
                .to_string(),
            payment_status_raw: value
                .get("billing_status")
                .and_then(Value::as_str)
                .map(String::from),
            customer_name: name,
            customer_email: buyer
                .get("email")
                .and_then(Value::as_str)
                .map(String::from),
            customer_phone: buyer
                .get("phone_no")
                .and_then(Value::as_str)
                .map(String::from),
            street: buyer
                .get("street")
                .and_then(Value::as_str)
                .map(String::from),
            city: buyer.get("city").and_then(Value::as_str).map(String::from),
            zip: buyer
                .get("zipcode")
                .and_then(Value::as_str)
                .map(String::from),
            country: buyer
                .get("country")
                .and_then(Value::as_str)
                .map(String::from),
            total: value
                .get("amount")
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
impl ProviderAdapter for Digistore24Adapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Digistore24
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
            "{BASE_URL}/listPurchases/?page_size={}&page_no={page}",
            request.page_size
        );
        if let Some(since) = request.since {
            url.push_str(&format!("&from={}", since.format("%Y-%m-%d")));
        }

        let body: Value = with_backoff("digistore24.fetch_page", self.max_retries, || {
            let req = self
                .client
                .get(&url)
                .header("X-DS-API-KEY", integration.api_key.as_str());
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

        // The API wraps errors in a 200 with result != success
        if body.get("result").and_then(Value::as_str) == Some("error") {
            let msg = body
                .pointer("/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown api error");
            if msg.contains("api key") || msg.contains("permission") {
                return Err(SyncError::Auth(msg.to_string()));
            }
            return Err(SyncError::Transient(msg.to_string()));
        }

        let purchases = body
            .pointer("/data/purchase_list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = ProviderPage::default();
        for purchase in &purchases {
            match Self::parse_purchase(purchase) {
                Ok(record) => out.records.push(record),
                Err(e) => {
                    out.malformed += 1;
                    tracing::warn!(provider = "digistore24", "Skipping malformed purchase: {e}");
                }
            }
        }

        let page_count = body
            .pointer("/data/page_count")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        if u64::from(page) < page_count {
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
            .get("vendor_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| SyncError::MalformedRecord("webhook missing vendor_id".into()))
    }

    fn webhook_signature(&self, headers: &HeaderMap) -> Option<WebhookSignature> {
        headers
            .get("x-ds-signature")
            .and_then(|v| v.to_str().ok())
            .map(|value| WebhookSignature {
                value: value.to_string(),
                encoding: SignatureEncoding::Hex,
            })
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<RawOrderRecord, SyncError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRecord(format!("invalid webhook json: {e}")))?;
        let purchase = value.get("purchase").unwrap_or(&value);
        Self::parse_purchase(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn purchase_json() -> Value {
        serde_json::json!({
            "id": "DS-20250601-7788",
            "billing_status": "completed",
            "amount": "97.00",
            "currency": "EUR",
            "sku": "COURSE01",
            "created_at": "2025-06-01T09:15:00Z",
            "buyer": {
                "first_name": "Marta", "last_name": "Lopes",
                "email": "marta@example.com", "phone_no": "+351933334444",
                "street": "Rua B 2", "city": "porto", "zipcode": "4000-001", "country": "PT"
            }
        })
    }

    #[test]
    fn test_parse_purchase() {
        let record = Digistore24Adapter::parse_purchase(&purchase_json()).unwrap();
        assert_eq!(record.upstream_id, "DS-20250601-7788");
        assert_eq!(record.status_raw, "completed");
        assert_eq!(record.total, dec!(97.00));
        assert_eq!(record.sku_list, vec!["COURSE01".to_string()]);
    }

    #[test]
    fn test_webhook_vendor_resolution() {
        let adapter = Digistore24Adapter::new(reqwest::Client::new(), 3);
        let body = serde_json::json!({"vendor_id": "vendor-42", "purchase": purchase_json()});
        let bytes = serde_json::to_vec(&body).unwrap();
        assert_eq!(
            adapter
                .webhook_store_identifier(&HeaderMap::new(), &bytes)
                .unwrap(),
            "vendor-42"
        );
    }
}
