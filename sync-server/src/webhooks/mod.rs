//! Webhook event processor
//!
//! Applies single-event updates pushed by upstream providers, independent
//! of orchestrator runs but through the exact same staging path, so a
//! webhook-driven update and a later poll-driven update converge on one
//! row. Matching never runs inline here — the background sweeper picks the
//! order up on its next pass.

use base64::Engine;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;
use shared::error::{AppError, ErrorCode};
use shared::provider::ProviderKind;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::VerificationMode;
use crate::costs::CostLinkStore;
use crate::error::SyncError;
use crate::integrations::{select_webhook_integration, IntegrationStore};
use crate::ledger::OrderLedger;
use crate::providers::{AdapterRegistry, SignatureEncoding, WebhookSignature};
use crate::sync::staging;

/// Result of applying one webhook event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookOutcome {
    pub operation_id: Uuid,
    pub order_id: String,
    pub created: bool,
}

pub struct WebhookProcessor {
    ledger: Arc<dyn OrderLedger>,
    integrations: Arc<dyn IntegrationStore>,
    cost_links: Arc<dyn CostLinkStore>,
    adapters: AdapterRegistry,
    mode: VerificationMode,
}

impl WebhookProcessor {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        integrations: Arc<dyn IntegrationStore>,
        cost_links: Arc<dyn CostLinkStore>,
        adapters: AdapterRegistry,
        mode: VerificationMode,
    ) -> Self {
        Self {
            ledger,
            integrations,
            cost_links,
            adapters,
            mode,
        }
    }

    /// Verify, resolve the owning operation, and apply one event.
    pub async fn handle(
        &self,
        kind: ProviderKind,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, AppError> {
        let adapter = self
            .adapters
            .get(kind)
            .ok_or_else(|| AppError::internal(format!("no adapter for provider {kind}")))?;

        let store_identifier = adapter
            .webhook_store_identifier(headers, body)
            .map_err(|e| AppError::with_message(ErrorCode::WebhookPayloadInvalid, e.to_string()))?;

        let rows = self
            .integrations
            .find_by_store_identifier(kind, &store_identifier)
            .await
            .map_err(|e| {
                tracing::error!("Integration lookup failed: {e}");
                AppError::new(ErrorCode::InternalError)
            })?;
        let integration = select_webhook_integration(rows).ok_or_else(|| {
            AppError::with_message(
                ErrorCode::IntegrationNotFound,
                format!("no integration for {kind} store {store_identifier}"),
            )
        })?;

        if let Err(reason) = self.check_signature(&integration.webhook_secret, &adapter.webhook_signature(headers), body)
        {
            match self.mode {
                VerificationMode::Strict => {
                    tracing::warn!(
                        provider = %kind,
                        store = %store_identifier,
                        "Webhook rejected: {reason}"
                    );
                    return Err(AppError::with_message(
                        ErrorCode::WebhookSignatureInvalid,
                        reason,
                    ));
                }
                VerificationMode::Relaxed => {
                    tracing::warn!(
                        provider = %kind,
                        store = %store_identifier,
                        "APPLYING UNVERIFIED WEBHOOK (relaxed mode): {reason}"
                    );
                }
            }
        }

        let record = adapter
            .parse_webhook(headers, body)
            .map_err(|e| AppError::with_message(ErrorCode::WebhookPayloadInvalid, e.to_string()))?;

        let outcome = staging::stage_record(
            self.ledger.as_ref(),
            self.cost_links.as_ref(),
            integration.operation_id,
            integration.store_id,
            &record,
        )
        .await
        .map_err(AppError::from)?;

        tracing::info!(
            provider = %kind,
            operation_id = %integration.operation_id,
            order_id = %outcome.order.id,
            created = outcome.created,
            "Webhook applied"
        );

        Ok(WebhookOutcome {
            operation_id: integration.operation_id,
            order_id: outcome.order.id,
            created: outcome.created,
        })
    }

    fn check_signature(
        &self,
        secret: &Option<String>,
        signature: &Option<WebhookSignature>,
        body: &[u8],
    ) -> Result<(), String> {
        let Some(secret) = secret else {
            return Err("no webhook secret configured for integration".into());
        };
        let Some(signature) = signature else {
            return Err("missing signature header".into());
        };
        verify_signature(body, signature, secret).map_err(|e| e.to_string())
    }
}

/// HMAC-SHA256 over the raw body, compared in constant time.
pub fn verify_signature(
    body: &[u8],
    signature: &WebhookSignature,
    secret: &str,
) -> Result<(), SyncError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SyncError::SignatureVerification("invalid HMAC key".into()))?;
    mac.update(body);

    let provided = match signature.encoding {
        SignatureEncoding::Hex => hex::decode(&signature.value)
            .map_err(|_| SyncError::SignatureVerification("invalid hex signature".into()))?,
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(&signature.value)
            .map_err(|_| SyncError::SignatureVerification("invalid base64 signature".into()))?,
    };

    mac.verify_slice(&provided)
        .map_err(|_| SyncError::SignatureVerification("signature mismatch".into()))
}

/// Compute the signature a provider would attach (test fixtures and the
/// outbound delivery simulator use this).
pub fn sign_body(body: &[u8], secret: &str, encoding: SignatureEncoding) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    match encoding {
        SignatureEncoding::Hex => hex::encode(digest),
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(digest),
    }
}
