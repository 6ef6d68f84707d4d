//! Configured upstream integrations
//!
//! One [`Integration`] per connected upstream per operation. Credentials are
//! read from here by the provider adapters; the webhook processor resolves
//! the owning operation through the provider-side store identifier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::provider::ProviderKind;
use uuid::Uuid;

use crate::ledger::LedgerError;

/// A configured upstream source for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub store_id: Uuid,
    pub provider: ProviderKind,
    /// Provider-side store identifier (e.g. the Shopify shop domain) used to
    /// resolve inbound webhooks to an operation
    pub store_identifier: String,
    pub api_key: String,
    pub api_secret: Option<String>,
    /// Secret for webhook signature verification; absent for integrations
    /// registered before webhooks were configured
    pub webhook_secret: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read access to integration configuration.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Enabled integrations for an operation, ordered by id.
    async fn enabled_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<Integration>, LedgerError>;

    /// All integrations registered for a provider store identifier.
    ///
    /// More than one row can match when a store was registered twice; the
    /// caller prefers the row with a webhook secret configured.
    async fn find_by_store_identifier(
        &self,
        provider: ProviderKind,
        store_identifier: &str,
    ) -> Result<Vec<Integration>, LedgerError>;
}

/// Pick the integration an inbound webhook belongs to.
///
/// Duplicate registrations for the same store identifier do occur; prefer
/// the row that can actually verify the payload, then fall back to the
/// lowest id for determinism.
pub fn select_webhook_integration(mut rows: Vec<Integration>) -> Option<Integration> {
    rows.sort_by_key(|i| i.id);
    rows.iter()
        .find(|i| i.webhook_secret.is_some())
        .cloned()
        .or_else(|| rows.into_iter().next())
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryIntegrationStore {
    rows: RwLock<Vec<Integration>>,
}

impl MemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, integration: Integration) {
        self.rows.write().push(integration);
    }
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn enabled_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<Integration>, LedgerError> {
        let mut rows: Vec<Integration> = self
            .rows
            .read()
            .iter()
            .filter(|i| i.operation_id == operation_id && i.enabled)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.id);
        Ok(rows)
    }

    async fn find_by_store_identifier(
        &self,
        provider: ProviderKind,
        store_identifier: &str,
    ) -> Result<Vec<Integration>, LedgerError> {
        let mut rows: Vec<Integration> = self
            .rows
            .read()
            .iter()
            .filter(|i| i.provider == provider && i.store_identifier == store_identifier)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.id);
        Ok(rows)
    }
}
