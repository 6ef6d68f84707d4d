//! Integration configuration store

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::integrations::{Integration, IntegrationStore};
use crate::ledger::LedgerError;
use shared::provider::ProviderKind;

#[derive(Clone)]
pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, operation_id, store_id, provider, store_identifier, api_key, \
                       api_secret, webhook_secret, enabled, created_at, updated_at";

fn from_row(row: &sqlx::postgres::PgRow) -> Result<Integration, LedgerError> {
    let provider: String = row.try_get("provider")?;
    Ok(Integration {
        id: row.try_get("id")?,
        operation_id: row.try_get("operation_id")?,
        store_id: row.try_get("store_id")?,
        provider: provider
            .parse::<ProviderKind>()
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        store_identifier: row.try_get("store_identifier")?,
        api_key: row.try_get("api_key")?,
        api_secret: row.try_get("api_secret")?,
        webhook_secret: row.try_get("webhook_secret")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn enabled_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<Integration>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM integrations
             WHERE operation_id = $1 AND enabled = TRUE ORDER BY id"
        ))
        .bind(operation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }

    async fn find_by_store_identifier(
        &self,
        provider: ProviderKind,
        store_identifier: &str,
    ) -> Result<Vec<Integration>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM integrations
             WHERE provider = $1 AND store_identifier = $2 ORDER BY id"
        ))
        .bind(provider.as_str())
        .bind(store_identifier)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }
}
