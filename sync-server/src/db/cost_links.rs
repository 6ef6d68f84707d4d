//! Product cost link store

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::costs::{CostLinkStore, ProductCostLink};
use crate::ledger::LedgerError;
use crate::mapper::normalize_sku_token;

#[derive(Clone)]
pub struct PgCostLinkStore {
    pool: PgPool,
}

impl PgCostLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<ProductCostLink, LedgerError> {
    Ok(ProductCostLink {
        operation_id: row.try_get("operation_id")?,
        store_id: row.try_get("store_id")?,
        sku: row.try_get("sku")?,
        cost_price: row.try_get("cost_price")?,
        shipping_cost: row.try_get("shipping_cost")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CostLinkStore for PgCostLinkStore {
    async fn upsert(&self, mut link: ProductCostLink) -> Result<ProductCostLink, LedgerError> {
        link.sku = normalize_sku_token(&link.sku);
        let row = sqlx::query(
            r#"
            INSERT INTO product_cost_links (operation_id, store_id, sku, cost_price, shipping_cost, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (operation_id, sku)
            DO UPDATE SET store_id = EXCLUDED.store_id,
                          cost_price = EXCLUDED.cost_price,
                          shipping_cost = EXCLUDED.shipping_cost,
                          updated_at = EXCLUDED.updated_at
            RETURNING operation_id, store_id, sku, cost_price, shipping_cost, updated_at
            "#,
        )
        .bind(link.operation_id)
        .bind(link.store_id)
        .bind(&link.sku)
        .bind(link.cost_price)
        .bind(link.shipping_cost)
        .bind(link.updated_at)
        .fetch_one(&self.pool)
        .await?;
        from_row(&row)
    }

    async fn links_for_skus(
        &self,
        operation_id: Uuid,
        skus: &[String],
    ) -> Result<Vec<ProductCostLink>, LedgerError> {
        if skus.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT operation_id, store_id, sku, cost_price, shipping_cost, updated_at
             FROM product_cost_links
             WHERE operation_id = $1 AND sku = ANY($2)
             ORDER BY sku",
        )
        .bind(operation_id)
        .bind(skus)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }
}
