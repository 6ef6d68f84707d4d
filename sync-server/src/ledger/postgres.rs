//! PostgreSQL ledger
//!
//! Raw sqlx queries over the `orders` table. Upserts read the existing row
//! `FOR UPDATE` inside a transaction, merge in Rust, and write back, so the
//! merge policy lives in exactly one place (`super::merge`) for both
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use super::{merge, LedgerError, MatchSide, OrderLedger, UpsertOutcome};
use shared::order::{CustomerSnapshot, Order, OrderStatus, PaymentStatus};
use shared::provider::DataSource;

#[derive(Clone)]
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    id, store_id, operation_id, data_source, provider_order_id, carrier_order_id,
    external_reference, customer_name, customer_email, customer_phone,
    customer_street, customer_city, customer_zip, customer_country,
    total, currency, product_cost, shipping_cost, payment_status, status,
    order_date, last_status_update, carrier_matched_at, carrier_imported,
    tracking_number, skus, needs_review, raw, created_at, updated_at
"#;

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order, LedgerError> {
    let data_source: String = row.try_get("data_source")?;
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;

    Ok(Order {
        id: row.try_get("id")?,
        store_id: row.try_get("store_id")?,
        operation_id: row.try_get("operation_id")?,
        data_source: DataSource::from_db(&data_source)
            .ok_or_else(|| LedgerError::Storage(format!("bad data_source: {data_source}")))?,
        provider_order_id: row.try_get("provider_order_id")?,
        carrier_order_id: row.try_get("carrier_order_id")?,
        external_reference: row.try_get("external_reference")?,
        customer: CustomerSnapshot {
            name: row.try_get("customer_name")?,
            email: row.try_get("customer_email")?,
            phone: row.try_get("customer_phone")?,
            street: row.try_get("customer_street")?,
            city: row.try_get("customer_city")?,
            zip: row.try_get("customer_zip")?,
            country: row.try_get("customer_country")?,
        },
        total: row.try_get("total")?,
        currency: row.try_get("currency")?,
        product_cost: row.try_get("product_cost")?,
        shipping_cost: row.try_get("shipping_cost")?,
        payment_status: PaymentStatus::from_db(&payment_status)
            .ok_or_else(|| LedgerError::Storage(format!("bad payment_status: {payment_status}")))?,
        status: OrderStatus::from_db(&status)
            .ok_or_else(|| LedgerError::Storage(format!("bad status: {status}")))?,
        order_date: row.try_get("order_date")?,
        last_status_update: row.try_get("last_status_update")?,
        carrier_matched_at: row.try_get("carrier_matched_at")?,
        carrier_imported: row.try_get("carrier_imported")?,
        tracking_number: row.try_get("tracking_number")?,
        skus: row.try_get("skus")?,
        needs_review: row.try_get("needs_review")?,
        raw: row.try_get("raw")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert-or-replace one row by `(operation_id, id)`.
async fn write_row<'e, E>(executor: E, order: &Order) -> Result<(), LedgerError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, store_id, operation_id, data_source, provider_order_id, carrier_order_id,
            external_reference, customer_name, customer_email, customer_phone,
            customer_street, customer_city, customer_zip, customer_country,
            total, currency, product_cost, shipping_cost, payment_status, status,
            order_date, last_status_update, carrier_matched_at, carrier_imported,
            tracking_number, skus, needs_review, raw, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)
        ON CONFLICT (operation_id, id)
        DO UPDATE SET provider_order_id = EXCLUDED.provider_order_id,
                      carrier_order_id = EXCLUDED.carrier_order_id,
                      external_reference = EXCLUDED.external_reference,
                      customer_name = EXCLUDED.customer_name,
                      customer_email = EXCLUDED.customer_email,
                      customer_phone = EXCLUDED.customer_phone,
                      customer_street = EXCLUDED.customer_street,
                      customer_city = EXCLUDED.customer_city,
                      customer_zip = EXCLUDED.customer_zip,
                      customer_country = EXCLUDED.customer_country,
                      total = EXCLUDED.total,
                      currency = EXCLUDED.currency,
                      product_cost = EXCLUDED.product_cost,
                      shipping_cost = EXCLUDED.shipping_cost,
                      payment_status = EXCLUDED.payment_status,
                      status = EXCLUDED.status,
                      order_date = EXCLUDED.order_date,
                      last_status_update = EXCLUDED.last_status_update,
                      carrier_matched_at = EXCLUDED.carrier_matched_at,
                      carrier_imported = EXCLUDED.carrier_imported,
                      tracking_number = EXCLUDED.tracking_number,
                      skus = EXCLUDED.skus,
                      needs_review = EXCLUDED.needs_review,
                      raw = EXCLUDED.raw,
                      data_source = EXCLUDED.data_source,
                      updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&order.id)
    .bind(order.store_id)
    .bind(order.operation_id)
    .bind(order.data_source.as_str())
    .bind(&order.provider_order_id)
    .bind(&order.carrier_order_id)
    .bind(&order.external_reference)
    .bind(&order.customer.name)
    .bind(&order.customer.email)
    .bind(&order.customer.phone)
    .bind(&order.customer.street)
    .bind(&order.customer.city)
    .bind(&order.customer.zip)
    .bind(&order.customer.country)
    .bind(order.total)
    .bind(&order.currency)
    .bind(order.product_cost)
    .bind(order.shipping_cost)
    .bind(order.payment_status.as_db())
    .bind(order.status.as_db())
    .bind(order.order_date)
    .bind(order.last_status_update)
    .bind(order.carrier_matched_at)
    .bind(order.carrier_imported)
    .bind(&order.tracking_number)
    .bind(&order.skus)
    .bind(order.needs_review)
    .bind(&order.raw)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn upsert(&self, candidate: Order) -> Result<UpsertOutcome, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Resolve the idempotent key and lock the existing row if any
        let existing = if let Some(key) = &candidate.provider_order_id {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM orders
                 WHERE operation_id = $1 AND provider_order_id = $2 FOR UPDATE"
            ))
            .bind(candidate.operation_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?
        } else if let Some(key) = &candidate.carrier_order_id {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM orders
                 WHERE operation_id = $1 AND carrier_order_id = $2 FOR UPDATE"
            ))
            .bind(candidate.operation_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        let outcome = match existing {
            Some(row) => {
                let existing = order_from_row(&row)?;
                let merged = merge(&existing, &candidate, now);
                if merged.id != existing.id {
                    sqlx::query("DELETE FROM orders WHERE operation_id = $1 AND id = $2")
                        .bind(existing.operation_id)
                        .bind(&existing.id)
                        .execute(&mut *tx)
                        .await?;
                }
                write_row(&mut *tx, &merged).await?;
                UpsertOutcome {
                    order: merged,
                    created: false,
                }
            }
            None => {
                write_row(&mut *tx, &candidate).await?;
                UpsertOutcome {
                    order: candidate,
                    created: true,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get(&self, operation_id: Uuid, id: &str) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders WHERE operation_id = $1 AND id = $2"
        ))
        .bind(operation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn set_costs(
        &self,
        operation_id: Uuid,
        id: &str,
        product_cost: Decimal,
        shipping_cost: Decimal,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE orders SET product_cost = $3, shipping_cost = $4, updated_at = $5
             WHERE operation_id = $1 AND id = $2",
        )
        .bind(operation_id)
        .bind(id)
        .bind(product_cost)
        .bind(shipping_cost)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn flag_review(&self, operation_id: Uuid, id: &str) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE orders SET needs_review = TRUE, updated_at = $3
             WHERE operation_id = $1 AND id = $2",
        )
        .bind(operation_id)
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn unmatched(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1
               AND needs_review = FALSE
               AND ((provider_order_id IS NULL) <> (carrier_order_id IS NULL))
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(operation_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_by_provider_order_id(
        &self,
        operation_id: Uuid,
        provider_order_id: &str,
    ) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1 AND provider_order_id = $2"
        ))
        .bind(operation_id)
        .bind(provider_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_by_external_reference(
        &self,
        operation_id: Uuid,
        reference: &str,
    ) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1
               AND external_reference = $2
               AND data_source = 'fulfillment-only'
             ORDER BY id"
        ))
        .bind(operation_id)
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_by_phone_total(
        &self,
        operation_id: Uuid,
        phone: &str,
        total: Decimal,
        around: DateTime<Utc>,
        window_days: i64,
        side: MatchSide,
    ) -> Result<Vec<Order>, LedgerError> {
        let side_condition = match side {
            MatchSide::Checkout => "data_source <> 'fulfillment-only'",
            MatchSide::Fulfillment => "data_source = 'fulfillment-only'",
        };
        let window = Duration::days(window_days);
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1
               AND customer_phone = $2
               AND total = $3
               AND order_date BETWEEN $4 AND $5
               AND ((provider_order_id IS NULL) <> (carrier_order_id IS NULL))
               AND {side_condition}
             ORDER BY id"
        ))
        .bind(operation_id)
        .bind(phone)
        .bind(total)
        .bind(around - window)
        .bind(around + window)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn absorb(
        &self,
        operation_id: Uuid,
        keep_id: &str,
        absorbed_id: &str,
        merged: Order,
    ) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM orders WHERE operation_id = $1 AND id = $2")
            .bind(operation_id)
            .bind(absorbed_id)
            .execute(&mut *tx)
            .await?;

        if merged.id != keep_id {
            sqlx::query("DELETE FROM orders WHERE operation_id = $1 AND id = $2")
                .bind(operation_id)
                .bind(keep_id)
                .execute(&mut *tx)
                .await?;
        }
        write_row(&mut *tx, &merged).await?;

        tx.commit().await?;
        Ok(merged)
    }

    async fn orders_with_sku(
        &self,
        operation_id: Uuid,
        sku: &str,
    ) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1 AND $2 = ANY(skus)
             ORDER BY id"
        ))
        .bind(operation_id)
        .bind(sku)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn orders_for_operation(
        &self,
        operation_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders
             WHERE operation_id = $1 ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(operation_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn operations_with_unmatched(&self) -> Result<Vec<Uuid>, LedgerError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT operation_id FROM orders
             WHERE needs_review = FALSE
               AND ((provider_order_id IS NULL) <> (carrier_order_id IS NULL))
             ORDER BY operation_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(op,)| op).collect())
    }
}
