//! Audit log writes
//!
//! Best-effort: audit failures are logged and swallowed, they never fail
//! the operation that produced them.

use sqlx::PgPool;
use uuid::Uuid;

pub async fn log(
    pool: &PgPool,
    operation_id: Uuid,
    action: &str,
    detail: Option<&serde_json::Value>,
) {
    let result = sqlx::query(
        "INSERT INTO audit_log (operation_id, action, detail, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(operation_id)
    .bind(action)
    .bind(detail)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(%operation_id, action, "Audit write failed: {e}");
    }
}
