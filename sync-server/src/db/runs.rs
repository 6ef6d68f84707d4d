//! Sync run history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::sync::RunArchive;
use shared::sync::SyncSession;

#[derive(Clone)]
pub struct PgRunArchive {
    pool: PgPool,
}

impl PgRunArchive {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunArchive for PgRunArchive {
    async fn record(&self, session: &SyncSession) -> Result<(), LedgerError> {
        let snapshot = serde_json::to_value(session)
            .map_err(|e| LedgerError::Storage(format!("serialize session: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO sync_runs (run_id, operation_id, phase, snapshot, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id)
            DO UPDATE SET phase = EXCLUDED.phase,
                          snapshot = EXCLUDED.snapshot,
                          ended_at = EXCLUDED.ended_at
            "#,
        )
        .bind(session.run_id)
        .bind(session.operation_id)
        .bind(session.phase.as_db())
        .bind(&snapshot)
        .bind(session.start_time)
        .bind(session.end_time)
        .execute(&self.pool)
        .await?;

        super::audit::log(
            &self.pool,
            session.operation_id,
            "sync_run_finished",
            Some(&serde_json::json!({
                "run_id": session.run_id,
                "phase": session.phase,
                "errors": session.non_fatal_errors(),
            })),
        )
        .await;
        Ok(())
    }

    async fn last_completed_at(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT started_at FROM sync_runs
             WHERE operation_id = $1 AND phase = 'completed'
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(t,)| t))
    }
}
