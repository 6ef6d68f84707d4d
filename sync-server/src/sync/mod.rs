//! Order synchronization engine
//!
//! - [`orchestrator`]: per-operation run state machine and page walkers
//! - [`staging`]: the single raw-record → ledger-row write path
//! - [`matching`]: pairs checkout orders with fulfillment counterparts
//! - [`progress`]: versioned live session store with push stream
//! - [`sweeper`]: periodic matching pass for webhook-ingested orders
//!
//! # Run flow
//!
//! ```text
//! trigger(operation) ──► preparing ──► platform walker ─┐
//!                                  └─► provider walker ─┤ (barrier)
//!                                                       ▼
//!                                                   matching ──► completed
//! ```
//!
//! Ingestion walkers run concurrently; matching starts only after both have
//! drained. Cancellation is honored between pages and between batches.

pub mod matching;
pub mod orchestrator;
pub mod progress;
pub mod staging;
pub mod sweeper;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::sync::{SyncPhase, SyncSession};
use uuid::Uuid;

use crate::ledger::LedgerError;

// Re-exports
pub use matching::{MatchConfig, MatchSummary};
pub use orchestrator::{SyncMode, SyncOrchestrator, SyncRequest};
pub use progress::{CommitError, SessionStore};
pub use sweeper::MatchSweeper;

/// Durable run history, used for dashboards and for resolving the
/// incremental-sync lower bound.
#[async_trait]
pub trait RunArchive: Send + Sync {
    /// Record a terminal session snapshot.
    async fn record(&self, session: &SyncSession) -> Result<(), LedgerError>;

    /// Start time of the operation's most recent completed run.
    async fn last_completed_at(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, LedgerError>;
}

/// In-memory archive for tests and local development.
#[derive(Default)]
pub struct MemoryRunArchive {
    runs: RwLock<Vec<SyncSession>>,
}

impl MemoryRunArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<SyncSession> {
        self.runs.read().clone()
    }
}

#[async_trait]
impl RunArchive for MemoryRunArchive {
    async fn record(&self, session: &SyncSession) -> Result<(), LedgerError> {
        self.runs.write().push(session.clone());
        Ok(())
    }

    async fn last_completed_at(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        Ok(self
            .runs
            .read()
            .iter()
            .filter(|s| s.operation_id == operation_id && s.phase == SyncPhase::Completed)
            .map(|s| s.start_time)
            .max())
    }
}
