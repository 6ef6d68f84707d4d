//! Sync run progress state
//!
//! A [`SyncSession`] is the live, versioned progress record for one sync
//! run. It is owned by the run's task for the run's lifetime, guarded
//! against lost updates by the monotonically increasing `version`, and
//! read-only for API consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weight of checkout-platform ingestion in the overall percentage.
const PLATFORM_WEIGHT: u64 = 40;
/// Weight of fulfillment-provider ingestion in the overall percentage.
const PROVIDER_WEIGHT: u64 = 30;
/// Weight of the matching phase in the overall percentage.
const MATCHING_WEIGHT: u64 = 30;

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    #[default]
    Preparing,
    SyncingPlatform,
    SyncingProvider,
    Matching,
    Completed,
    Error,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Error)
    }

    /// Database/text representation.
    pub fn as_db(&self) -> &'static str {
        match self {
            SyncPhase::Preparing => "preparing",
            SyncPhase::SyncingPlatform => "syncing_platform",
            SyncPhase::SyncingProvider => "syncing_provider",
            SyncPhase::Matching => "matching",
            SyncPhase::Completed => "completed",
            SyncPhase::Error => "error",
        }
    }
}

/// Counters for one sub-phase of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PhaseCounters {
    pub processed: u64,
    /// Authoritative total when the upstream reports one
    pub total: Option<u64>,
    pub new: u64,
    pub updated: u64,
    pub errors: u64,
    /// Pages (or batches) completed so far
    pub pages: u64,
    pub done: bool,
}

impl PhaseCounters {
    /// Sub-phase completion in percent.
    ///
    /// With an authoritative total this is exact (capped at 99 until the
    /// phase drains). Without one, the percentage grows with completed pages
    /// and stays below 100, which keeps the overall figure monotonic under
    /// cursor pagination.
    pub fn percent(&self) -> u64 {
        if self.done {
            return 100;
        }
        match self.total {
            Some(0) => 99,
            Some(total) => (self.processed * 100 / total).min(99),
            None => 100u64.saturating_sub(100 / (self.pages + 1)),
        }
    }
}

/// Versioned progress snapshot for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub run_id: Uuid,
    pub operation_id: Uuid,
    pub phase: SyncPhase,
    /// Derived from weighted sub-phase percentages — never set directly
    pub overall_progress: u8,
    pub platform: PhaseCounters,
    pub provider: PhaseCounters,
    pub matching: PhaseCounters,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Lost-update guard: every committed write increments this
    pub version: u64,
    /// First fatal error, when the run ended in `Error`
    pub error: Option<String>,
}

impl SyncSession {
    pub fn new(run_id: Uuid, operation_id: Uuid, start_time: DateTime<Utc>) -> Self {
        Self {
            run_id,
            operation_id,
            phase: SyncPhase::Preparing,
            overall_progress: 0,
            platform: PhaseCounters::default(),
            provider: PhaseCounters::default(),
            matching: PhaseCounters::default(),
            start_time,
            end_time: None,
            version: 0,
            error: None,
        }
    }

    /// Total non-fatal record/page errors accumulated across all phases.
    pub fn non_fatal_errors(&self) -> u64 {
        self.platform.errors + self.provider.errors + self.matching.errors
    }

    /// Recompute `overall_progress` from the weighted sub-phase percentages.
    ///
    /// The figure only moves forward; the single allowed reset is the
    /// `Preparing` phase of a fresh session (version 0).
    pub fn recompute_progress(&mut self) {
        let computed: u8 = match self.phase {
            SyncPhase::Preparing => 0,
            SyncPhase::Completed => 100,
            _ => {
                let weighted = self.platform.percent() * PLATFORM_WEIGHT
                    + self.provider.percent() * PROVIDER_WEIGHT
                    + self.matching.percent() * MATCHING_WEIGHT;
                (weighted / 100).min(99) as u8
            }
        };
        if computed > self.overall_progress || self.phase == SyncPhase::Preparing {
            self.overall_progress = computed;
        }
    }
}
