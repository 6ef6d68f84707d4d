//! Sync orchestrator
//!
//! One run at a time per operation. A run walks every enabled integration
//! page by page through the mapper into the ledger, platform and provider
//! sides as two concurrent walkers, then runs the matching phase once both
//! sides have fully drained. Progress lands on the session store after
//! every page; cancellation is checked between pages only, so a fetched
//! page is either fully applied or not applied at all.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::provider::ProviderSide;
use shared::sync::{PhaseCounters, SyncPhase, SyncSession};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::matching::{self, MatchConfig};
use super::progress::SessionStore;
use super::staging;
use super::RunArchive;
use crate::costs::CostLinkStore;
use crate::error::SyncError;
use crate::integrations::{Integration, IntegrationStore};
use crate::ledger::OrderLedger;
use crate::providers::{AdapterRegistry, PageRequest};

/// Requested sync scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Full,
    /// Bounded below by the previous completed run's start time
    Incremental,
}

/// One sync trigger.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub operation_id: Uuid,
    pub mode: SyncMode,
    pub max_pages: Option<u32>,
    /// Lower bound for incremental mode, resolved by the caller
    pub since: Option<DateTime<Utc>>,
}

struct RunHandle {
    #[allow(dead_code)]
    run_id: Uuid,
    cancel: CancellationToken,
}

enum RunEnd {
    Completed,
    Cancelled,
}

/// Which session counters a walker owns.
#[derive(Clone, Copy)]
enum WalkSide {
    Platform,
    Provider,
}

impl WalkSide {
    fn counters(self, session: &mut SyncSession) -> &mut PhaseCounters {
        match self {
            WalkSide::Platform => &mut session.platform,
            WalkSide::Provider => &mut session.provider,
        }
    }
}

pub struct SyncOrchestrator {
    ledger: Arc<dyn OrderLedger>,
    integrations: Arc<dyn IntegrationStore>,
    cost_links: Arc<dyn CostLinkStore>,
    adapters: AdapterRegistry,
    sessions: Arc<SessionStore>,
    archive: Arc<dyn RunArchive>,
    active: DashMap<Uuid, RunHandle>,
    page_size: u32,
    match_config: MatchConfig,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        integrations: Arc<dyn IntegrationStore>,
        cost_links: Arc<dyn CostLinkStore>,
        adapters: AdapterRegistry,
        sessions: Arc<SessionStore>,
        archive: Arc<dyn RunArchive>,
        page_size: u32,
        match_config: MatchConfig,
    ) -> Self {
        Self {
            ledger,
            integrations,
            cost_links,
            adapters,
            sessions,
            archive,
            active: DashMap::new(),
            page_size,
            match_config,
        }
    }

    /// Start a run for an operation. Returns the run id immediately; the
    /// work proceeds on a spawned task. A second trigger while a run is
    /// active is rejected — the caller maps this to HTTP 409.
    pub fn trigger(self: Arc<Self>, request: SyncRequest) -> Result<Uuid, AppError> {
        use dashmap::mapref::entry::Entry;

        match self.active.entry(request.operation_id) {
            Entry::Occupied(_) => Err(AppError::new(ErrorCode::SyncAlreadyRunning)),
            Entry::Vacant(slot) => {
                let run_id = Uuid::new_v4();
                let cancel = CancellationToken::new();
                slot.insert(RunHandle {
                    run_id,
                    cancel: cancel.clone(),
                });
                self.sessions.create(run_id, request.operation_id);
                tracing::info!(
                    operation_id = %request.operation_id,
                    %run_id,
                    mode = ?request.mode,
                    "Sync run started"
                );
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    this.execute(request, run_id, cancel).await;
                });
                Ok(run_id)
            }
        }
    }

    /// Request cancellation of an operation's active run. Takes effect at
    /// the next page/batch boundary.
    pub fn cancel(&self, operation_id: Uuid) -> bool {
        match self.active.get(&operation_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, operation_id: Uuid) -> bool {
        self.active.contains_key(&operation_id)
    }

    async fn execute(self: Arc<Self>, request: SyncRequest, run_id: Uuid, cancel: CancellationToken) {
        let operation_id = request.operation_id;
        let outcome = self.run_phases(&request, run_id, &cancel).await;

        let end_time = Utc::now();
        let terminal = match outcome {
            Ok(RunEnd::Completed) => {
                let session = self.sessions.update(run_id, |s| {
                    s.phase = SyncPhase::Completed;
                    s.end_time = Some(end_time);
                });
                if let Some(session) = &session {
                    tracing::info!(
                        %operation_id,
                        %run_id,
                        non_fatal_errors = session.non_fatal_errors(),
                        matched = session.matching.new,
                        "Sync run completed"
                    );
                }
                session
            }
            Ok(RunEnd::Cancelled) => {
                tracing::info!(%operation_id, %run_id, "Sync run cancelled");
                self.sessions.update(run_id, |s| {
                    s.phase = SyncPhase::Error;
                    s.error = Some("cancelled by request".into());
                    s.end_time = Some(end_time);
                })
            }
            Err(e) => {
                tracing::error!(%operation_id, %run_id, "Sync run failed: {e}");
                self.sessions.update(run_id, |s| {
                    s.phase = SyncPhase::Error;
                    s.error = Some(e.to_string());
                    s.end_time = Some(end_time);
                })
            }
        };

        // Archive the snapshot captured at commit time — a new run for the
        // same operation may clear the live session at any moment after the
        // handle is released
        if let Some(session) = terminal {
            if let Err(e) = self.archive.record(&session).await {
                tracing::warn!(%run_id, "Failed to archive run: {e}");
            }
        }
        self.active.remove(&operation_id);
    }

    async fn run_phases(
        &self,
        request: &SyncRequest,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunEnd, SyncError> {
        let operation_id = request.operation_id;

        // Preparing: the operation must have at least one enabled upstream
        let integrations = self
            .integrations
            .enabled_for_operation(operation_id)
            .await?;
        if integrations.is_empty() {
            return Err(SyncError::Config(
                "no enabled integration configured for operation".into(),
            ));
        }

        let (checkout, fulfillment): (Vec<Integration>, Vec<Integration>) = integrations
            .into_iter()
            .partition(|i| i.provider.side() == ProviderSide::Checkout);

        self.sessions.update(run_id, |s| {
            s.phase = SyncPhase::SyncingPlatform;
        });

        // Two independent page walkers; no lock is held across their awaits
        let (platform_result, provider_result) = tokio::join!(
            self.walk_side(run_id, request, cancel, &checkout, WalkSide::Platform),
            self.walk_side(run_id, request, cancel, &fulfillment, WalkSide::Provider),
        );
        platform_result?;
        provider_result?;

        if cancel.is_cancelled() {
            return Ok(RunEnd::Cancelled);
        }

        // Barrier passed: both ingestion phases drained before any matching
        self.sessions.update(run_id, |s| {
            s.phase = SyncPhase::Matching;
        });

        let sessions = Arc::clone(&self.sessions);
        let summary = matching::run_pass(
            self.ledger.as_ref(),
            self.cost_links.as_ref(),
            operation_id,
            &self.match_config,
            cancel,
            |running, total_queued| {
                sessions.update(run_id, |s| {
                    s.matching.processed = running.examined;
                    s.matching.new = running.matched;
                    s.matching.errors = running.errors + running.ambiguous;
                    s.matching.pages += 1;
                    s.matching.total = Some(total_queued.max(1));
                });
            },
        )
        .await?;

        self.sessions.update(run_id, |s| {
            s.matching.done = true;
            s.matching.processed = summary.examined;
            s.matching.new = summary.matched;
            s.matching.errors = summary.errors + summary.ambiguous;
        });

        if cancel.is_cancelled() {
            return Ok(RunEnd::Cancelled);
        }
        Ok(RunEnd::Completed)
    }

    /// Walk every integration of one side, page by page.
    async fn walk_side(
        &self,
        run_id: Uuid,
        request: &SyncRequest,
        cancel: &CancellationToken,
        integrations: &[Integration],
        side: WalkSide,
    ) -> Result<(), SyncError> {
        for integration in integrations {
            let Some(adapter) = self.adapters.get(integration.provider) else {
                tracing::warn!(provider = %integration.provider, "No adapter registered, skipping");
                continue;
            };

            let mut cursor: Option<String> = None;
            let mut pages_done: u32 = 0;

            loop {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if let Some(max) = request.max_pages {
                    if pages_done >= max {
                        break;
                    }
                }

                let page_request = PageRequest {
                    cursor: cursor.clone(),
                    page_size: self.page_size,
                    since: request.since,
                };

                let fetched = adapter.fetch_page(integration, &page_request).await;
                if cancel.is_cancelled() {
                    // Cancellation landed while the page was in flight: drop
                    // it whole rather than applying it partially
                    return Ok(());
                }
                let page = match fetched {
                    Ok(page) => page,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) if pages_done == 0 => {
                        // Nothing could be ingested from this source at all
                        return Err(e);
                    }
                    Err(e) => {
                        // Later page failed after retries: report, end this
                        // source's walk, let the rest of the run continue
                        tracing::warn!(
                            provider = %integration.provider,
                            page = pages_done + 1,
                            "Page failed after retries, stopping source: {e}"
                        );
                        self.sessions.update(run_id, |s| {
                            side.counters(s).errors += 1;
                        });
                        break;
                    }
                };

                let mut created = 0u64;
                let mut updated = 0u64;
                let mut record_errors = page.malformed;
                for record in &page.records {
                    match staging::stage_record(
                        self.ledger.as_ref(),
                        self.cost_links.as_ref(),
                        request.operation_id,
                        integration.store_id,
                        record,
                    )
                    .await
                    {
                        Ok(outcome) if outcome.created => created += 1,
                        Ok(_) => updated += 1,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            record_errors += 1;
                            tracing::warn!(
                                provider = %integration.provider,
                                upstream_id = %record.upstream_id,
                                "Record skipped: {e}"
                            );
                        }
                    }
                }

                pages_done += 1;
                let processed = page.records.len() as u64;
                let total_count = page.total_count;
                self.sessions.update(run_id, |s| {
                    let counters = side.counters(s);
                    counters.processed += processed;
                    counters.new += created;
                    counters.updated += updated;
                    counters.errors += record_errors;
                    counters.pages += 1;
                    if let Some(total) = total_count {
                        counters.total = Some(total);
                    }
                });

                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            }
        }

        // This side has drained; flip the visible phase when the platform
        // walker finishes first
        self.sessions.update(run_id, |s| {
            side.counters(s).done = true;
            match side {
                WalkSide::Platform => {
                    if s.phase == SyncPhase::SyncingPlatform && !s.provider.done {
                        s.phase = SyncPhase::SyncingProvider;
                    }
                }
                WalkSide::Provider => {}
            }
        });
        Ok(())
    }
}
