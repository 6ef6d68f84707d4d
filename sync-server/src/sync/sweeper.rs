//! Background matching sweeper
//!
//! Webhook-ingested orders never match inline — providers expect their
//! delivery answered fast — so a periodic pass picks up every operation
//! with unmatched rows and runs the matching engine over it. Operations with an
//! active orchestrator run are skipped — that run's matching phase owns
//! them.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::matching::{self, MatchConfig};
use super::orchestrator::SyncOrchestrator;
use crate::costs::CostLinkStore;
use crate::ledger::OrderLedger;

pub struct MatchSweeper {
    ledger: Arc<dyn OrderLedger>,
    cost_links: Arc<dyn CostLinkStore>,
    orchestrator: Arc<SyncOrchestrator>,
    config: MatchConfig,
    interval: Duration,
    shutdown: CancellationToken,
}

impl MatchSweeper {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        cost_links: Arc<dyn CostLinkStore>,
        orchestrator: Arc<SyncOrchestrator>,
        config: MatchConfig,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            cost_links,
            orchestrator,
            config,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "MatchSweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // skip the immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("MatchSweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    async fn sweep(&self) {
        let operations = match self.ledger.operations_with_unmatched().await {
            Ok(ops) => ops,
            Err(e) => {
                tracing::warn!("Sweep skipped, ledger unavailable: {e}");
                return;
            }
        };

        for operation_id in operations {
            if self.shutdown.is_cancelled() {
                return;
            }
            if self.orchestrator.is_running(operation_id) {
                continue;
            }

            let cancel = self.shutdown.clone();
            match matching::run_pass(
                self.ledger.as_ref(),
                self.cost_links.as_ref(),
                operation_id,
                &self.config,
                &cancel,
                |_, _| {},
            )
            .await
            {
                Ok(summary) if summary.matched > 0 || summary.ambiguous > 0 => {
                    tracing::info!(
                        %operation_id,
                        matched = summary.matched,
                        ambiguous = summary.ambiguous,
                        "Sweep matched orders"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%operation_id, "Sweep pass failed: {e}");
                }
            }
        }
    }
}
