//! Application state

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::costs::{CostLinkStore, CostService, LoggingInvalidator};
use crate::db::{PgCostLinkStore, PgIntegrationStore, PgRunArchive};
use crate::integrations::IntegrationStore;
use crate::ledger::{OrderLedger, PgOrderLedger};
use crate::providers::AdapterRegistry;
use crate::sync::{MatchConfig, MatchSweeper, RunArchive, SessionStore, SyncOrchestrator};
use crate::webhooks::WebhookProcessor;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state — one instance, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// PostgreSQL connection pool
    pub pool: PgPool,
    pub ledger: Arc<dyn OrderLedger>,
    pub integrations: Arc<dyn IntegrationStore>,
    pub cost_links: Arc<dyn CostLinkStore>,
    pub sessions: Arc<SessionStore>,
    pub archive: Arc<dyn RunArchive>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub costs: Arc<CostService>,
    /// Cancels background workers on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState: connect, migrate, wire the services.
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let ledger: Arc<dyn OrderLedger> = Arc::new(PgOrderLedger::new(pool.clone()));
        let integrations: Arc<dyn IntegrationStore> =
            Arc::new(PgIntegrationStore::new(pool.clone()));
        let cost_links: Arc<dyn CostLinkStore> = Arc::new(PgCostLinkStore::new(pool.clone()));
        let archive: Arc<dyn RunArchive> = Arc::new(PgRunArchive::new(pool.clone()));
        let sessions = Arc::new(SessionStore::new());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let adapters = AdapterRegistry::standard(client, config.provider_max_retries);

        let match_config = MatchConfig {
            window_days: config.match_window_days,
            batch_size: config.match_batch_size,
        };

        let orchestrator = Arc::new(SyncOrchestrator::new(
            ledger.clone(),
            integrations.clone(),
            cost_links.clone(),
            adapters.clone(),
            sessions.clone(),
            archive.clone(),
            config.provider_page_size,
            match_config,
        ));

        let webhooks = Arc::new(WebhookProcessor::new(
            ledger.clone(),
            integrations.clone(),
            cost_links.clone(),
            adapters,
            config.webhook_verification,
        ));

        let costs = Arc::new(CostService::new(
            ledger.clone(),
            cost_links.clone(),
            Arc::new(LoggingInvalidator),
        ));

        Ok(Self {
            config: config.clone(),
            pool,
            ledger,
            integrations,
            cost_links,
            sessions,
            archive,
            orchestrator,
            webhooks,
            costs,
            shutdown: CancellationToken::new(),
        })
    }

    /// Start background workers: the matching sweeper and session GC.
    pub fn start_background_tasks(&self) {
        let sweeper = MatchSweeper::new(
            self.ledger.clone(),
            self.cost_links.clone(),
            self.orchestrator.clone(),
            MatchConfig {
                window_days: self.config.match_window_days,
                batch_size: self.config.match_batch_size,
            },
            Duration::from_secs(self.config.sweep_interval_secs),
            self.shutdown.clone(),
        );
        tokio::spawn(sweeper.run());

        let sessions = self.sessions.clone();
        let retention = Duration::from_secs(self.config.session_retention_secs);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => sessions.gc(retention),
                }
            }
        });
    }
}
