use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use http::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::matching::MatchConfig;
use super::orchestrator::{SyncMode, SyncOrchestrator, SyncRequest};
use super::progress::SessionStore;
use super::MemoryRunArchive;
use crate::costs::{CostLinkStore, MemoryCostLinkStore, ProductCostLink};
use crate::error::SyncError;
use crate::integrations::{Integration, MemoryIntegrationStore};
use crate::ledger::{MemoryOrderLedger, OrderLedger};
use crate::providers::{
    AdapterRegistry, PageRequest, ProviderAdapter, ProviderPage, RawOrderRecord, WebhookSignature,
};
use shared::provider::ProviderKind;
use shared::sync::SyncSession;

mod test_convergence;
mod test_costs;
mod test_runs;

// ========================================================================
// Stub adapter: serves pre-built pages, optionally failing or gating
// ========================================================================

enum FailMode {
    None,
    AuthOnPage(usize),
    TransientOnPage(usize),
}

struct StubAdapter {
    kind: ProviderKind,
    pages: Vec<ProviderPage>,
    fail: FailMode,
    /// When set, each fetch waits for a permit (for cancellation tests)
    gate: Option<Arc<Semaphore>>,
}

impl StubAdapter {
    fn new(kind: ProviderKind, page_records: Vec<Vec<RawOrderRecord>>) -> Self {
        let count = page_records.len();
        let pages = page_records
            .into_iter()
            .enumerate()
            .map(|(i, records)| ProviderPage {
                records,
                malformed: 0,
                next_cursor: if i + 1 < count {
                    Some((i + 1).to_string())
                } else {
                    None
                },
                total_count: None,
            })
            .collect();
        Self {
            kind,
            pages,
            fail: FailMode::None,
            gate: None,
        }
    }

    fn failing(mut self, fail: FailMode) -> Self {
        self.fail = fail;
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn with_malformed(mut self, page: usize, malformed: u64) -> Self {
        self.pages[page].malformed = malformed;
        self
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch_page(
        &self,
        _integration: &Integration,
        request: &PageRequest,
    ) -> Result<ProviderPage, SyncError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let index: usize = request
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);

        match self.fail {
            FailMode::AuthOnPage(p) if p == index => {
                return Err(SyncError::Auth("token expired".into()))
            }
            FailMode::TransientOnPage(p) if p == index => {
                return Err(SyncError::Transient("502 from upstream".into()))
            }
            _ => {}
        }

        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    fn webhook_store_identifier(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<String, SyncError> {
        Err(SyncError::MalformedRecord("stub has no webhooks".into()))
    }

    fn webhook_signature(&self, _headers: &HeaderMap) -> Option<WebhookSignature> {
        None
    }

    fn parse_webhook(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<RawOrderRecord, SyncError> {
        Err(SyncError::MalformedRecord("stub has no webhooks".into()))
    }
}

// ========================================================================
// Record and environment builders
// ========================================================================

fn checkout_record(upstream_id: &str, phone: &str, total: Decimal, status: &str) -> RawOrderRecord {
    RawOrderRecord {
        provider: ProviderKind::Shopify,
        upstream_id: upstream_id.into(),
        external_reference: None,
        status_raw: status.into(),
        payment_status_raw: Some("paid".into()),
        customer_name: Some("Ana Silva".into()),
        customer_email: Some("ana@example.com".into()),
        customer_phone: Some(phone.into()),
        street: Some("Rua A 1".into()),
        city: Some("Lisboa".into()),
        zip: Some("1000-001".into()),
        country: Some("PT".into()),
        total,
        currency: "EUR".into(),
        sku_list: vec!["ABC123".into()],
        tracking_number: None,
        order_date: Some(Utc::now()),
        raw: serde_json::Value::Null,
    }
}

fn fulfillment_record(
    upstream_id: &str,
    reference: Option<&str>,
    phone: &str,
    total: Decimal,
    status: &str,
) -> RawOrderRecord {
    RawOrderRecord {
        provider: ProviderKind::Elogy,
        upstream_id: upstream_id.into(),
        external_reference: reference.map(String::from),
        status_raw: status.into(),
        payment_status_raw: None,
        customer_name: Some("Ana Silva".into()),
        customer_email: None,
        customer_phone: Some(phone.into()),
        street: None,
        city: None,
        zip: None,
        country: None,
        total,
        currency: "EUR".into(),
        sku_list: vec![],
        tracking_number: Some(format!("TRK-{upstream_id}")),
        order_date: Some(Utc::now()),
        raw: serde_json::Value::Null,
    }
}

struct TestEnv {
    ledger: Arc<MemoryOrderLedger>,
    cost_links: Arc<MemoryCostLinkStore>,
    integrations: Arc<MemoryIntegrationStore>,
    sessions: Arc<SessionStore>,
    archive: Arc<MemoryRunArchive>,
    orchestrator: Arc<SyncOrchestrator>,
    operation_id: Uuid,
    store_id: Uuid,
}

fn integration_for(op: Uuid, store: Uuid, provider: ProviderKind) -> Integration {
    let now = Utc::now();
    Integration {
        id: Uuid::new_v4(),
        operation_id: op,
        store_id: store,
        provider,
        store_identifier: format!("store-{provider}"),
        api_key: "key".into(),
        api_secret: None,
        webhook_secret: None,
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

fn env_with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> TestEnv {
    let kinds: Vec<ProviderKind> = adapters.iter().map(|a| a.kind()).collect();
    let ledger = Arc::new(MemoryOrderLedger::new());
    let cost_links = Arc::new(MemoryCostLinkStore::new());
    let integrations = Arc::new(MemoryIntegrationStore::new());
    let sessions = Arc::new(SessionStore::new());
    let archive = Arc::new(MemoryRunArchive::new());

    let operation_id = Uuid::new_v4();
    let store_id = Uuid::new_v4();
    for kind in kinds {
        integrations.insert(integration_for(operation_id, store_id, kind));
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        ledger.clone(),
        integrations.clone(),
        cost_links.clone(),
        AdapterRegistry::with_adapters(adapters),
        sessions.clone(),
        archive.clone(),
        100,
        MatchConfig::default(),
    ));

    TestEnv {
        ledger,
        cost_links,
        integrations,
        sessions,
        archive,
        orchestrator,
        operation_id,
        store_id,
    }
}

fn full_sync(operation_id: Uuid) -> SyncRequest {
    SyncRequest {
        operation_id,
        mode: SyncMode::Full,
        max_pages: None,
        since: None,
    }
}

async fn wait_terminal(sessions: &SessionStore, run_id: Uuid) -> SyncSession {
    for _ in 0..500 {
        if let Some(session) = sessions.get(run_id) {
            if session.phase.is_terminal() {
                return session;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {run_id} did not reach a terminal phase");
}

/// The run task archives and releases its handle just after the terminal
/// snapshot lands; wait for that to settle.
async fn wait_archived(archive: &MemoryRunArchive, runs: usize) {
    for _ in 0..500 {
        if archive.runs().len() >= runs {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {runs} archived runs, got {}", archive.runs().len());
}

/// Trigger that tolerates the window between the terminal snapshot and the
/// run handle release.
async fn trigger_settled(env: &TestEnv, request: SyncRequest) -> Uuid {
    for _ in 0..500 {
        match env.orchestrator.clone().trigger(request.clone()) {
            Ok(run_id) => return run_id,
            Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    panic!("trigger did not settle");
}

async fn seed_cost_link(env: &TestEnv, sku: &str, cost: Decimal, shipping: Decimal) {
    env.cost_links
        .upsert(ProductCostLink {
            operation_id: env.operation_id,
            store_id: env.store_id,
            sku: sku.into(),
            cost_price: cost,
            shipping_cost: shipping,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}
