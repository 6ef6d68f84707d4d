//! Sync Server — multi-tenant order synchronization and reconciliation
//!
//! Aggregates orders from checkout platforms (Shopify, CartPanda,
//! Digistore24), reconciles them against fulfillment providers (eLogy,
//! FHB), and maintains one canonical order ledger per operation.
//!
//! # Module structure
//!
//! ```text
//! sync-server/src/
//! ├── config.rs      # env-driven configuration
//! ├── state.rs       # AppState: pool + service singletons
//! ├── error.rs       # SyncError taxonomy + ServiceError bridge
//! ├── api/           # HTTP routes and handlers
//! ├── db/            # PostgreSQL stores (integrations, cost links, runs)
//! ├── integrations.rs # per-operation upstream configuration
//! ├── ledger/        # OrderLedger trait + Postgres/in-memory impls
//! ├── providers/     # per-provider adapters behind a static registry
//! ├── mapper/        # raw record → canonical order (pure)
//! ├── sync/          # orchestrator, matching, staging, progress, sweeper
//! ├── webhooks/      # signed event processor
//! └── costs/         # cost links and recalculation
//! ```

pub mod api;
pub mod config;
pub mod costs;
pub mod db;
pub mod error;
pub mod integrations;
pub mod ledger;
pub mod mapper;
pub mod providers;
pub mod state;
pub mod sync;
pub mod webhooks;

// Re-export public types
pub use config::{Config, VerificationMode};
pub use error::{ServiceError, ServiceResult, SyncError};
pub use ledger::{MemoryOrderLedger, OrderLedger, PgOrderLedger};
pub use state::AppState;
pub use sync::{SessionStore, SyncOrchestrator};
pub use webhooks::WebhookProcessor;
