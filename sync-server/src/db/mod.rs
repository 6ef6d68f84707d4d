//! PostgreSQL-backed stores for everything that is not the order ledger
//! (which lives in `crate::ledger::postgres`).

pub mod audit;
pub mod cost_links;
pub mod integrations;
pub mod runs;

pub use cost_links::PgCostLinkStore;
pub use integrations::PgIntegrationStore;
pub use runs::PgRunArchive;
