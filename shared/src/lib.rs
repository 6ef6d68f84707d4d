//! Shared types for the order synchronization platform
//!
//! Common types used by the sync server and any future client crates:
//! the canonical order model, sync-session state, provider identifiers,
//! the unified error system, and small utilities.

pub mod error;
pub mod order;
pub mod provider;
pub mod sync;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, ErrorCode};
pub use order::{Order, OrderStatus, PaymentStatus};
pub use provider::{DataSource, ProviderKind, ProviderSide};
pub use sync::{PhaseCounters, SyncPhase, SyncSession};
