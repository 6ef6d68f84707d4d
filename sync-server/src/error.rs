//! Error types for the sync server
//!
//! Two layers:
//! - [`SyncError`] — everything that can go wrong while talking to upstream
//!   providers or staging records. Only `Auth` and `Ledger` variants abort a
//!   run; per-record problems become counters on the session.
//! - [`ServiceError`] — bridges DB-layer errors (`sqlx::Error`, boxed errors)
//!   and the API-layer [`AppError`], so handlers can use `?` without
//!   `.map_err` boilerplate.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::ledger::LedgerError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while syncing against upstream providers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Credentials invalid/expired — fatal to the run, needs an operator
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Run cannot start: missing/invalid integration configuration
    #[error("invalid sync configuration: {0}")]
    Config(String),

    /// Network/429/5xx — retried with backoff, then recorded per page
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Unparseable single record — skipped and counted, run continues
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Matching declined to guess between several candidates
    #[error("ambiguous match for {order_id}: {candidates} candidates")]
    AmbiguousMatch { order_id: String, candidates: usize },

    /// Webhook signature did not verify
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Ledger/storage failure — fatal to the run
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl SyncError {
    /// Whether this error aborts the whole run (vs. a per-record counter).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::Config(_) | SyncError::Ledger(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transient(e.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match &e {
            SyncError::Auth(msg) => AppError::with_message(ErrorCode::ProviderAuthFailed, msg),
            SyncError::Config(msg) => {
                AppError::with_message(ErrorCode::NoIntegrationConfigured, msg)
            }
            SyncError::Transient(msg) => {
                AppError::with_message(ErrorCode::ProviderUnavailable, msg)
            }
            SyncError::MalformedRecord(msg) => {
                AppError::with_message(ErrorCode::WebhookPayloadInvalid, msg)
            }
            SyncError::SignatureVerification(msg) => {
                AppError::with_message(ErrorCode::WebhookSignatureInvalid, msg)
            }
            SyncError::AmbiguousMatch { .. } | SyncError::Ledger(_) => {
                tracing::error!(error = %e, "Sync error surfaced to API");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

/// Service-layer error — only two variants, keeps things simple.
///
/// - `Db`: Database/infrastructure errors (auto-logged, mapped to InternalError)
/// - `App`: Business-rule errors (transparent pass-through to client)
#[derive(Debug)]
pub enum ServiceError {
    /// Database or infrastructure error (sqlx, serde, etc.)
    Db(BoxError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<LedgerError> for ServiceError {
    fn from(e: LedgerError) -> Self {
        ServiceError::Db(Box::new(e))
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Db(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service database error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(SyncError::Auth("expired token".into()).is_fatal());
        assert!(!SyncError::Transient("503".into()).is_fatal());
        assert!(!SyncError::MalformedRecord("bad json".into()).is_fatal());
        assert!(SyncError::Ledger(LedgerError::Storage("down".into())).is_fatal());
    }

    #[test]
    fn test_app_error_mapping() {
        let err: AppError = SyncError::Auth("nope".into()).into();
        assert_eq!(err.code, ErrorCode::ProviderAuthFailed);
        let err: AppError = SyncError::SignatureVerification("mismatch".into()).into();
        assert_eq!(err.code, ErrorCode::WebhookSignatureInvalid);
    }
}
