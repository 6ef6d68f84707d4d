//! Unified error codes for the sync platform
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 3xxx: Operation/tenant errors
//! - 4xxx: Order errors
//! - 5xxx: Sync run errors
//! - 6xxx: Webhook errors
//! - 7xxx: Cost configuration errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Represented as u16 values for efficient serialization and
/// cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 3xxx: Operation ====================
    /// Operation not found
    OperationNotFound = 3001,
    /// Operation has no enabled integration for the requested sync
    NoIntegrationConfigured = 3002,
    /// Integration not found for the provider store identifier
    IntegrationNotFound = 3003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,

    // ==================== 5xxx: Sync ====================
    /// A sync run is already in progress for this operation
    SyncAlreadyRunning = 5001,
    /// Sync run not found
    RunNotFound = 5002,
    /// Upstream credentials rejected
    ProviderAuthFailed = 5003,
    /// Upstream unavailable after retries
    ProviderUnavailable = 5004,

    // ==================== 6xxx: Webhook ====================
    /// Webhook signature verification failed
    WebhookSignatureInvalid = 6001,
    /// Webhook payload could not be parsed
    WebhookPayloadInvalid = 6002,

    // ==================== 7xxx: Cost ====================
    /// Cost link not found
    CostLinkNotFound = 7001,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9001,
    /// Internal server error
    InternalError = 9002,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Default human-readable message for this code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::OperationNotFound => "Operation not found",
            Self::NoIntegrationConfigured => "No enabled integration configured",
            Self::IntegrationNotFound => "Integration not found",
            Self::OrderNotFound => "Order not found",
            Self::SyncAlreadyRunning => "A sync run is already in progress",
            Self::RunNotFound => "Sync run not found",
            Self::ProviderAuthFailed => "Provider credentials rejected",
            Self::ProviderUnavailable => "Provider unavailable",
            Self::WebhookSignatureInvalid => "Webhook signature verification failed",
            Self::WebhookPayloadInvalid => "Webhook payload invalid",
            Self::CostLinkNotFound => "Cost link not found",
            Self::DatabaseError => "Database error",
            Self::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.code()
    }
}

/// Error returned when converting an unknown u16 into an [`ErrorCode`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid error code: {0}")]
pub struct InvalidErrorCode(pub u16);

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            3001 => Ok(Self::OperationNotFound),
            3002 => Ok(Self::NoIntegrationConfigured),
            3003 => Ok(Self::IntegrationNotFound),
            4001 => Ok(Self::OrderNotFound),
            5001 => Ok(Self::SyncAlreadyRunning),
            5002 => Ok(Self::RunNotFound),
            5003 => Ok(Self::ProviderAuthFailed),
            5004 => Ok(Self::ProviderUnavailable),
            6001 => Ok(Self::WebhookSignatureInvalid),
            6002 => Ok(Self::WebhookPayloadInvalid),
            7001 => Ok(Self::CostLinkNotFound),
            9001 => Ok(Self::DatabaseError),
            9002 => Ok(Self::InternalError),
            other => Err(InvalidErrorCode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for code in [
            ErrorCode::Success,
            ErrorCode::SyncAlreadyRunning,
            ErrorCode::WebhookSignatureInvalid,
            ErrorCode::InternalError,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()).unwrap(), code);
        }
    }

    #[test]
    fn test_invalid_code() {
        assert!(ErrorCode::try_from(1234u16).is_err());
    }
}
