//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OperationNotFound
            | Self::IntegrationNotFound
            | Self::OrderNotFound
            | Self::RunNotFound
            | Self::CostLinkNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists | Self::SyncAlreadyRunning => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,

            // 400 Bad Request
            Self::Unknown
            | Self::ValidationFailed
            | Self::InvalidRequest
            | Self::NoIntegrationConfigured
            | Self::WebhookPayloadInvalid => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway (upstream failed)
            Self::ProviderAuthFailed | Self::ProviderUnavailable => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::DatabaseError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
