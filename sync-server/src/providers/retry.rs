//! Bounded exponential backoff for provider calls

use std::future::Future;
use std::time::Duration;

use crate::error::SyncError;

const INITIAL_DELAY_MS: u64 = 500;
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Run `attempt` with exponential backoff on transient failures.
///
/// Auth and malformed-payload errors are returned immediately; only
/// [`SyncError::Transient`] is retried, up to `max_retries` additional
/// attempts.
pub async fn with_backoff<T, F, Fut>(
    op_name: &str,
    max_retries: u32,
    mut attempt: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);

    for tries in 0..=max_retries {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(SyncError::Transient(msg)) if tries < max_retries => {
                tracing::warn!(
                    op = op_name,
                    attempt = tries + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient provider failure, retrying: {msg}"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}

/// Truncate an error body for logging without splitting a UTF-8 character.
pub fn truncate_excerpt(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Map an HTTP status from a provider API to the error taxonomy.
pub fn classify_status(status: http::StatusCode, body_excerpt: &str) -> SyncError {
    if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
        SyncError::Auth(format!("{status}: {body_excerpt}"))
    } else if status == http::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SyncError::Transient(format!("{status}: {body_excerpt}"))
    } else {
        SyncError::MalformedRecord(format!("unexpected response {status}: {body_excerpt}"))
    }
}
