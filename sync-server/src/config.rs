//! Sync server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Webhook signature verification mode.
///
/// `Relaxed` applies unverifiable events with a loud warning. It exists for
/// local development against providers that cannot sign test deliveries and
/// must never be enabled in production; `from_env` refuses it there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    Strict,
    Relaxed,
}

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Webhook signature verification mode
    pub webhook_verification: VerificationMode,
    /// Page size hint sent to pull-based providers
    pub provider_page_size: u32,
    /// Max retry attempts for transient provider failures
    pub provider_max_retries: u32,
    /// Matching window in days for the phone+total rule
    pub match_window_days: i64,
    /// Batch size for the matching phase
    pub match_batch_size: usize,
    /// Interval between background matching sweeps, seconds
    pub sweep_interval_secs: u64,
    /// How long completed sessions stay readable, seconds
    pub session_retention_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let webhook_verification = match std::env::var("WEBHOOK_VERIFICATION").as_deref() {
            Ok("relaxed") => {
                if environment == "production" {
                    return Err("WEBHOOK_VERIFICATION=relaxed is not allowed in production".into());
                }
                tracing::warn!(
                    "Webhook verification is RELAXED — unsigned events will be applied"
                );
                VerificationMode::Relaxed
            }
            _ => VerificationMode::Strict,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: env_parse("HTTP_PORT", 8080),
            environment,
            webhook_verification,
            provider_page_size: env_parse("PROVIDER_PAGE_SIZE", 100),
            provider_max_retries: env_parse("PROVIDER_MAX_RETRIES", 3),
            match_window_days: env_parse("MATCH_WINDOW_DAYS", 30),
            match_batch_size: env_parse("MATCH_BATCH_SIZE", 200),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 300),
            session_retention_secs: env_parse("SESSION_RETENTION_SECS", 3600),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            http_port: 8080,
            environment: "development".into(),
            webhook_verification: VerificationMode::Strict,
            provider_page_size: 100,
            provider_max_retries: 3,
            match_window_days: 30,
            match_batch_size: 200,
            sweep_interval_secs: 300,
            session_retention_secs: 3600,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
