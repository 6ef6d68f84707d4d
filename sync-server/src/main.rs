//! sync-server — order synchronization and reconciliation service
//!
//! Long-running service that:
//! - Ingests orders from checkout platforms via polling and webhooks
//! - Reconciles them against fulfillment providers into one ledger
//! - Exposes sync triggers, live run progress and cost configuration

use sync_server::{api, AppState, Config};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sync_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting sync-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    state.start_background_tasks();

    let app = api::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("sync-server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, stopping background workers");
    state.shutdown.cancel();
}
