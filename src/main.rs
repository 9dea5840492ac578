/// PLC Ledger - did:plc operation log service
///
/// Opens the operation store, runs the background integrity audit and health
/// jobs, and waits for shutdown.

use plc_ledger::config::{LogFormat, ServerConfig};
use plc_ledger::context::AppContext;
use plc_ledger::error::PlcResult;
use plc_ledger::jobs;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PlcResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| "plc_ledger=info".into());
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.storage.db_location.display(),
        "Starting PLC ledger"
    );

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    ctx.db.close().await;

    Ok(())
}
