//! Credit ledger worker.
//!
//! Connects to PostgreSQL, applies migrations, and runs the free credit
//! refill on a fixed interval until interrupted.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_ledger_service::{Ledger, ServiceConfig, StaticAgentDirectory};
use credit_ledger_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,credit_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting credit ledger worker");

    let config = ServiceConfig::from_env();

    tracing::info!(
        max_connections = config.database_max_connections,
        refill_interval_seconds = config.refill_interval_seconds,
        payment_enabled = config.payment.payment_enabled,
        fee_platform_percentage = %config.payment.fee_platform_percentage,
        fee_dev_percentage = %config.payment.fee_dev_percentage,
        skills = config.pricing.len(),
        "Service configuration loaded"
    );

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;

    let ledger = Ledger::from_config(
        Arc::new(store),
        &config,
        Arc::new(StaticAgentDirectory::new()),
    );

    let mut ticker = tokio::time::interval(config.refill_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match ledger.refill_all_free_credits().await {
                    Ok(report) => tracing::debug!(
                        candidates = report.candidates,
                        refilled = report.refilled,
                        failed = report.failed,
                        "Refill tick complete"
                    ),
                    Err(e) => tracing::error!(error = %e, "Refill run failed"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutting down credit ledger worker");
                break;
            }
        }
    }

    Ok(())
}
