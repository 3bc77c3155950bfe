//! Bounty Ledger Server
//!
//! Serves the bounty lifecycle over HTTP from a local SQLite database.

use anyhow::Context;
use bounty_ledger::{BountyCore, Config};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Bounty Ledger Server");

    let config_path = std::env::var("BOUNTY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load_from(&config_path)?;

    let core = BountyCore::open(&config)
        .with_context(|| format!("Failed to open database {}", config.database_path()))?;
    info!("SQLite storage initialized at {}", config.database_path());

    let reports = core.verify_all().context("Ledger verification failed")?;
    for report in reports.iter().filter(|r| !r.is_consistent()) {
        warn!(
            "Workspace {} ledger needs attention: reserved={} bounties hold {}",
            report.budget.workspace_id,
            report.budget.reserved,
            report.reserved_by_bounties
        );
    }
    info!("Verified {} workspace ledgers", reports.len());

    bounty_ledger::server::run_server(&config.host(), config.port(), core).await?;

    Ok(())
}
