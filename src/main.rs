//! IndexPulse — Binary Entrypoint
//! Boots the four ingestion pipelines and runs until Ctrl-C.
//!
//! See `README.md` for quickstart.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use indexpulse::{AppConfig, IndexPulse};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("indexpulse=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    tracing::info!(
        quotes = cfg.quotes_interval_secs,
        premium = cfg.premium_interval_secs,
        flow = cfg.flow_interval_secs,
        macro_ = cfg.macro_interval_secs,
        "starting pipelines"
    );

    let service = IndexPulse::new(cfg)?;
    service.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    service.shutdown().await;
    Ok(())
}
