//! FallWatch - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // optional config file path; otherwise ./fallwatch.toml if present
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    init_logging(&config.log).context("failed to initialise logging")?;

    info!("=== FallWatch v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "{} slot(s) configured, captures in {}",
        config.slots.len(),
        config.server.captures_dir.display()
    );

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    run_server(config, Some(metrics)).await?;

    Ok(())
}
