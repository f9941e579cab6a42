//! cloudlinkd - a multi-protocol CloudLink WebSocket hub.

use cloudlinkd::config::Config;
use cloudlinkd::network::Gateway;
use cloudlinkd::state::Hub;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    info!(address = %config.listen.address, "starting cloudlinkd");

    let hub = Hub::new(config.hub);
    let gateway = Gateway::bind(config.listen.address, hub).await?;

    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    gateway.run().await?;
    Ok(())
}
