use anyhow::Result;
use clap::Parser;
use timebank_monitor::config::Config;
use timebank_monitor::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("timebank_monitor={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting timebank monitor");

    let settings = config
        .settings()
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
    tracing::info!(
        "Configuration: bind_addr={}, settings={}",
        config.bind_addr,
        serde_json::to_string(&settings)?
    );

    Server::new(&config, settings)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
