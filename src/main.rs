//! Banana Studio - HTTP Server Entry Point
//!
//! Starts the HTTP server that fronts the remote generation pipeline.

use banana_studio::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banana_studio=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: api_host={}, data_dir={}",
        config.remote.api_host,
        config.data_dir.display()
    );

    api::serve(config).await?;

    Ok(())
}
