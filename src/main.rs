use anyhow::Result;
use phytoscan::{config, server};
use tracing::info;

fn init_tracing(configured_level: &str) -> Result<String> {
    // Environment variable overrides the configured level.
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| configured_level.to_string());

    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap()),
        )
        .json()
        .init();

    Ok(level)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so its log level can seed the subscriber.
    let config = match config::load().await {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    let level = match init_tracing(&config.server.logs.level) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    info!("Starting phytoscan server with log level: {}", level);

    server::run(config).await?;

    Ok(())
}
