mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use tracing::debug;

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    debug!("Loading configuration from: {}", config_path);

    let config_str = tokio::fs::read_to_string(&config_path).await?;
    let config: Config = serde_yaml::from_str(&config_str)?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ai.proxy_url.trim().is_empty() {
        return Err(Error::config("ai.proxy_url must not be empty"));
    }
    if config.ai.max_attempts == 0 {
        return Err(Error::config("ai.max_attempts must be at least 1"));
    }
    Ok(())
}
