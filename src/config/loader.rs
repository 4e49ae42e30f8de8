//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{PipelineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP_)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    // Add default config file if it exists
    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    // Add environment variables with APP_ prefix
    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| PipelineError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| PipelineError::Configuration(e.to_string()))
}

/// Load configuration from environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let mut config = AppConfig::default();

    if let Ok(url) = std::env::var("PROVIDER_BASE_URL") {
        config.providers.push(super::types::ProviderConfig {
            name: std::env::var("PROVIDER_NAME").unwrap_or_else(|_| "primary".to_string()),
            base_url: url,
            api_key: std::env::var("PROVIDER_API_KEY").ok(),
            api_secret: std::env::var("PROVIDER_API_SECRET").ok(),
        });
    }

    if let Ok(instruments) = std::env::var("PIPELINE_INSTRUMENTS") {
        config.settings.instruments = instruments
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        config.store.database_url = Some(database_url);
    }

    Ok(config)
}
