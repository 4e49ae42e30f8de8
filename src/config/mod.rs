//! Configuration module - typed settings plus the layered loader

pub mod loader;
pub mod types;

pub use loader::{load_config, load_from_env};
pub use types::{AppConfig, BroadcastConfig, EnrichmentConfig};
