//! Configuration types

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Market data providers, in configuration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Fetcher failover/caching configuration
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Feature computation configuration
    #[serde(default)]
    pub features: FeatureConfig,
    /// Regime classifier thresholds
    #[serde(default)]
    pub regime: RegimeConfig,
    /// Decision enrichment configuration
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Event store backend configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Broadcast/fan-out configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            fetcher: FetcherConfig::default(),
            features: FeatureConfig::default(),
            regime: RegimeConfig::default(),
            enrichment: EnrichmentConfig::default(),
            store: StoreConfig::default(),
            broadcast: BroadcastConfig::default(),
            settings: AppSettings::default(),
        }
    }
}

/// One upstream market data provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name used by the health tracker
    pub name: String,
    /// Base URL of the provider's bar endpoint
    pub base_url: String,
    /// API key for authenticated requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests (base64 encoded)
    #[serde(default)]
    pub api_secret: Option<String>,
}

/// Market data fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Per-provider attempt budget in milliseconds
    #[serde(default = "default_per_provider_timeout_ms")]
    pub per_provider_timeout_ms: u64,
    /// Bar cache TTL in seconds
    #[serde(default = "default_bar_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Number of bars requested per fetch
    #[serde(default = "default_bar_window")]
    pub bar_window: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            per_provider_timeout_ms: default_per_provider_timeout_ms(),
            cache_ttl_seconds: default_bar_cache_ttl(),
            bar_window: default_bar_window(),
        }
    }
}

fn default_per_provider_timeout_ms() -> u64 {
    2000
}

fn default_bar_cache_ttl() -> u64 {
    30
}

fn default_bar_window() -> u32 {
    60
}

/// Feature computation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Per-instrument feature cache TTL in seconds
    #[serde(default = "default_feature_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_feature_cache_ttl(),
        }
    }
}

fn default_feature_cache_ttl() -> u64 {
    20
}

/// Regime classifier threshold bands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Breadth at or above which the market is trending up
    #[serde(default = "default_trend_up")]
    pub trend_up_threshold: f64,
    /// Breadth at or below which the market is trending down
    #[serde(default = "default_trend_down")]
    pub trend_down_threshold: f64,
    /// Volatility at or above which the regime is high-volatility
    #[serde(default = "default_vol_high")]
    pub high_volatility_threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            trend_up_threshold: default_trend_up(),
            trend_down_threshold: default_trend_down(),
            high_volatility_threshold: default_vol_high(),
        }
    }
}

fn default_trend_up() -> f64 {
    0.3
}

fn default_trend_down() -> f64 {
    -0.3
}

fn default_vol_high() -> f64 {
    0.04
}

/// Decision enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Calibration lookback window in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Similar-decision window in days
    #[serde(default = "default_similar_days")]
    pub similar_days: i64,
    /// Sample count at which the isotonic calibrator kicks in
    #[serde(default = "default_full_calibration_min")]
    pub full_calibration_min: usize,
    /// Sample count at which the additive correction kicks in
    #[serde(default = "default_partial_calibration_min")]
    pub partial_calibration_min: usize,
    /// Calibrator/stats cache TTL in seconds
    #[serde(default = "default_calibrator_ttl")]
    pub calibrator_ttl_seconds: u64,
    /// Budget for one history read from the event store, in milliseconds
    #[serde(default = "default_store_read_timeout_ms")]
    pub store_read_timeout_ms: u64,
    /// Cap on similar decisions summarized per enrichment
    #[serde(default = "default_similar_cap")]
    pub similar_cap: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            similar_days: default_similar_days(),
            full_calibration_min: default_full_calibration_min(),
            partial_calibration_min: default_partial_calibration_min(),
            calibrator_ttl_seconds: default_calibrator_ttl(),
            store_read_timeout_ms: default_store_read_timeout_ms(),
            similar_cap: default_similar_cap(),
        }
    }
}

fn default_lookback_days() -> i64 {
    90
}

fn default_similar_days() -> i64 {
    60
}

fn default_full_calibration_min() -> usize {
    30
}

fn default_partial_calibration_min() -> usize {
    10
}

fn default_calibrator_ttl() -> u64 {
    3600
}

fn default_store_read_timeout_ms() -> u64 {
    2000
}

fn default_similar_cap() -> usize {
    20
}

/// Event store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Append-only JSONL file (default)
    Jsonl,
    /// In-memory store; volatile, for tests and dry runs
    Memory,
    /// Postgres via sqlx
    Postgres,
}

/// Event store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// JSONL file path
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Postgres connection URL
    #[serde(default)]
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Jsonl
}

fn default_store_path() -> String {
    "events.jsonl".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Broadcast manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Per-channel queue capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Per-subscriber queue capacity
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Per-subscriber delivery timeout in milliseconds
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Heartbeat/ping interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Missed heartbeats before a subscriber is evicted
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Queue drain interval in milliseconds
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            publish_timeout_ms: default_publish_timeout_ms(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_publish_timeout_ms() -> u64 {
    50
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_max_missed_heartbeats() -> u32 {
    3
}

fn default_drain_interval_ms() -> u64 {
    25
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Instruments processed each cycle
    #[serde(default)]
    pub instruments: Vec<String>,
    /// Seconds between pipeline cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            instruments: Vec::new(),
            cycle_interval_seconds: default_cycle_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cycle_interval() -> u64 {
    60
}

/// API credentials for an authenticated provider
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fetcher.per_provider_timeout_ms, 2000);
        assert_eq!(config.enrichment.full_calibration_min, 30);
        assert_eq!(config.enrichment.partial_calibration_min, 10);
        assert_eq!(config.store.backend, StoreBackend::Jsonl);
        assert_eq!(config.broadcast.max_missed_heartbeats, 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [[providers]]
            name = "primary"
            base_url = "https://bars.example.com"

            [regime]
            high_volatility_threshold = 0.06
        "#;
        let config: AppConfig = toml_from_str(toml);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.regime.high_volatility_threshold, 0.06);
        assert_eq!(config.regime.trend_up_threshold, 0.3);
        assert_eq!(config.enrichment.lookback_days, 90);
    }

    fn toml_from_str(s: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
