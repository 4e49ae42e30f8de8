//! SignalPipeline - Main Entry Point
//!
//! A Rust service that turns multi-provider market data into calibrated
//! trading decisions and fans them out to subscribers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use signal_pipeline::broadcast::BroadcastManager;
use signal_pipeline::common::types::Instrument;
use signal_pipeline::config::types::{ApiCredentials, StoreBackend};
use signal_pipeline::config::{load_config, load_from_env, AppConfig};
use signal_pipeline::enrich::DecisionEnricher;
use signal_pipeline::features::FeatureComputer;
use signal_pipeline::pipeline::DecisionPipeline;
use signal_pipeline::providers::{
    BarProvider, HttpBarProvider, MarketDataFetcher, ProviderHealthTracker,
};
use signal_pipeline::regime::RegimeClassifier;
use signal_pipeline::signal::SignalGenerator;
use signal_pipeline::store::{
    EventStore, JsonlEventStore, MemoryEventStore, PostgresEventStore,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Comma-separated list of instruments, overriding the config file
    #[arg(long)]
    instruments: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SignalPipeline application");
    info!("Configuration file: {}", args.config);

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config))?;
    apply_env_fallbacks(&mut config)?;

    if let Some(instruments) = &args.instruments {
        config.settings.instruments = instruments
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.settings.instruments.is_empty() {
        anyhow::bail!("No instruments configured; set settings.instruments or pass --instruments");
    }
    if config.providers.is_empty() {
        anyhow::bail!("No providers configured; add a [[providers]] entry or set PROVIDER_BASE_URL");
    }

    let store = build_store(&config).await?;
    let (pipeline, broadcast) = build_pipeline(&config, store)?;
    let broadcast_task = broadcast.start();

    info!(
        instruments = config.settings.instruments.len(),
        providers = config.providers.len(),
        interval = config.settings.cycle_interval_seconds,
        "Pipeline initialized"
    );

    let mut cycle =
        tokio::time::interval(Duration::from_secs(config.settings.cycle_interval_seconds));
    loop {
        tokio::select! {
            _ = cycle.tick() => {
                pipeline.run_cycle().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
        }
    }

    broadcast_task.abort();
    Ok(())
}

/// Fill gaps in the file config from plain environment variables
fn apply_env_fallbacks(config: &mut AppConfig) -> Result<()> {
    let from_env = load_from_env()?;
    if config.providers.is_empty() {
        config.providers = from_env.providers;
    }
    if config.settings.instruments.is_empty() {
        config.settings.instruments = from_env.settings.instruments;
    }
    if config.store.database_url.is_none() {
        config.store.database_url = from_env.store.database_url;
    }
    Ok(())
}

/// Open the configured event store backend
async fn build_store(config: &AppConfig) -> Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.store.backend {
        StoreBackend::Jsonl => {
            info!("Using JSONL event store at {}", config.store.path);
            Arc::new(JsonlEventStore::open(&config.store.path).await?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory event store (volatile)");
            Arc::new(MemoryEventStore::new())
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Postgres backend requires store.database_url"))?;
            info!("Using Postgres event store");
            Arc::new(PostgresEventStore::connect(url, config.store.max_connections).await?)
        }
    };
    Ok(store)
}

/// Assemble the pipeline and its broadcast manager from config
fn build_pipeline(
    config: &AppConfig,
    store: Arc<dyn EventStore>,
) -> Result<(DecisionPipeline, Arc<BroadcastManager>)> {
    let mut providers: Vec<Arc<dyn BarProvider>> = Vec::with_capacity(config.providers.len());
    for provider_config in &config.providers {
        let mut provider = HttpBarProvider::new(&provider_config.name, &provider_config.base_url)?;
        if let (Some(key), Some(secret)) =
            (&provider_config.api_key, &provider_config.api_secret)
        {
            provider =
                provider.with_credentials(ApiCredentials::new(key.clone(), secret.clone()));
        }
        providers.push(Arc::new(provider));
    }

    let health = Arc::new(ProviderHealthTracker::default());
    let fetcher = Arc::new(MarketDataFetcher::new(
        providers,
        Arc::clone(&health),
        Duration::from_millis(config.fetcher.per_provider_timeout_ms),
        Duration::from_secs(config.fetcher.cache_ttl_seconds),
    ));
    let features = Arc::new(FeatureComputer::new(Duration::from_secs(
        config.features.cache_ttl_seconds,
    )));
    let enricher = Arc::new(DecisionEnricher::new(
        Arc::clone(&store),
        config.enrichment.clone(),
    ));
    let broadcast = Arc::new(BroadcastManager::new(config.broadcast.clone()));

    let pipeline = DecisionPipeline::new(
        fetcher,
        features,
        RegimeClassifier::new(config.regime.clone()),
        Arc::new(SignalGenerator::new()),
        enricher,
        store,
        Arc::clone(&broadcast),
        health,
        config
            .settings
            .instruments
            .iter()
            .map(|s| Instrument::from(s.as_str()))
            .collect(),
        config.fetcher.bar_window,
    );

    Ok((pipeline, broadcast))
}
