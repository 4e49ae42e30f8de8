//! Market data fetcher with provider failover and a read-through TTL cache

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::health::ProviderHealthTracker;
use super::traits::BarProvider;
use crate::common::cache::TtlCache;
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{Bar, Instrument};

/// Fetches bar series from an ordered provider list under timeout budgets
///
/// Providers are attempted in health order; the first success wins and no
/// provider is retried within one call. Total wall clock is bounded by
/// provider_count x per_provider_timeout. Results are cached per
/// (instrument, window) with TTL eviction.
pub struct MarketDataFetcher {
    providers: Vec<Arc<dyn BarProvider>>,
    health: Arc<ProviderHealthTracker>,
    per_provider_timeout: Duration,
    cache: Mutex<TtlCache<(Instrument, u32), Vec<Bar>>>,
}

impl MarketDataFetcher {
    pub fn new(
        providers: Vec<Arc<dyn BarProvider>>,
        health: Arc<ProviderHealthTracker>,
        per_provider_timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            health,
            per_provider_timeout,
            cache: Mutex::new(TtlCache::new(cache_ttl)),
        }
    }

    /// Fetch the most recent `window` bars for an instrument
    ///
    /// Walks the health-ordered provider list, attempting each under the
    /// per-provider timeout. A timeout or error records a failure and
    /// falls through to the next provider; a success records latency and
    /// returns immediately. When every provider fails the call returns
    /// `AllProvidersFailed` and the instrument is simply skipped for the
    /// cycle.
    #[instrument(skip(self), fields(instrument = %instrument))]
    pub async fn get_bars(&self, instrument: &Instrument, window: u32) -> Result<Vec<Bar>> {
        let key = (instrument.clone(), window);

        if let Some(bars) = self.cache.lock().expect("bar cache lock poisoned").get(&key) {
            debug!("Bar cache hit for {} ({} bars)", instrument, bars.len());
            return Ok(bars);
        }

        let candidates: Vec<String> = self.providers.iter().map(|p| p.name().to_string()).collect();
        let ordered = self.health.order_providers(&candidates);

        if ordered.is_empty() {
            warn!("No healthy providers available for {}", instrument);
            return Err(PipelineError::AllProvidersFailed {
                instrument: instrument.clone(),
            });
        }

        for name in &ordered {
            let provider = match self.providers.iter().find(|p| p.name() == name) {
                Some(p) => p,
                None => continue,
            };

            let started = Instant::now();
            let attempt = tokio::time::timeout(
                self.per_provider_timeout,
                provider.fetch(instrument, window, self.per_provider_timeout),
            )
            .await;

            match attempt {
                Ok(Ok(bars)) => {
                    self.health.record_success(name, started.elapsed());
                    debug!(
                        provider = name.as_str(),
                        "Fetched {} bars for {} in {:?}",
                        bars.len(),
                        instrument,
                        started.elapsed()
                    );
                    self.cache
                        .lock()
                        .expect("bar cache lock poisoned")
                        .insert(key, bars.clone());
                    return Ok(bars);
                }
                Ok(Err(e)) => {
                    self.health.record_failure(name);
                    warn!(provider = name.as_str(), "Provider error for {}: {}", instrument, e);
                }
                Err(_) => {
                    self.health.record_failure(name);
                    warn!(
                        provider = name.as_str(),
                        "Provider timed out after {:?} for {}",
                        self.per_provider_timeout,
                        instrument
                    );
                }
            }
        }

        info!("All providers failed for {}", instrument);
        Err(PipelineError::AllProvidersFailed {
            instrument: instrument.clone(),
        })
    }

    /// Number of live entries in the bar cache
    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .expect("bar cache lock poisoned")
            .purge_expired()
    }
}
