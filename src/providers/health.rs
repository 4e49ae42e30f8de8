//! Provider health tracker
//!
//! Rolling success/failure/latency stats per provider, used to order the
//! failover list best-to-worst. Repeated consecutive failures park a
//! provider for a penalty window; once the window lapses the provider is
//! retried half-open. Counts decay so stale failures stop penalizing a
//! recovered provider. This component only reports state; it never errors.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

/// Consecutive failures before a provider is parked
const PARK_THRESHOLD: u32 = 3;

/// Counts above this total are decayed on each new observation
const DECAY_WINDOW: f64 = 200.0;

/// Multiplicative decay applied once the window is exceeded
const DECAY_FACTOR: f64 = 0.98;

/// Latency EMA smoothing factor
const LATENCY_ALPHA: f64 = 0.2;

/// Milliseconds of EMA latency that cost one full point of health score
const LATENCY_SCALE_MS: f64 = 10_000.0;

/// Score assigned to providers with no history yet
const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone)]
struct ProviderHealth {
    success_count: f64,
    failure_count: f64,
    consecutive_failures: u32,
    latency_ema_ms: f64,
    penalty_until: Option<Instant>,
}

impl ProviderHealth {
    fn new() -> Self {
        Self {
            success_count: 0.0,
            failure_count: 0.0,
            consecutive_failures: 0,
            latency_ema_ms: 0.0,
            penalty_until: None,
        }
    }

    fn decay(&mut self) {
        if self.success_count + self.failure_count > DECAY_WINDOW {
            self.success_count *= DECAY_FACTOR;
            self.failure_count *= DECAY_FACTOR;
        }
    }

    fn score(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0.0 {
            return NEUTRAL_SCORE;
        }
        let success_ratio = self.success_count / total;
        success_ratio - self.latency_ema_ms / LATENCY_SCALE_MS
    }

    fn is_parked(&self, now: Instant) -> bool {
        self.penalty_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Serializable health snapshot for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    pub name: String,
    pub success_count: f64,
    pub failure_count: f64,
    pub consecutive_failures: u32,
    pub latency_ema_ms: f64,
    pub health_score: f64,
    pub parked: bool,
}

/// Tracks rolling health per provider and orders candidates best-first
pub struct ProviderHealthTracker {
    providers: RwLock<HashMap<String, ProviderHealth>>,
    penalty_window: Duration,
}

impl ProviderHealthTracker {
    pub fn new(penalty_window: Duration) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            penalty_window,
        }
    }

    /// Record a successful call and its latency
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut providers = self.providers.write().expect("health lock poisoned");
        let health = providers
            .entry(provider.to_string())
            .or_insert_with(ProviderHealth::new);

        health.decay();
        health.success_count += 1.0;
        health.consecutive_failures = 0;
        health.penalty_until = None;

        let latency_ms = latency.as_secs_f64() * 1000.0;
        if health.latency_ema_ms == 0.0 {
            health.latency_ema_ms = latency_ms;
        } else {
            health.latency_ema_ms =
                LATENCY_ALPHA * latency_ms + (1.0 - LATENCY_ALPHA) * health.latency_ema_ms;
        }

        debug!(
            provider,
            latency_ms, "Recorded provider success, score now {:.3}",
            health.score()
        );
    }

    /// Record a failed or timed-out call
    pub fn record_failure(&self, provider: &str) {
        let mut providers = self.providers.write().expect("health lock poisoned");
        let health = providers
            .entry(provider.to_string())
            .or_insert_with(ProviderHealth::new);

        health.decay();
        health.failure_count += 1.0;
        health.consecutive_failures += 1;

        if health.consecutive_failures >= PARK_THRESHOLD {
            health.penalty_until = Some(Instant::now() + self.penalty_window);
            warn!(
                provider,
                consecutive = health.consecutive_failures,
                "Provider parked for {:?}",
                self.penalty_window
            );
        }
    }

    /// Order candidate providers best-to-worst, excluding parked ones
    ///
    /// Providers whose penalty window has lapsed re-enter the ordering
    /// (half-open): a success fully restores them, another failure parks
    /// them again immediately.
    pub fn order_providers(&self, candidates: &[String]) -> Vec<String> {
        let providers = self.providers.read().expect("health lock poisoned");
        let now = Instant::now();

        let mut scored: Vec<(f64, &String)> = candidates
            .iter()
            .filter(|name| {
                providers
                    .get(*name)
                    .map(|h| !h.is_parked(now))
                    .unwrap_or(true)
            })
            .map(|name| {
                let score = providers.get(name).map(|h| h.score()).unwrap_or(NEUTRAL_SCORE);
                (score, name)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Health snapshot for the status/metrics surface
    pub fn snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        let providers = self.providers.read().expect("health lock poisoned");
        let now = Instant::now();

        let mut snapshots: Vec<ProviderHealthSnapshot> = providers
            .iter()
            .map(|(name, health)| ProviderHealthSnapshot {
                name: name.clone(),
                success_count: health.success_count,
                failure_count: health.failure_count,
                consecutive_failures: health.consecutive_failures,
                latency_ema_ms: health.latency_ema_ms,
                health_score: health.score(),
                parked: health.is_parked(now),
            })
            .collect();

        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for ProviderHealthTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
