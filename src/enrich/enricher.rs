//! Decision enrichment against the event store
//!
//! Enrichment never blocks a signal: every store read runs under a
//! budget and any failure degrades to passing the raw confidence
//! through with an empty quality record.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{debug, warn};

use super::calibration::IsotonicCalibrator;
use crate::common::cache::TtlCache;
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{
    Decision, DecisionQuality, Outcome, Signal, SignalType, SimilarOutcomes, StoredDecision,
};
use crate::config::EnrichmentConfig;
use crate::store::{DecisionFilter, EventStore};

/// Lesson templates stop firing below this similar-decision win rate
const POOR_SIMILAR_WIN_RATE: f64 = 0.4;
/// Calibration MSE above which raw confidence is flagged as unreliable
const ELEVATED_MSE: f64 = 0.10;

/// Aggregates over prior same-type/same-regime decisions with outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStats {
    pub sample_size: usize,
    pub win_rate: f64,
    pub avg_raw_confidence: f64,
    pub calibration_mse: f64,
}

/// One cached calibration: the stats plus the fitted curve (if any)
#[derive(Debug, Clone, Default)]
struct CachedCalibration {
    stats: HistoryStats,
    curve: Option<Arc<IsotonicCalibrator>>,
}

/// One cache entry as exposed on the status surface
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationSnapshot {
    pub signal_type: String,
    pub regime: String,
    pub sample_size: usize,
}

/// Turns raw signals into calibrated decisions using stored history
pub struct DecisionEnricher {
    store: Arc<dyn EventStore>,
    config: EnrichmentConfig,
    calibrations: Mutex<TtlCache<(SignalType, String), CachedCalibration>>,
}

impl DecisionEnricher {
    pub fn new(store: Arc<dyn EventStore>, config: EnrichmentConfig) -> Self {
        let ttl = Duration::from_secs(config.calibrator_ttl_seconds);
        Self {
            store,
            config,
            calibrations: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Enrich a signal into a decision; infallible by design
    ///
    /// Deterministic for a fixed signal and store contents, so repeated
    /// calls within the calibration TTL produce identical decisions.
    pub async fn enrich(&self, signal: Signal) -> Decision {
        let key = (signal.signal_type.clone(), signal.regime.label.clone());

        let cached = {
            let mut cache = self.calibrations.lock().expect("calibration lock poisoned");
            cache.get(&key)
        };
        let calibration = match cached {
            Some(calibration) => calibration,
            None => match self.load_calibration(&signal).await {
                Ok(calibration) => {
                    let mut cache =
                        self.calibrations.lock().expect("calibration lock poisoned");
                    cache.insert(key, calibration.clone());
                    calibration
                }
                Err(e) => {
                    // Degraded: raw confidence passes through; nothing cached
                    // so a recovered store is picked up on the next signal.
                    warn!(
                        signal_type = %signal.signal_type,
                        regime = %signal.regime.label,
                        "History unavailable, passing raw confidence through: {}",
                        e
                    );
                    CachedCalibration::default()
                }
            },
        };

        let similar = match self.load_similar(&signal).await {
            Ok(similar) => similar,
            Err(e) => {
                warn!("Similar-decision lookup failed: {}", e);
                SimilarOutcomes::empty()
            }
        };

        let stats = calibration.stats;
        let raw = signal.raw_confidence.clamp(0.0, 1.0);
        let calibrated = if stats.sample_size >= self.config.full_calibration_min {
            match &calibration.curve {
                Some(curve) => curve.calibrate(raw),
                None => raw,
            }
        } else if stats.sample_size >= self.config.partial_calibration_min {
            // Additive correction: shift by how much this cohort has
            // out- or under-performed its own raw confidence.
            (raw + stats.win_rate - stats.avg_raw_confidence).clamp(0.0, 1.0)
        } else {
            raw
        };

        debug!(
            signal_type = %signal.signal_type,
            regime = %signal.regime.label,
            raw,
            calibrated,
            samples = stats.sample_size,
            "Calibrated signal confidence"
        );

        let lessons = self.lessons(&signal, &stats, &similar);
        let quality = DecisionQuality {
            historical_win_rate: stats.win_rate,
            sample_size: stats.sample_size,
            reliability_score: (stats.win_rate
                * (stats.sample_size as f64 / self.config.full_calibration_min as f64).min(1.0))
            .clamp(0.0, 1.0),
        };

        Decision {
            signal,
            calibrated_confidence: calibrated,
            confidence_adjustment: calibrated - raw,
            decision_quality: quality,
            similar_outcomes: similar,
            lessons,
        }
    }

    /// Live calibration cache entries, for the status surface
    pub fn cache_snapshot(&self) -> Vec<CalibrationSnapshot> {
        let mut cache = self.calibrations.lock().expect("calibration lock poisoned");
        let mut entries: Vec<CalibrationSnapshot> = cache
            .live_entries()
            .into_iter()
            .map(|((signal_type, regime), calibration)| CalibrationSnapshot {
                signal_type: signal_type.as_str().to_string(),
                regime,
                sample_size: calibration.stats.sample_size,
            })
            .collect();
        entries.sort_by(|a, b| (&a.signal_type, &a.regime).cmp(&(&b.signal_type, &b.regime)));
        entries
    }

    /// Load history and fit the calibration for one signal cohort
    async fn load_calibration(&self, signal: &Signal) -> Result<CachedCalibration> {
        let filter = DecisionFilter {
            signal_type: Some(signal.signal_type.clone()),
            regime_label: Some(signal.regime.label.clone()),
            instrument: None,
            since: Some(Utc::now() - ChronoDuration::days(self.config.lookback_days)),
        };
        let decisions = self.read_with_budget(self.store.decisions(&filter)).await?;
        let samples = self.outcome_samples(&decisions).await?;

        let sample_size = samples.len();
        let stats = if sample_size == 0 {
            HistoryStats::default()
        } else {
            let wins = samples.iter().filter(|(_, won)| *won).count();
            HistoryStats {
                sample_size,
                win_rate: wins as f64 / sample_size as f64,
                avg_raw_confidence: samples.iter().map(|(raw, _)| raw).sum::<f64>()
                    / sample_size as f64,
                calibration_mse: IsotonicCalibrator::mse(&samples),
            }
        };

        let curve = if sample_size >= self.config.full_calibration_min {
            IsotonicCalibrator::fit(&samples).map(Arc::new)
        } else {
            None
        };

        Ok(CachedCalibration { stats, curve })
    }

    /// Pair each stored decision with its latest outcome, if any
    async fn outcome_samples(&self, decisions: &[StoredDecision]) -> Result<Vec<(f64, bool)>> {
        if decisions.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = decisions.iter().map(|d| d.id.clone()).collect();
        let outcomes = self.read_with_budget(self.store.outcomes_for(&ids)).await?;

        Ok(decisions
            .iter()
            .filter_map(|decision| {
                // Corrections are appended, so the last outcome wins
                latest_outcome(&outcomes, &decision.id)
                    .map(|outcome| (decision.decision.signal.raw_confidence, outcome.is_win()))
            })
            .collect())
    }

    /// Summarize recent similar decisions, same instrument first
    async fn load_similar(&self, signal: &Signal) -> Result<SimilarOutcomes> {
        let filter = DecisionFilter {
            signal_type: Some(signal.signal_type.clone()),
            regime_label: Some(signal.regime.label.clone()),
            instrument: None,
            since: Some(Utc::now() - ChronoDuration::days(self.config.similar_days)),
        };
        let decisions = self.read_with_budget(self.store.decisions(&filter)).await?;

        let (mut same, other): (Vec<_>, Vec<_>) = decisions
            .into_iter()
            .partition(|d| d.decision.signal.instrument == signal.instrument);
        same.extend(other);
        same.truncate(self.config.similar_cap);

        if same.is_empty() {
            return Ok(SimilarOutcomes::empty());
        }

        let ids: Vec<String> = same.iter().map(|d| d.id.clone()).collect();
        let outcomes = self.read_with_budget(self.store.outcomes_for(&ids)).await?;
        let resolved: Vec<&Outcome> = same
            .iter()
            .filter_map(|d| latest_outcome(&outcomes, &d.id))
            .collect();

        if resolved.is_empty() {
            return Ok(SimilarOutcomes::empty());
        }
        let wins = resolved.iter().filter(|o| o.is_win()).count();
        let pnl_sum: f64 = resolved
            .iter()
            .filter_map(|o| o.realized_pnl.to_f64())
            .sum();
        Ok(SimilarOutcomes {
            count: resolved.len(),
            win_rate: wins as f64 / resolved.len() as f64,
            avg_pnl: pnl_sum / resolved.len() as f64,
        })
    }

    /// At most three template-generated takeaways, fully deterministic
    fn lessons(
        &self,
        signal: &Signal,
        stats: &HistoryStats,
        similar: &SimilarOutcomes,
    ) -> Vec<String> {
        let mut lessons = Vec::new();

        if stats.sample_size >= self.config.partial_calibration_min {
            lessons.push(format!(
                "Won {:.0}% of {} prior {} decisions in {}.",
                stats.win_rate * 100.0,
                stats.sample_size,
                signal.signal_type,
                signal.regime.label,
            ));
        } else {
            lessons.push(format!(
                "Only {} comparable decisions on record; confidence passed through uncalibrated.",
                stats.sample_size,
            ));
        }

        if stats.sample_size >= self.config.full_calibration_min
            && stats.calibration_mse > ELEVATED_MSE
        {
            lessons.push(format!(
                "Raw confidence has tracked outcomes poorly here (MSE {:.2}).",
                stats.calibration_mse,
            ));
        }

        if similar.count > 0 && similar.win_rate < POOR_SIMILAR_WIN_RATE {
            lessons.push(format!(
                "Similar recent decisions won only {:.0}% of the time.",
                similar.win_rate * 100.0,
            ));
        }

        lessons.truncate(3);
        lessons
    }

    async fn read_with_budget<T>(
        &self,
        read: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let budget = Duration::from_millis(self.config.store_read_timeout_ms);
        match tokio::time::timeout(budget, read).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout("event store read".to_string())),
        }
    }
}

fn latest_outcome<'a>(outcomes: &'a [Outcome], decision_id: &str) -> Option<&'a Outcome> {
    outcomes
        .iter()
        .rev()
        .find(|o| o.decision_id == decision_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Direction, Instrument, Regime};
    use crate::store::{EventPayload, MemoryEventStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_signal(raw: f64) -> Signal {
        Signal {
            instrument: Instrument::from("XYZ"),
            direction: Direction::Long,
            signal_type: SignalType::mean_reversion(),
            raw_confidence: raw,
            entry: dec!(100),
            stop: dec!(97),
            target: dec!(106),
            regime: Regime {
                label: "chop".to_string(),
                confidence: 0.8,
                as_of: Utc::now(),
            },
            reason: "test".to_string(),
        }
    }

    async fn seed_group(store: &MemoryEventStore, raw: f64, n: usize, wins: usize) {
        for i in 0..n {
            let mut decision = crate::store::tests::sample_decision("XYZ", "chop");
            decision.signal.raw_confidence = raw;
            let id = store
                .append(EventPayload::Decision(decision))
                .await
                .unwrap();
            let won = i < wins;
            let outcome = Outcome {
                decision_id: id.clone(),
                realized_pnl: if won { dec!(10) } else { dec!(-5) },
                realized_pnl_pct: if won { 1.0 } else { -0.5 },
                holding_duration_secs: 600,
                closed_at: Utc::now(),
            };
            store.attach_outcome(&id, outcome).await.unwrap();
        }
    }

    fn enricher(store: Arc<dyn EventStore>) -> DecisionEnricher {
        DecisionEnricher::new(store, EnrichmentConfig::default())
    }

    #[tokio::test]
    async fn test_isotonic_tier_with_deep_history() {
        let store = Arc::new(MemoryEventStore::new());
        seed_group(&store, 0.5, 6, 3).await;
        seed_group(&store, 0.65, 25, 17).await;
        seed_group(&store, 0.8, 16, 14).await;

        let enricher = enricher(store);
        let decision = enricher.enrich(make_signal(0.65)).await;

        assert!((decision.calibrated_confidence - 0.68).abs() < 1e-9);
        assert!((decision.confidence_adjustment - 0.03).abs() < 1e-9);
        assert_eq!(decision.decision_quality.sample_size, 47);
        assert!((decision.decision_quality.historical_win_rate - 34.0 / 47.0).abs() < 1e-9);
        assert!(decision.lessons[0].contains("72%"));
        assert!(decision.lessons[0].contains("47"));
    }

    #[tokio::test]
    async fn test_partial_tier_applies_additive_correction() {
        let store = Arc::new(MemoryEventStore::new());
        seed_group(&store, 0.6, 12, 9).await;

        let enricher = enricher(store);
        let decision = enricher.enrich(make_signal(0.65)).await;

        // 0.65 + (0.75 win rate - 0.6 avg raw)
        assert!((decision.calibrated_confidence - 0.8).abs() < 1e-9);
        assert!((decision.confidence_adjustment - 0.15).abs() < 1e-9);
        assert_eq!(decision.decision_quality.sample_size, 12);
    }

    #[tokio::test]
    async fn test_thin_history_passes_raw_through() {
        let store = Arc::new(MemoryEventStore::new());
        seed_group(&store, 0.65, 4, 1).await;

        let enricher = enricher(store);
        let decision = enricher.enrich(make_signal(0.65)).await;

        assert_eq!(decision.calibrated_confidence, 0.65);
        assert_eq!(decision.confidence_adjustment, 0.0);
        assert!(decision.lessons[0].contains("uncalibrated"));
    }

    struct FailingStore;

    #[async_trait]
    impl EventStore for FailingStore {
        async fn append(&self, _payload: EventPayload) -> crate::common::errors::Result<String> {
            Err(PipelineError::Store("down".to_string()))
        }
        async fn decisions(
            &self,
            _filter: &DecisionFilter,
        ) -> crate::common::errors::Result<Vec<StoredDecision>> {
            Err(PipelineError::Store("down".to_string()))
        }
        async fn outcomes_for(
            &self,
            _decision_ids: &[String],
        ) -> crate::common::errors::Result<Vec<Outcome>> {
            Err(PipelineError::Store("down".to_string()))
        }
        async fn get_decision(
            &self,
            _id: &str,
        ) -> crate::common::errors::Result<Option<StoredDecision>> {
            Err(PipelineError::Store("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_pass_through() {
        let enricher = enricher(Arc::new(FailingStore));
        let decision = enricher.enrich(make_signal(0.65)).await;

        assert_eq!(decision.calibrated_confidence, 0.65);
        assert_eq!(decision.confidence_adjustment, 0.0);
        assert_eq!(decision.decision_quality, DecisionQuality::empty());
        assert_eq!(decision.similar_outcomes, SimilarOutcomes::empty());
        // A recovered store must not be masked by a cached failure
        assert!(enricher.cache_snapshot().is_empty());
    }

    struct CountingStore {
        inner: MemoryEventStore,
        decision_scans: AtomicUsize,
    }

    #[async_trait]
    impl EventStore for CountingStore {
        async fn append(&self, payload: EventPayload) -> crate::common::errors::Result<String> {
            self.inner.append(payload).await
        }
        async fn decisions(
            &self,
            filter: &DecisionFilter,
        ) -> crate::common::errors::Result<Vec<StoredDecision>> {
            self.decision_scans.fetch_add(1, Ordering::SeqCst);
            self.inner.decisions(filter).await
        }
        async fn outcomes_for(
            &self,
            decision_ids: &[String],
        ) -> crate::common::errors::Result<Vec<Outcome>> {
            self.inner.outcomes_for(decision_ids).await
        }
        async fn get_decision(
            &self,
            id: &str,
        ) -> crate::common::errors::Result<Option<StoredDecision>> {
            self.inner.get_decision(id).await
        }
    }

    #[tokio::test]
    async fn test_calibration_is_cached_within_ttl() {
        let store = CountingStore {
            inner: MemoryEventStore::new(),
            decision_scans: AtomicUsize::new(0),
        };
        seed_group(&store.inner, 0.65, 12, 8).await;
        let store = Arc::new(store);

        let enricher = enricher(store.clone());
        let first = enricher.enrich(make_signal(0.65)).await;
        // One scan for calibration, one for similar decisions
        assert_eq!(store.decision_scans.load(Ordering::SeqCst), 2);

        let second = enricher.enrich(make_signal(0.65)).await;
        // Calibration came from cache; only the similar scan ran again
        assert_eq!(store.decision_scans.load(Ordering::SeqCst), 3);
        assert_eq!(first.calibrated_confidence, second.calibrated_confidence);

        let snapshot = enricher.cache_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].sample_size, 12);
    }

    #[tokio::test]
    async fn test_similar_outcomes_summary() {
        let store = Arc::new(MemoryEventStore::new());
        seed_group(&store, 0.65, 5, 1).await;

        let enricher = enricher(store);
        let decision = enricher.enrich(make_signal(0.65)).await;

        assert_eq!(decision.similar_outcomes.count, 5);
        assert!((decision.similar_outcomes.win_rate - 0.2).abs() < 1e-9);
        // 1 win at +10, 4 losses at -5
        assert!((decision.similar_outcomes.avg_pnl - (-2.0)).abs() < 1e-9);
        // Poor similar win rate adds a second lesson
        assert_eq!(decision.lessons.len(), 2);
        assert!(decision.lessons[1].contains("20%"));
    }
}
