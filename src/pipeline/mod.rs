//! Pipeline module - per-cycle orchestration of the decision flow
//!
//! One cycle walks every configured instrument through fetch, feature
//! computation, regime classification, signal generation, enrichment,
//! persistence and broadcast. Instruments are isolated: one failing
//! never blocks the rest of the cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::{
    BroadcastManager, ChannelMetrics, CHANNEL_ALERTS, CHANNEL_DECISIONS, CHANNEL_REGIMES,
};
use crate::common::backoff::Backoff;
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{Instrument, Outcome, OutboundMessage, StoredDecision};
use crate::enrich::{CalibrationSnapshot, DecisionEnricher};
use crate::features::FeatureComputer;
use crate::features::names;
use crate::providers::{MarketDataFetcher, ProviderHealthSnapshot, ProviderHealthTracker};
use crate::regime::RegimeClassifier;
use crate::signal::SignalGenerator;
use crate::store::{EventPayload, EventStore};

/// Append attempts before a store failure is surfaced to the cycle
const MAX_APPEND_ATTEMPTS: u32 = 3;

/// Summary of one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Instruments processed to completion
    pub processed: usize,
    /// Decisions recorded and broadcast
    pub decisions: usize,
    /// Instruments skipped after an unrecoverable error
    pub failures: usize,
}

/// Operational snapshot exposed for inspection
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub instruments: Vec<String>,
    pub providers: Vec<ProviderHealthSnapshot>,
    pub channels: Vec<ChannelMetrics>,
    pub calibrations: Vec<CalibrationSnapshot>,
    pub bar_cache_entries: usize,
    pub feature_cache_entries: usize,
}

/// End-to-end decision pipeline over a fixed instrument list
pub struct DecisionPipeline {
    fetcher: Arc<MarketDataFetcher>,
    features: Arc<FeatureComputer>,
    classifier: RegimeClassifier,
    generator: Arc<SignalGenerator>,
    enricher: Arc<DecisionEnricher>,
    store: Arc<dyn EventStore>,
    broadcast: Arc<BroadcastManager>,
    health: Arc<ProviderHealthTracker>,
    instruments: Vec<Instrument>,
    bar_window: u32,
    last_regimes: Mutex<HashMap<Instrument, String>>,
}

impl DecisionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<MarketDataFetcher>,
        features: Arc<FeatureComputer>,
        classifier: RegimeClassifier,
        generator: Arc<SignalGenerator>,
        enricher: Arc<DecisionEnricher>,
        store: Arc<dyn EventStore>,
        broadcast: Arc<BroadcastManager>,
        health: Arc<ProviderHealthTracker>,
        instruments: Vec<Instrument>,
        bar_window: u32,
    ) -> Self {
        Self {
            fetcher,
            features,
            classifier,
            generator,
            enricher,
            store,
            broadcast,
            health,
            instruments,
            bar_window,
            last_regimes: Mutex::new(HashMap::new()),
        }
    }

    /// Run one full cycle over every configured instrument
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for instrument in &self.instruments {
            match self.decide(instrument).await {
                Ok(Some(stored)) => {
                    report.processed += 1;
                    report.decisions += 1;
                    info!(
                        instrument = %instrument,
                        decision = stored.id.as_str(),
                        confidence = stored.decision.calibrated_confidence,
                        "Recorded decision"
                    );
                }
                Ok(None) => {
                    report.processed += 1;
                    debug!(instrument = %instrument, "No rule fired");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(instrument = %instrument, "Skipping instrument for this cycle: {}", e);
                    self.broadcast.publish(
                        CHANNEL_ALERTS,
                        OutboundMessage::Alert {
                            code: "instrument_skipped".to_string(),
                            message: format!("{}: {}", instrument, e),
                        },
                    );
                }
            }
        }

        info!(
            processed = report.processed,
            decisions = report.decisions,
            failures = report.failures,
            "Cycle complete"
        );
        report
    }

    /// On-demand decision for one instrument: fetch through broadcast
    ///
    /// `Ok(None)` means no rule fired, which is a normal outcome. A store
    /// append failure is a hard error; everything upstream of the store
    /// degrades or abstains instead.
    #[instrument(skip(self), fields(instrument = %instrument))]
    pub async fn decide(&self, instrument: &Instrument) -> Result<Option<StoredDecision>> {
        let bars = self.fetcher.get_bars(instrument, self.bar_window).await?;

        // Indicator math is CPU-bound; keep it off the async workers
        let features = {
            let computer = Arc::clone(&self.features);
            let instrument = instrument.clone();
            tokio::task::spawn_blocking(move || computer.compute(&instrument, &bars))
                .await
                .map_err(|e| PipelineError::Internal(format!("feature task failed: {}", e)))?
        };

        // Missing market context reads as neutral, not as an error
        let breadth = features
            .value(names::MOMENTUM_10)
            .unwrap_or(0.0)
            .clamp(-1.0, 1.0);
        let volatility = features.value(names::REALIZED_VOL_20).unwrap_or(0.0);
        let regime = self.classifier.classify(breadth, volatility);

        self.note_regime(instrument, &regime.label, &regime);

        let signal = match self.generator.generate(instrument, &features, &regime) {
            Some(signal) => signal,
            None => return Ok(None),
        };

        let decision = self.enricher.enrich(signal).await;
        let id = self
            .append_with_retry(EventPayload::Decision(decision.clone()))
            .await?;

        let stored = StoredDecision {
            id,
            recorded_at: Utc::now(),
            decision,
        };
        self.broadcast
            .publish(CHANNEL_DECISIONS, OutboundMessage::Decision(stored.clone()));

        Ok(Some(stored))
    }

    /// Publish a regime-change message when an instrument's label flips
    fn note_regime(
        &self,
        instrument: &Instrument,
        label: &str,
        regime: &crate::common::types::Regime,
    ) {
        let previous = {
            let mut last = self.last_regimes.lock().expect("regime lock poisoned");
            last.insert(instrument.clone(), label.to_string())
        };

        if previous.as_deref() != Some(label) {
            info!(
                instrument = %instrument,
                from = previous.as_deref().unwrap_or("none"),
                to = label,
                "Regime changed"
            );
            self.broadcast.publish(
                CHANNEL_REGIMES,
                OutboundMessage::RegimeChange {
                    instrument: instrument.clone(),
                    previous,
                    regime: regime.clone(),
                },
            );
        }
    }

    /// Look up a previously recorded decision by id
    pub async fn get_decision(&self, id: &str) -> Result<Option<StoredDecision>> {
        self.store.get_decision(id).await
    }

    /// Record a realized outcome against an existing decision
    ///
    /// The referenced decision must exist; the outcome is appended as its
    /// own record and the original decision is never touched.
    pub async fn record_outcome(&self, decision_id: &str, mut outcome: Outcome) -> Result<String> {
        if self.store.get_decision(decision_id).await?.is_none() {
            return Err(PipelineError::Store(format!(
                "unknown decision id: {}",
                decision_id
            )));
        }

        outcome.decision_id = decision_id.to_string();
        let id = self
            .append_with_retry(EventPayload::Outcome(outcome.clone()))
            .await?;

        self.broadcast.publish(
            CHANNEL_ALERTS,
            OutboundMessage::Alert {
                code: "outcome_recorded".to_string(),
                message: format!(
                    "{}: pnl {} over {}s",
                    decision_id, outcome.realized_pnl, outcome.holding_duration_secs
                ),
            },
        );
        Ok(id)
    }

    /// Operational snapshot of every component
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            instruments: self.instruments.iter().map(|i| i.to_string()).collect(),
            providers: self.health.snapshot(),
            channels: self.broadcast.metrics(),
            calibrations: self.enricher.cache_snapshot(),
            bar_cache_entries: self.fetcher.cache_len(),
            feature_cache_entries: self.features.cache_len(),
        }
    }

    /// Append with jittered retries; the store is the source of truth, so
    /// exhausting the retries is a hard error for the caller
    async fn append_with_retry(&self, payload: EventPayload) -> Result<String> {
        let mut backoff = Backoff::for_store();
        loop {
            match self.store.append(payload.clone()).await {
                Ok(id) => return Ok(id),
                Err(e) if backoff.attempts() + 1 < MAX_APPEND_ATTEMPTS => {
                    warn!(attempt = backoff.attempts() + 1, "Store append failed, retrying: {}", e);
                    backoff.wait().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
