//! Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use signal_pipeline::common::types::{Bar, Instrument, Outcome};
use signal_pipeline::store::{EventPayload, EventStore, MemoryEventStore};

/// Bars falling by 1 per step and ending at `last_close`
///
/// Shaped to fire the mean-reversion rule in a chop regime: every step
/// is a loss (RSI 0) and the last close sits ~1.6 sigmas below its
/// trailing mean. High/low are +/-1 around the close, so the true range
/// is a constant 2 and the ATR-derived levels land on round numbers.
pub fn mean_reversion_bars(n: usize, last_close: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = Decimal::from(last_close + (n - 1 - i) as i64);
            Bar {
                timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + i as i64 * 60, 0)
                    .unwrap(),
                open: close + dec!(1),
                high: close + dec!(1),
                low: close - dec!(1),
                close,
                volume: dec!(1000),
            }
        })
        .collect()
}

/// The same series in the provider wire format (string prices)
pub fn bars_response_json(bars: &[Bar]) -> Value {
    json!({
        "bars": bars
            .iter()
            .map(|b| {
                json!({
                    "timestamp": b.timestamp.to_rfc3339(),
                    "open": b.open.to_string(),
                    "high": b.high.to_string(),
                    "low": b.low.to_string(),
                    "close": b.close.to_string(),
                    "volume": b.volume.to_string(),
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// Seed one cohort of prior decisions with outcomes
///
/// `n` mean-reversion decisions in a chop regime at the given raw
/// confidence, the first `wins` of which closed profitably.
pub async fn seed_decisions(
    store: &MemoryEventStore,
    raw_confidence: f64,
    n: usize,
    wins: usize,
) {
    for i in 0..n {
        let bars = mean_reversion_bars(40, 100);
        let mut decision = decision_from_bars(&bars);
        decision.signal.raw_confidence = raw_confidence;
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

fn decision_from_bars(bars: &[Bar]) -> signal_pipeline::common::types::Decision {
    use signal_pipeline::features::compute_features;
    use signal_pipeline::regime::RegimeClassifier;
    use signal_pipeline::signal::SignalGenerator;

    let instrument = Instrument::from("XYZ");
    let features = compute_features(&instrument, bars);
    let regime = RegimeClassifier::default().classify(0.0, 0.01);
    let signal = SignalGenerator::new()
        .generate(&instrument, &features, &regime)
        .expect("fixture bars must fire the mean-reversion rule");

    signal_pipeline::common::types::Decision {
        signal,
        calibrated_confidence: 0.65,
        confidence_adjustment: 0.0,
        decision_quality: signal_pipeline::common::types::DecisionQuality::empty(),
        similar_outcomes: signal_pipeline::common::types::SimilarOutcomes::empty(),
        lessons: vec![],
    }
}
