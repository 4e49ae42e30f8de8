//! Unified domain types used across the pipeline

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque instrument/symbol identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(pub String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single immutable OHLCV sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Timestamp of the bar open
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A single computed feature value
///
/// NaN/Inf and any undefined computation (empty series, zero divisor)
/// resolve to `Missing` at construction time so a non-finite number can
/// never leak downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Value(f64),
    Missing,
}

impl FeatureValue {
    /// Build a feature value, mapping NaN/Inf to `Missing`
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            FeatureValue::Value(value)
        } else {
            FeatureValue::Missing
        }
    }

    /// Build a feature value from an optional computation result
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) => Self::from_f64(v),
            None => FeatureValue::Missing,
        }
    }

    /// Get the inner value if present
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Value(v) => Some(*v),
            FeatureValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

/// Computed indicator set for one instrument at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub instrument: Instrument,
    /// Timestamp of the newest bar the features were derived from
    pub as_of: DateTime<Utc>,
    /// Feature name to value; BTreeMap keeps serialization deterministic
    pub features: BTreeMap<String, FeatureValue>,
}

impl FeatureSet {
    pub fn new(instrument: Instrument, as_of: DateTime<Utc>) -> Self {
        Self {
            instrument,
            as_of,
            features: BTreeMap::new(),
        }
    }

    /// Insert a feature, mapping `None` and non-finite values to `Missing`
    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.features
            .insert(name.into(), FeatureValue::from_option(value));
    }

    /// Get a feature value; `None` for both absent and missing features
    pub fn value(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(|v| v.as_f64())
    }

    /// Whether the named feature exists but resolved to missing
    pub fn is_missing(&self, name: &str) -> bool {
        self.features.get(name).map(|v| v.is_missing()).unwrap_or(true)
    }
}

/// Market regime classification for one cycle
///
/// Recomputed every cycle and embedded in the Decision; never persisted
/// on its own. The label set is driven by classifier thresholds rather
/// than a closed enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub label: String,
    /// Classification confidence in [0, 1]
    pub confidence: f64,
    pub as_of: DateTime<Utc>,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
            Direction::Flat => write!(f, "flat"),
        }
    }
}

/// Strategy rule family that produced a signal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalType(pub String);

impl SignalType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mean_reversion() -> Self {
        Self::new("mean_reversion")
    }

    pub fn momentum() -> Self {
        Self::new("momentum")
    }

    pub fn breakout() -> Self {
        Self::new("breakout")
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directional trading signal with raw (uncalibrated) confidence
///
/// Immutable once created. Price levels always satisfy
/// stop < entry < target for longs and stop > entry > target for shorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: Instrument,
    pub direction: Direction,
    pub signal_type: SignalType,
    /// Rule-table confidence in [0, 1], before calibration
    pub raw_confidence: f64,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
    pub regime: Regime,
    pub reason: String,
}

impl Signal {
    /// Check the stop/entry/target ordering invariant
    pub fn levels_ordered(&self) -> bool {
        match self.direction {
            Direction::Long => self.stop < self.entry && self.entry < self.target,
            Direction::Short => self.stop > self.entry && self.entry > self.target,
            Direction::Flat => true,
        }
    }
}

/// Quality metrics for the history backing a calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionQuality {
    /// Win rate over prior same-type/regime decisions with outcomes
    pub historical_win_rate: f64,
    /// Number of prior decisions with observed outcomes
    pub sample_size: usize,
    /// Win rate discounted by sample sufficiency, in [0, 1]
    pub reliability_score: f64,
}

impl DecisionQuality {
    /// Quality record when no history is available
    pub fn empty() -> Self {
        Self {
            historical_win_rate: 0.0,
            sample_size: 0,
            reliability_score: 0.0,
        }
    }
}

/// Summary of similar past decisions attached to a Decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarOutcomes {
    pub count: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
}

impl SimilarOutcomes {
    pub fn empty() -> Self {
        Self {
            count: 0,
            win_rate: 0.0,
            avg_pnl: 0.0,
        }
    }
}

/// Fully enriched trading decision
///
/// Written once to the event store and immutable afterwards; corrections
/// arrive as separate Outcome records referencing the store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: Signal,
    /// Confidence after historical calibration, clamped to [0, 1]
    pub calibrated_confidence: f64,
    /// calibrated_confidence - raw_confidence
    pub confidence_adjustment: f64,
    pub decision_quality: DecisionQuality,
    pub similar_outcomes: SimilarOutcomes,
    /// 1-3 deterministic, template-generated takeaways
    pub lessons: Vec<String>,
}

/// A decision as persisted, carrying its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDecision {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub decision: Decision,
}

/// Realized result of a closed position, reported by the ledger
///
/// References a Decision by id; never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub decision_id: String,
    pub realized_pnl: Decimal,
    pub realized_pnl_pct: f64,
    pub holding_duration_secs: i64,
    pub closed_at: DateTime<Utc>,
}

impl Outcome {
    /// Whether this outcome counts as a win for calibration purposes
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}

/// Message pushed to broadcast subscribers
///
/// Owned value types only; a copy is queued per subscriber and no
/// mutable state is shared across the channel boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A freshly stored decision
    Decision(StoredDecision),
    /// The classified regime for an instrument changed label
    RegimeChange {
        instrument: Instrument,
        previous: Option<String>,
        regime: Regime,
    },
    /// Operational alert (outcome recorded, degraded fetch, ...)
    Alert { code: String, message: String },
    /// Liveness probe sent by the broadcast manager
    Heartbeat { at: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn regime() -> Regime {
        Regime {
            label: "chop".to_string(),
            confidence: 0.8,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_feature_value_rejects_non_finite() {
        assert_eq!(FeatureValue::from_f64(f64::NAN), FeatureValue::Missing);
        assert_eq!(FeatureValue::from_f64(f64::INFINITY), FeatureValue::Missing);
        assert_eq!(
            FeatureValue::from_f64(f64::NEG_INFINITY),
            FeatureValue::Missing
        );
        assert_eq!(FeatureValue::from_f64(1.5), FeatureValue::Value(1.5));
    }

    #[test]
    fn test_feature_set_missing_lookup() {
        let mut fs = FeatureSet::new(Instrument::from("XYZ"), Utc::now());
        fs.set("rsi_14", Some(28.0));
        fs.set("zscore_20", Some(f64::NAN));

        assert_eq!(fs.value("rsi_14"), Some(28.0));
        assert_eq!(fs.value("zscore_20"), None);
        assert!(fs.is_missing("zscore_20"));
        assert!(fs.is_missing("never_computed"));
    }

    #[test]
    fn test_signal_level_ordering() {
        let long = Signal {
            instrument: Instrument::from("XYZ"),
            direction: Direction::Long,
            signal_type: SignalType::mean_reversion(),
            raw_confidence: 0.65,
            entry: dec!(100),
            stop: dec!(97),
            target: dec!(106),
            regime: regime(),
            reason: "test".to_string(),
        };
        assert!(long.levels_ordered());

        let mut short = long.clone();
        short.direction = Direction::Short;
        short.stop = dec!(103);
        short.target = dec!(94);
        assert!(short.levels_ordered());

        let mut bad = long;
        bad.stop = dec!(101);
        assert!(!bad.levels_ordered());
    }

    #[test]
    fn test_outcome_win() {
        let outcome = Outcome {
            decision_id: "evt-1".to_string(),
            realized_pnl: dec!(12.50),
            realized_pnl_pct: 1.25,
            holding_duration_secs: 3600,
            closed_at: Utc::now(),
        };
        assert!(outcome.is_win());

        let loss = Outcome {
            realized_pnl: dec!(-3.10),
            ..outcome
        };
        assert!(!loss.is_win());
    }
}
