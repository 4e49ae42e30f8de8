//! Signal generator - ordered rule evaluation and price-level sizing

use std::collections::HashMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::rules::{BoxedRule, BreakoutRule, MeanReversionRule, MomentumRule};
use crate::common::types::{Direction, FeatureSet, Instrument, Regime, Signal, SignalType};
use crate::features::names;
use crate::regime::labels;

/// ATR multiple for the protective stop
const STOP_ATR_MULT: Decimal = dec!(1.5);

/// ATR multiple for the profit target
const TARGET_ATR_MULT: Decimal = dec!(3.0);

/// Fallback stop distance when ATR is missing, as a fraction of entry
const STOP_PCT: Decimal = dec!(0.02);

/// Fallback target distance when ATR is missing, as a fraction of entry
const TARGET_PCT: Decimal = dec!(0.04);

/// Confidence a (signal_type, regime) pair falls back to when untabulated
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Produces at most one signal per instrument per cycle
///
/// Rules run in list order; the first match wins outright. There is no
/// voting across rules.
pub struct SignalGenerator {
    rules: Vec<BoxedRule>,
    confidence_table: HashMap<(SignalType, String), f64>,
}

impl SignalGenerator {
    /// Generator with the shipped rule ordering and confidence table
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(MeanReversionRule::default()),
            Box::new(MomentumRule::default()),
            Box::new(BreakoutRule::default()),
        ])
    }

    /// Generator with a custom rule ordering (highest priority first)
    pub fn with_rules(rules: Vec<BoxedRule>) -> Self {
        Self {
            rules,
            confidence_table: default_confidence_table(),
        }
    }

    /// Evaluate the rule list; `None` means no rule fired this cycle
    pub fn generate(
        &self,
        instrument: &Instrument,
        features: &FeatureSet,
        regime: &Regime,
    ) -> Option<Signal> {
        let entry = Decimal::from_f64(features.value(names::LAST_CLOSE)?)?;
        if entry <= Decimal::ZERO {
            return None;
        }

        let matched = self.rules.iter().find_map(|rule| {
            let m = rule.evaluate(features, regime);
            if m.is_some() {
                debug!(rule = rule.name(), "Rule fired for {}", instrument);
            }
            m
        })?;

        let raw_confidence = self
            .confidence_table
            .get(&(matched.signal_type.clone(), regime.label.clone()))
            .copied()
            .unwrap_or(DEFAULT_CONFIDENCE);

        let (stop, target) = price_levels(entry, matched.direction, features);

        Some(Signal {
            instrument: instrument.clone(),
            direction: matched.direction,
            signal_type: matched.signal_type,
            raw_confidence,
            entry,
            stop,
            target,
            regime: regime.clone(),
            reason: matched.reason,
        })
    }
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive stop/target from ATR, falling back to entry percentages
///
/// Both paths preserve stop < entry < target for longs and the reverse
/// for shorts.
fn price_levels(entry: Decimal, direction: Direction, features: &FeatureSet) -> (Decimal, Decimal) {
    let atr = features
        .value(names::ATR_14)
        .and_then(Decimal::from_f64)
        .filter(|atr| *atr > Decimal::ZERO);

    let (stop_distance, target_distance) = match atr {
        Some(atr) => (atr * STOP_ATR_MULT, atr * TARGET_ATR_MULT),
        None => (entry * STOP_PCT, entry * TARGET_PCT),
    };

    match direction {
        Direction::Long => (entry - stop_distance, entry + target_distance),
        Direction::Short => (entry + stop_distance, entry - target_distance),
        Direction::Flat => (entry, entry),
    }
}

/// Static raw-confidence lookup by (signal_type, regime label)
fn default_confidence_table() -> HashMap<(SignalType, String), f64> {
    let mut table = HashMap::new();
    let mut set = |st: SignalType, label: &str, conf: f64| {
        table.insert((st, label.to_string()), conf);
    };

    set(SignalType::mean_reversion(), labels::CHOP, 0.65);
    set(SignalType::mean_reversion(), labels::TRENDING_UP, 0.55);
    set(SignalType::mean_reversion(), labels::TRENDING_DOWN, 0.55);
    set(SignalType::mean_reversion(), labels::HIGH_VOLATILITY, 0.45);

    set(SignalType::momentum(), labels::TRENDING_UP, 0.62);
    set(SignalType::momentum(), labels::TRENDING_DOWN, 0.62);
    set(SignalType::momentum(), labels::CHOP, 0.45);
    set(SignalType::momentum(), labels::HIGH_VOLATILITY, 0.50);

    set(SignalType::breakout(), labels::HIGH_VOLATILITY, 0.60);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn features(pairs: &[(&str, f64)]) -> FeatureSet {
        let mut fs = FeatureSet::new(Instrument::from("XYZ"), Utc::now());
        for (name, value) in pairs {
            fs.set(*name, Some(*value));
        }
        fs
    }

    fn regime(label: &str) -> Regime {
        Regime {
            label: label.to_string(),
            confidence: 0.8,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_mean_reversion_in_chop_scenario() {
        // RSI 28 and z-score -1.8 in chop: long mean reversion at 0.65
        let generator = SignalGenerator::new();
        let fs = features(&[
            (names::LAST_CLOSE, 100.0),
            (names::RSI_14, 28.0),
            (names::ZSCORE_20, -1.8),
            (names::ATR_14, 2.0),
        ]);

        let signal = generator
            .generate(&Instrument::from("XYZ"), &fs, &regime(labels::CHOP))
            .unwrap();

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.signal_type, SignalType::mean_reversion());
        assert_eq!(signal.raw_confidence, 0.65);
        assert!(signal.levels_ordered());
        assert_eq!(signal.entry, dec!(100));
        assert_eq!(signal.stop, dec!(97));
        assert_eq!(signal.target, dec!(106));
    }

    #[test]
    fn test_no_rule_fired_is_none() {
        let generator = SignalGenerator::new();
        let fs = features(&[
            (names::LAST_CLOSE, 100.0),
            (names::RSI_14, 50.0),
            (names::ZSCORE_20, 0.1),
            (names::MOMENTUM_10, 0.0),
        ]);
        assert!(generator
            .generate(&Instrument::from("XYZ"), &fs, &regime(labels::CHOP))
            .is_none());
    }

    #[test]
    fn test_missing_last_close_abstains() {
        let generator = SignalGenerator::new();
        let fs = features(&[(names::RSI_14, 28.0), (names::ZSCORE_20, -1.8)]);
        assert!(generator
            .generate(&Instrument::from("XYZ"), &fs, &regime(labels::CHOP))
            .is_none());
    }

    #[test]
    fn test_short_levels_reversed() {
        let generator = SignalGenerator::new();
        let fs = features(&[
            (names::LAST_CLOSE, 100.0),
            (names::RSI_14, 78.0),
            (names::ZSCORE_20, 2.0),
            (names::ATR_14, 1.0),
        ]);

        let signal = generator
            .generate(&Instrument::from("XYZ"), &fs, &regime(labels::CHOP))
            .unwrap();

        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.stop > signal.entry);
        assert!(signal.target < signal.entry);
        assert!(signal.levels_ordered());
    }

    #[test]
    fn test_fallback_levels_without_atr() {
        let generator = SignalGenerator::new();
        let fs = features(&[
            (names::LAST_CLOSE, 100.0),
            (names::RSI_14, 28.0),
            (names::ZSCORE_20, -1.8),
        ]);

        let signal = generator
            .generate(&Instrument::from("XYZ"), &fs, &regime(labels::CHOP))
            .unwrap();

        assert_eq!(signal.stop, dec!(98));
        assert_eq!(signal.target, dec!(104));
        assert!(signal.levels_ordered());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Conditions satisfy both mean reversion and breakout; priority
        // order means mean reversion supplies the signal.
        let generator = SignalGenerator::new();
        let fs = features(&[
            (names::LAST_CLOSE, 100.0),
            (names::RSI_14, 22.0),
            (names::ZSCORE_20, -2.5),
            (names::ATR_14, 2.0),
        ]);

        let signal = generator
            .generate(
                &Instrument::from("XYZ"),
                &fs,
                &regime(labels::HIGH_VOLATILITY),
            )
            .unwrap();
        assert_eq!(signal.signal_type, SignalType::mean_reversion());
    }
}
