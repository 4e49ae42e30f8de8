//! Strategy rules evaluated by the signal generator

use crate::common::types::{Direction, FeatureSet, Regime, SignalType};
use crate::features::names;
use crate::regime::labels;

/// Outcome of a rule whose preconditions held
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub direction: Direction,
    pub signal_type: SignalType,
    pub reason: String,
}

/// One strategy rule in the generator's priority list
///
/// Rules abstain (`None`) when any required feature is missing; a
/// missing input never counts as zero.
pub trait SignalRule: Send + Sync {
    /// Stable rule name, used in logs
    fn name(&self) -> &str;

    /// Evaluate preconditions against the features and regime
    fn evaluate(&self, features: &FeatureSet, regime: &Regime) -> Option<RuleMatch>;
}

/// Boxed rule for the generator's ordered list
pub type BoxedRule = Box<dyn SignalRule>;

/// Fade oversold/overbought extremes
///
/// Long when RSI is oversold and the close sits well below its trailing
/// mean; short on the mirrored conditions.
pub struct MeanReversionRule {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub zscore_extreme: f64,
}

impl Default for MeanReversionRule {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            zscore_extreme: 1.5,
        }
    }
}

impl SignalRule for MeanReversionRule {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn evaluate(&self, features: &FeatureSet, _regime: &Regime) -> Option<RuleMatch> {
        let rsi = features.value(names::RSI_14)?;
        let zscore = features.value(names::ZSCORE_20)?;

        if rsi < self.rsi_oversold && zscore <= -self.zscore_extreme {
            return Some(RuleMatch {
                direction: Direction::Long,
                signal_type: SignalType::mean_reversion(),
                reason: format!(
                    "RSI {:.1} oversold with z-score {:.2} below trailing mean",
                    rsi, zscore
                ),
            });
        }

        if rsi > self.rsi_overbought && zscore >= self.zscore_extreme {
            return Some(RuleMatch {
                direction: Direction::Short,
                signal_type: SignalType::mean_reversion(),
                reason: format!(
                    "RSI {:.1} overbought with z-score {:.2} above trailing mean",
                    rsi, zscore
                ),
            });
        }

        None
    }
}

/// Ride an established trend when momentum agrees with the regime
pub struct MomentumRule {
    pub min_momentum: f64,
}

impl Default for MomentumRule {
    fn default() -> Self {
        Self { min_momentum: 0.02 }
    }
}

impl SignalRule for MomentumRule {
    fn name(&self) -> &str {
        "momentum"
    }

    fn evaluate(&self, features: &FeatureSet, regime: &Regime) -> Option<RuleMatch> {
        let momentum = features.value(names::MOMENTUM_10)?;

        if regime.label == labels::TRENDING_UP && momentum >= self.min_momentum {
            return Some(RuleMatch {
                direction: Direction::Long,
                signal_type: SignalType::momentum(),
                reason: format!(
                    "Momentum {:.2}% aligned with up-trend regime",
                    momentum * 100.0
                ),
            });
        }

        if regime.label == labels::TRENDING_DOWN && momentum <= -self.min_momentum {
            return Some(RuleMatch {
                direction: Direction::Short,
                signal_type: SignalType::momentum(),
                reason: format!(
                    "Momentum {:.2}% aligned with down-trend regime",
                    momentum * 100.0
                ),
            });
        }

        None
    }
}

/// Trade range expansions in high-volatility regimes
pub struct BreakoutRule {
    pub zscore_breakout: f64,
}

impl Default for BreakoutRule {
    fn default() -> Self {
        Self {
            zscore_breakout: 2.0,
        }
    }
}

impl SignalRule for BreakoutRule {
    fn name(&self) -> &str {
        "breakout"
    }

    fn evaluate(&self, features: &FeatureSet, regime: &Regime) -> Option<RuleMatch> {
        if regime.label != labels::HIGH_VOLATILITY {
            return None;
        }
        let zscore = features.value(names::ZSCORE_20)?;

        if zscore >= self.zscore_breakout {
            return Some(RuleMatch {
                direction: Direction::Long,
                signal_type: SignalType::breakout(),
                reason: format!("Close broke {:.2} sigmas above its trailing band", zscore),
            });
        }

        if zscore <= -self.zscore_breakout {
            return Some(RuleMatch {
                direction: Direction::Short,
                signal_type: SignalType::breakout(),
                reason: format!("Close broke {:.2} sigmas below its trailing band", zscore),
            });
        }

        None
    }
}
