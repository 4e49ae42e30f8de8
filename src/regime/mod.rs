//! Regime module - threshold-band market regime classification
//!
//! Labels market conditions from breadth and volatility inputs. The
//! bands are configuration-driven, so the label set is not a closed
//! enum; the defaults produce trending_up / trending_down / chop /
//! high_volatility. Classification is deterministic: identical inputs
//! always yield an identical Regime.

use chrono::Utc;

use crate::common::types::Regime;
use crate::config::types::RegimeConfig;

/// Default regime labels emitted by the classifier
pub mod labels {
    pub const TRENDING_UP: &str = "trending_up";
    pub const TRENDING_DOWN: &str = "trending_down";
    pub const CHOP: &str = "chop";
    pub const HIGH_VOLATILITY: &str = "high_volatility";
}

/// Breadth span used to normalize distance-to-threshold into confidence
const BREADTH_BAND: f64 = 0.2;

/// Classifies market regime from breadth and volatility
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Classify one cycle's market conditions
    ///
    /// `breadth` is a directional measure in [-1, 1]; `volatility` is a
    /// non-negative dispersion measure. Volatility dominates: above the
    /// high-volatility threshold the directional bands are not consulted.
    /// Confidence grows with distance from the deciding threshold and is
    /// clamped into [0.5, 1.0].
    pub fn classify(&self, breadth: f64, volatility: f64) -> Regime {
        let breadth = breadth.clamp(-1.0, 1.0);
        let volatility = volatility.max(0.0);
        let as_of = Utc::now();

        let (label, distance, band) = if volatility >= self.config.high_volatility_threshold {
            (
                labels::HIGH_VOLATILITY,
                volatility - self.config.high_volatility_threshold,
                self.config.high_volatility_threshold.max(f64::EPSILON),
            )
        } else if breadth >= self.config.trend_up_threshold {
            (
                labels::TRENDING_UP,
                breadth - self.config.trend_up_threshold,
                BREADTH_BAND,
            )
        } else if breadth <= self.config.trend_down_threshold {
            (
                labels::TRENDING_DOWN,
                self.config.trend_down_threshold - breadth,
                BREADTH_BAND,
            )
        } else {
            // Chop: confidence from distance to the nearest exit threshold
            let to_up = self.config.trend_up_threshold - breadth;
            let to_down = breadth - self.config.trend_down_threshold;
            let to_vol = self.config.high_volatility_threshold - volatility;
            (labels::CHOP, to_up.min(to_down).min(to_vol), BREADTH_BAND)
        };

        let confidence = (0.5 + 0.5 * (distance / band)).clamp(0.5, 1.0);

        Regime {
            label: label.to_string(),
            confidence,
            as_of,
        }
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}
