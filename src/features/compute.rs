//! Indicator math and the caching feature computer

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

use super::names;
use crate::common::cache::TtlCache;
use crate::common::types::{Bar, FeatureSet, Instrument};

/// Compute the indicator set for one instrument from its bar series
///
/// Pure function; identical bars always produce an identical FeatureSet.
pub fn compute_features(instrument: &Instrument, bars: &[Bar]) -> FeatureSet {
    let as_of = bars
        .last()
        .map(|b| b.timestamp)
        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);

    let mut fs = FeatureSet::new(instrument.clone(), as_of);

    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close.to_f64()).collect();

    fs.set(names::LAST_CLOSE, closes.last().copied());
    fs.set(names::SMA_20, sma(&closes, 20));
    fs.set(names::EMA_12, ema(&closes, 12));
    fs.set(names::RSI_14, rsi(&closes, 14));
    fs.set(names::ZSCORE_20, zscore(&closes, 20));
    fs.set(names::ATR_14, atr(bars, 14));
    fs.set(names::REALIZED_VOL_20, realized_vol(&closes, 20));
    fs.set(names::MOMENTUM_10, momentum(&closes, 10));

    fs
}

fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period == 0 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period == 0 {
        return None;
    }
    // Seed with the SMA of the first `period` closes, then smooth forward
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = closes[..period].iter().sum::<f64>() / period as f64;
    for close in &closes[period..] {
        value = alpha * close + (1.0 - alpha) * value;
    }
    Some(value)
}

/// Wilder-smoothed RSI; needs period + 1 closes
fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 || period == 0 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        // No losses in the window: fully overbought, still finite
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Z-score of the last close against the trailing window mean/stdev
fn zscore(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period < 2 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return None;
    }
    Some((closes[closes.len() - 1] - mean) / stdev)
}

/// Average true range over the trailing window; needs period + 1 bars
fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 || period == 0 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let high = bars[i].high.to_f64()?;
        let low = bars[i].low.to_f64()?;
        let prev_close = bars[i - 1].close.to_f64()?;
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        true_ranges.push(tr);
    }

    let window = &true_ranges[true_ranges.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Stdev of log returns over the trailing window; needs period + 1 closes
fn realized_vol(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 || period < 2 {
        return None;
    }

    let mut returns = Vec::with_capacity(period);
    for i in (closes.len() - period)..closes.len() {
        if closes[i - 1] <= 0.0 || closes[i] <= 0.0 {
            return None;
        }
        returns.push((closes[i] / closes[i - 1]).ln());
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() as f64 - 1.0);
    Some(variance.sqrt())
}

/// Rate of change over the trailing window; needs period + 1 closes
fn momentum(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 || period == 0 {
        return None;
    }
    let past = closes[closes.len() - 1 - period];
    if past == 0.0 {
        return None;
    }
    Some(closes[closes.len() - 1] / past - 1.0)
}

/// Feature computer with a small per-instrument TTL cache
///
/// The cache key includes the newest bar timestamp, so fresh bars always
/// recompute while repeated reads within one cycle reuse the result.
pub struct FeatureComputer {
    cache: Mutex<TtlCache<(Instrument, DateTime<Utc>), FeatureSet>>,
}

impl FeatureComputer {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(TtlCache::new(cache_ttl)),
        }
    }

    /// Compute features, reusing a cached result for unchanged bars
    pub fn compute(&self, instrument: &Instrument, bars: &[Bar]) -> FeatureSet {
        let as_of = bars
            .last()
            .map(|b| b.timestamp)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);
        let key = (instrument.clone(), as_of);

        if let Some(cached) = self
            .cache
            .lock()
            .expect("feature cache lock poisoned")
            .get(&key)
        {
            return cached;
        }

        let fs = compute_features(instrument, bars);
        self.cache
            .lock()
            .expect("feature cache lock poisoned")
            .insert(key, fs.clone());
        fs
    }

    /// Number of live cache entries
    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .expect("feature cache lock poisoned")
            .purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let c = Decimal::from_f64_retain(close).unwrap();
                Bar {
                    timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + i as i64 * 60, 0)
                        .unwrap(),
                    open: c,
                    high: c + dec!(0.5),
                    low: c - dec!(0.5),
                    close: c,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    #[test]
    fn test_empty_series_is_all_missing() {
        let fs = compute_features(&Instrument::from("XYZ"), &[]);
        for name in [
            names::LAST_CLOSE,
            names::SMA_20,
            names::RSI_14,
            names::ZSCORE_20,
            names::ATR_14,
            names::REALIZED_VOL_20,
            names::MOMENTUM_10,
        ] {
            assert!(fs.is_missing(name), "{} should be missing", name);
        }
    }

    #[test]
    fn test_single_bar_only_last_close() {
        let bars = bars_from_closes(&[100.0]);
        let fs = compute_features(&Instrument::from("XYZ"), &bars);
        assert_eq!(fs.value(names::LAST_CLOSE), Some(100.0));
        assert!(fs.is_missing(names::SMA_20));
        assert!(fs.is_missing(names::RSI_14));
        assert!(fs.is_missing(names::ZSCORE_20));
    }

    #[test]
    fn test_constant_series_zscore_missing_not_nan() {
        // stdev is zero; the z-score divide must resolve to Missing
        let bars = bars_from_closes(&[100.0; 40]);
        let fs = compute_features(&Instrument::from("XYZ"), &bars);
        assert!(fs.is_missing(names::ZSCORE_20));
        // And nothing in the set is non-finite
        for value in fs.features.values() {
            if let Some(v) = value.as_f64() {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn test_rsi_bounds() {
        // Strictly rising closes: RSI pegged at 100, finite
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&rising);
        let fs = compute_features(&Instrument::from("XYZ"), &bars);
        let rsi = fs.value(names::RSI_14).unwrap();
        assert!(rsi > 99.0 && rsi <= 100.0);

        let falling: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let fs = compute_features(&Instrument::from("XYZ"), &bars_from_closes(&falling));
        let rsi = fs.value(names::RSI_14).unwrap();
        assert!(rsi < 1.0);
    }

    #[test]
    fn test_sma_known_value() {
        let closes: Vec<f64> = (1..=25).map(|i| i as f64).collect();
        let bars = bars_from_closes(&closes);
        let fs = compute_features(&Instrument::from("XYZ"), &bars);
        // SMA of 6..=25 is 15.5
        assert!((fs.value(names::SMA_20).unwrap() - 15.5).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_sign() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let fs = compute_features(&Instrument::from("XYZ"), &bars_from_closes(&rising));
        assert!(fs.value(names::MOMENTUM_10).unwrap() > 0.0);

        let falling: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let fs = compute_features(&Instrument::from("XYZ"), &bars_from_closes(&falling));
        assert!(fs.value(names::MOMENTUM_10).unwrap() < 0.0);
    }

    #[test]
    fn test_computer_caches_by_as_of() {
        let computer = FeatureComputer::new(Duration::from_secs(60));
        let instrument = Instrument::from("XYZ");
        let bars = bars_from_closes(&(0..30).map(|i| 100.0 + i as f64).collect::<Vec<_>>());

        let a = computer.compute(&instrument, &bars);
        let b = computer.compute(&instrument, &bars);
        assert_eq!(a, b);
        assert_eq!(computer.cache_len(), 1);
    }
}
