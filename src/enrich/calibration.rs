//! Isotonic regression over (raw confidence, won) pairs
//!
//! Pool-adjacent-violators produces a monotone step function mapping raw
//! confidence to an observed win probability. Monotone by construction:
//! a higher raw confidence can never calibrate lower than a lower one.

/// One pooled block of the fitted step function
#[derive(Debug, Clone, PartialEq)]
struct Block {
    min_raw: f64,
    max_raw: f64,
    value: f64,
    weight: f64,
}

/// Monotone calibration curve fitted with pool-adjacent-violators
#[derive(Debug, Clone)]
pub struct IsotonicCalibrator {
    blocks: Vec<Block>,
}

impl IsotonicCalibrator {
    /// Fit a curve from (raw confidence, won) samples; `None` when empty
    pub fn fit(samples: &[(f64, bool)]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<(f64, f64)> = samples
            .iter()
            .map(|(raw, won)| (raw.clamp(0.0, 1.0), if *won { 1.0 } else { 0.0 }))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut blocks: Vec<Block> = Vec::with_capacity(sorted.len());
        for (raw, won) in sorted {
            blocks.push(Block {
                min_raw: raw,
                max_raw: raw,
                value: won,
                weight: 1.0,
            });
            // Pool while the last block violates monotonicity
            while blocks.len() >= 2 {
                let last = blocks.len() - 1;
                if blocks[last - 1].value <= blocks[last].value {
                    break;
                }
                if let Some(pooled) = blocks.pop() {
                    let prev = &mut blocks[last - 1];
                    let weight = prev.weight + pooled.weight;
                    prev.value =
                        (prev.value * prev.weight + pooled.value * pooled.weight) / weight;
                    prev.weight = weight;
                    prev.max_raw = pooled.max_raw;
                }
            }
        }

        Some(Self { blocks })
    }

    /// Calibrated win probability for a raw confidence
    ///
    /// Step-function lookup: the last block whose lower edge is at or
    /// below `raw`; inputs beyond either end clamp to the edge block.
    pub fn calibrate(&self, raw: f64) -> f64 {
        let raw = raw.clamp(0.0, 1.0);
        let mut value = self.blocks[0].value;
        for block in &self.blocks {
            if block.min_raw <= raw {
                value = block.value;
            } else {
                break;
            }
        }
        value.clamp(0.0, 1.0)
    }

    /// Mean squared error of raw confidence against outcomes
    pub fn mse(samples: &[(f64, bool)]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples
            .iter()
            .map(|(raw, won)| {
                let target = if *won { 1.0 } else { 0.0 };
                (raw - target) * (raw - target)
            })
            .sum();
        sum / samples.len() as f64
    }
}
