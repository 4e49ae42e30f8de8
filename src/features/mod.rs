//! Features module - indicator computation over bar series
//!
//! `compute_features` is a pure function; `FeatureComputer` wraps it with
//! a per-instrument TTL cache keyed by the newest bar timestamp. Every
//! undefined computation (empty series, short series, zero divisor)
//! resolves to an explicit missing marker so downstream code abstains
//! instead of acting on a fabricated zero.

mod compute;

pub use compute::{compute_features, FeatureComputer};

/// Feature names produced by the computer
pub mod names {
    pub const LAST_CLOSE: &str = "last_close";
    pub const SMA_20: &str = "sma_20";
    pub const EMA_12: &str = "ema_12";
    pub const RSI_14: &str = "rsi_14";
    pub const ZSCORE_20: &str = "zscore_20";
    pub const ATR_14: &str = "atr_14";
    pub const REALIZED_VOL_20: &str = "realized_vol_20";
    pub const MOMENTUM_10: &str = "momentum_10";
}
