//! Enrich module - confidence calibration against historical outcomes
//!
//! The enricher turns a raw Signal into a Decision: it reads prior
//! same-type/same-regime decisions from the event store, recalibrates
//! confidence against their observed outcomes, attaches a summary of
//! similar past decisions and a few template-generated lessons. History
//! being unavailable never blocks a Decision; it degrades to raw
//! confidence passed through.

mod calibration;
mod enricher;

pub use calibration::IsotonicCalibrator;
pub use enricher::{CalibrationSnapshot, DecisionEnricher, HistoryStats};
