//! SignalPipeline Library
//!
//! A Rust service that turns multi-provider market data into calibrated
//! trading decisions: fetch bars with failover, compute indicators,
//! classify the regime, generate rule-based signals, calibrate them
//! against recorded history, persist every decision and outcome to an
//! append-only event store, and fan the results out to subscribers.

pub mod broadcast;
pub mod common;
pub mod config;
pub mod enrich;
pub mod features;
pub mod pipeline;
pub mod providers;
pub mod regime;
pub mod signal;
pub mod store;

// Re-export commonly used types
pub use common::errors::{PipelineError, Result};
pub use common::types::{
    Bar, Decision, DecisionQuality, Direction, FeatureSet, FeatureValue, Instrument,
    OutboundMessage, Outcome, Regime, Signal, SignalType, SimilarOutcomes, StoredDecision,
};
pub use config::types::AppConfig;

// Component types
pub use broadcast::{BroadcastManager, SubscriberHandle};
pub use enrich::DecisionEnricher;
pub use features::FeatureComputer;
pub use pipeline::{CycleReport, DecisionPipeline, PipelineStatus};
pub use providers::{BarProvider, HttpBarProvider, MarketDataFetcher, ProviderHealthTracker};
pub use regime::RegimeClassifier;
pub use signal::SignalGenerator;
pub use store::{EventPayload, EventStore, JsonlEventStore, MemoryEventStore, PostgresEventStore};
