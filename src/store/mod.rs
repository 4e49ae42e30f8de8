//! Store module - durable append-only event log
//!
//! Every decision and every later-observed outcome is appended here;
//! nothing is ever rewritten. The enricher's whole learning loop reads
//! from this log, so append failures must propagate loudly. Three
//! backends share one trait: a JSONL file (default), an in-memory store
//! for tests and dry runs, and Postgres via sqlx.

mod jsonl;
mod memory;
mod postgres;

pub use jsonl::JsonlEventStore;
pub use memory::MemoryEventStore;
pub use postgres::PostgresEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::errors::Result;
use crate::common::types::{Decision, Instrument, Outcome, SignalType, StoredDecision};

/// Payload of one append-only event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Decision(Decision),
    Outcome(Outcome),
}

/// One persisted record with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Store-assigned, monotonically increasing id ("evt-{seq}")
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Filter for decision scans; all fields are conjunctive
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub signal_type: Option<SignalType>,
    pub regime_label: Option<String>,
    pub instrument: Option<Instrument>,
    pub since: Option<DateTime<Utc>>,
}

impl DecisionFilter {
    /// Whether a stored decision passes this filter
    pub fn matches(&self, stored: &StoredDecision) -> bool {
        let signal = &stored.decision.signal;
        if let Some(st) = &self.signal_type {
            if &signal.signal_type != st {
                return false;
            }
        }
        if let Some(label) = &self.regime_label {
            if &signal.regime.label != label {
                return false;
            }
        }
        if let Some(instrument) = &self.instrument {
            if &signal.instrument != instrument {
                return false;
            }
        }
        if let Some(since) = &self.since {
            if stored.recorded_at < *since {
                return false;
            }
        }
        true
    }
}

/// Append-only event store with snapshot-consistent reads
///
/// Appends are single-writer-at-a-time; readers never observe a partial
/// record. Corrections are new appended records, never mutations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one record; returns the store-assigned id
    ///
    /// This is the sole source of truth for learning, so failures here
    /// must not be swallowed by callers.
    async fn append(&self, payload: EventPayload) -> Result<String>;

    /// Scan decisions matching the filter, in append order
    async fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<StoredDecision>>;

    /// All outcomes referencing any of the given decision ids
    async fn outcomes_for(&self, decision_ids: &[String]) -> Result<Vec<Outcome>>;

    /// Point lookup of a decision by its store-assigned id
    async fn get_decision(&self, id: &str) -> Result<Option<StoredDecision>>;

    /// Append an outcome for a previously stored decision
    ///
    /// Convenience over `append`; the outcome's decision_id is forced to
    /// the given id.
    async fn attach_outcome(&self, decision_id: &str, mut outcome: Outcome) -> Result<String> {
        outcome.decision_id = decision_id.to_string();
        self.append(EventPayload::Outcome(outcome)).await
    }
}
