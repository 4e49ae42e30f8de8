//! In-memory event store for tests and dry runs

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{DecisionFilter, EventPayload, EventRecord, EventStore};
use crate::common::errors::Result;
use crate::common::types::{Outcome, StoredDecision};

/// Vec-backed store following the same append-only discipline as the
/// durable backends
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: RwLock<Vec<EventRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, payload: EventPayload) -> Result<String> {
        let mut records = self.records.write().expect("store lock poisoned");
        let id = format!("evt-{}", records.len() + 1);
        records.push(EventRecord {
            id: id.clone(),
            recorded_at: Utc::now(),
            payload,
        });
        Ok(id)
    }

    async fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<StoredDecision>> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(records
            .iter()
            .filter_map(|record| match &record.payload {
                EventPayload::Decision(decision) => Some(StoredDecision {
                    id: record.id.clone(),
                    recorded_at: record.recorded_at,
                    decision: decision.clone(),
                }),
                EventPayload::Outcome(_) => None,
            })
            .filter(|stored| filter.matches(stored))
            .collect())
    }

    async fn outcomes_for(&self, decision_ids: &[String]) -> Result<Vec<Outcome>> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(records
            .iter()
            .filter_map(|record| match &record.payload {
                EventPayload::Outcome(outcome)
                    if decision_ids.contains(&outcome.decision_id) =>
                {
                    Some(outcome.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn get_decision(&self, id: &str) -> Result<Option<StoredDecision>> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(records.iter().find_map(|record| match &record.payload {
            EventPayload::Decision(decision) if record.id == id => Some(StoredDecision {
                id: record.id.clone(),
                recorded_at: record.recorded_at,
                decision: decision.clone(),
            }),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_decision;
    use super::*;
    use crate::common::types::SignalType;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_append_and_scan() {
        let store = MemoryEventStore::new();
        let id1 = store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();
        let id2 = store
            .append(EventPayload::Decision(sample_decision("ABC", "chop")))
            .await
            .unwrap();
        assert_ne!(id1, id2);

        let all = store.decisions(&DecisionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        // Append order preserved
        assert_eq!(all[0].id, id1);
        assert_eq!(all[1].id, id2);

        let filtered = store
            .decisions(&DecisionFilter {
                instrument: Some("XYZ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_outcome_links_by_id() {
        let store = MemoryEventStore::new();
        let decision_id = store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();

        let outcome = Outcome {
            decision_id: "ignored".to_string(),
            realized_pnl: dec!(5),
            realized_pnl_pct: 0.5,
            holding_duration_secs: 60,
            closed_at: Utc::now(),
        };
        store.attach_outcome(&decision_id, outcome).await.unwrap();

        let outcomes = store.outcomes_for(&[decision_id.clone()]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].decision_id, decision_id);
    }

    #[tokio::test]
    async fn test_point_lookup() {
        let store = MemoryEventStore::new();
        let id = store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();

        let found = store.get_decision(&id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(
            found.unwrap().decision.signal.signal_type,
            SignalType::mean_reversion()
        );
        assert!(store.get_decision("evt-999").await.unwrap().is_none());
    }
}
