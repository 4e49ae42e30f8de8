//! JSONL file-backed event store
//!
//! One record per line, appended and flushed under a single writer lock.
//! Readers parse complete lines only, so a crash mid-write can at worst
//! leave one trailing partial line that is ignored on reads; `open`
//! terminates such a line before handing out the file, so later appends
//! always start on a fresh line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DecisionFilter, EventPayload, EventRecord, EventStore};
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{Outcome, StoredDecision};

struct Writer {
    file: File,
    next_seq: u64,
}

/// Append-only JSONL store, the default durable backend
pub struct JsonlEventStore {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl JsonlEventStore {
    /// Open (or create) the log and resume the id sequence from it
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let next_seq = existing
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<EventRecord>(line).ok())
            .count() as u64
            + 1;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // A crash mid-write can leave the file without a trailing newline;
        // terminate that line now or the next append would fuse onto it
        // and both records would be unreadable.
        if !existing.is_empty() && !existing.ends_with('\n') {
            warn!("Event log {:?} ends mid-record, sealing the partial line", path);
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        debug!("Opened event log {:?}, next seq {}", path, next_seq);
        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, next_seq }),
        })
    }

    /// Read and parse the whole log; tolerates one trailing partial line
    async fn read_records(&self) -> Result<Vec<EventRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unparseable event log line: {}", e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn append(&self, payload: EventPayload) -> Result<String> {
        // Single-writer discipline: id assignment, write and flush all
        // happen under one lock so records land whole and in order.
        let mut writer = self.writer.lock().await;

        let record = EventRecord {
            id: format!("evt-{}", writer.next_seq),
            recorded_at: Utc::now(),
            payload,
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        writer
            .file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PipelineError::Store(format!("append failed: {}", e)))?;
        writer
            .file
            .flush()
            .await
            .map_err(|e| PipelineError::Store(format!("flush failed: {}", e)))?;

        writer.next_seq += 1;
        Ok(record.id)
    }

    async fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<StoredDecision>> {
        Ok(self
            .read_records()
            .await?
            .into_iter()
            .filter_map(|record| match record.payload {
                EventPayload::Decision(decision) => Some(StoredDecision {
                    id: record.id,
                    recorded_at: record.recorded_at,
                    decision,
                }),
                EventPayload::Outcome(_) => None,
            })
            .filter(|stored| filter.matches(stored))
            .collect())
    }

    async fn outcomes_for(&self, decision_ids: &[String]) -> Result<Vec<Outcome>> {
        Ok(self
            .read_records()
            .await?
            .into_iter()
            .filter_map(|record| match record.payload {
                EventPayload::Outcome(outcome) if decision_ids.contains(&outcome.decision_id) => {
                    Some(outcome)
                }
                _ => None,
            })
            .collect())
    }

    async fn get_decision(&self, id: &str) -> Result<Option<StoredDecision>> {
        Ok(self
            .read_records()
            .await?
            .into_iter()
            .find_map(|record| match record.payload {
                EventPayload::Decision(decision) if record.id == id => Some(StoredDecision {
                    id: record.id,
                    recorded_at: record.recorded_at,
                    decision,
                }),
                _ => None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_decision;
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::open(dir.path().join("events.jsonl"))
            .await
            .unwrap();

        let decision = sample_decision("XYZ", "chop");
        let id = store
            .append(EventPayload::Decision(decision.clone()))
            .await
            .unwrap();

        let read_back = store.get_decision(&id).await.unwrap().unwrap();
        assert_eq!(read_back.decision, decision);
        assert_eq!(
            serde_json::to_vec(&read_back.decision).unwrap(),
            serde_json::to_vec(&decision).unwrap()
        );
    }

    #[tokio::test]
    async fn test_sequence_resumes_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let store = JsonlEventStore::open(&path).await.unwrap();
        let id1 = store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();
        drop(store);

        let store = JsonlEventStore::open(&path).await.unwrap();
        let id2 = store
            .append(EventPayload::Decision(sample_decision("ABC", "chop")))
            .await
            .unwrap();
        assert_ne!(id1, id2);

        let all = store.decisions(&DecisionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, id1);
        assert_eq!(all[1].id, id2);
    }

    #[tokio::test]
    async fn test_outcome_join() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::open(dir.path().join("events.jsonl"))
            .await
            .unwrap();

        let decision_id = store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();
        let outcome = Outcome {
            decision_id: decision_id.clone(),
            realized_pnl: dec!(12.5),
            realized_pnl_pct: 1.2,
            holding_duration_secs: 600,
            closed_at: Utc::now(),
        };
        store
            .attach_outcome(&decision_id, outcome.clone())
            .await
            .unwrap();

        let outcomes = store.outcomes_for(&[decision_id]).await.unwrap();
        assert_eq!(outcomes, vec![outcome]);
    }

    #[tokio::test]
    async fn test_partial_trailing_line_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let store = JsonlEventStore::open(&path).await.unwrap();
        store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();
        drop(store);

        // Simulate a crash mid-write
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        write!(file, "{{\"id\":\"evt-2\",\"recorded").unwrap();
        drop(file);

        let store = JsonlEventStore::open(&path).await.unwrap();
        let all = store.decisions(&DecisionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_partial_line_stays_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let store = JsonlEventStore::open(&path).await.unwrap();
        store
            .append(EventPayload::Decision(sample_decision("XYZ", "chop")))
            .await
            .unwrap();
        drop(store);

        // Crash mid-write: the file ends without a newline
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        write!(file, "{{\"id\":\"evt-2\",\"recorded").unwrap();
        drop(file);

        // An acknowledged append after reopen must remain readable
        let store = JsonlEventStore::open(&path).await.unwrap();
        let id = store
            .append(EventPayload::Decision(sample_decision("ABC", "chop")))
            .await
            .unwrap();
        assert_eq!(id, "evt-2");
        assert!(store.get_decision(&id).await.unwrap().is_some());

        let all = store.decisions(&DecisionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, id);
        assert_eq!(all[1].decision.signal.instrument.as_str(), "ABC");
    }
}
