//! Postgres event store backend (sqlx)
//!
//! Same append-only discipline as the JSONL backend, with the id
//! sequence delegated to a bigserial column and filtering pushed into
//! SQL over denormalized columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use super::{DecisionFilter, EventPayload, EventStore};
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{Outcome, StoredDecision};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id          BIGSERIAL PRIMARY KEY,
    kind        TEXT NOT NULL,
    decision_id TEXT,
    instrument  TEXT,
    signal_type TEXT,
    regime      TEXT,
    payload     JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL
)
"#;

/// sqlx-backed event store
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect and ensure the events table exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        debug!("Postgres event store ready");
        Ok(Self { pool })
    }

    fn seq_from_id(id: &str) -> Option<i64> {
        id.strip_prefix("evt-").and_then(|s| s.parse().ok())
    }

    fn id_from_seq(seq: i64) -> String {
        format!("evt-{}", seq)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, payload: EventPayload) -> Result<String> {
        let recorded_at: DateTime<Utc> = Utc::now();

        let (kind, decision_id, instrument, signal_type, regime, body) = match &payload {
            EventPayload::Decision(decision) => (
                "decision",
                None,
                Some(decision.signal.instrument.as_str().to_string()),
                Some(decision.signal.signal_type.as_str().to_string()),
                Some(decision.signal.regime.label.clone()),
                serde_json::to_value(decision)?,
            ),
            EventPayload::Outcome(outcome) => (
                "outcome",
                Some(outcome.decision_id.clone()),
                None,
                None,
                None,
                serde_json::to_value(outcome)?,
            ),
        };

        let row = sqlx::query(
            "INSERT INTO events (kind, decision_id, instrument, signal_type, regime, payload, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(kind)
        .bind(decision_id)
        .bind(instrument)
        .bind(signal_type)
        .bind(regime)
        .bind(body)
        .bind(recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::Store(format!("append failed: {}", e)))?;

        let seq: i64 = row.get(0);
        Ok(Self::id_from_seq(seq))
    }

    async fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<StoredDecision>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, recorded_at, payload FROM events WHERE kind = 'decision'",
        );
        if let Some(signal_type) = &filter.signal_type {
            qb.push(" AND signal_type = ");
            qb.push_bind(signal_type.as_str().to_string());
        }
        if let Some(label) = &filter.regime_label {
            qb.push(" AND regime = ");
            qb.push_bind(label.clone());
        }
        if let Some(instrument) = &filter.instrument {
            qb.push(" AND instrument = ");
            qb.push_bind(instrument.as_str().to_string());
        }
        if let Some(since) = &filter.since {
            qb.push(" AND recorded_at >= ");
            qb.push_bind(*since);
        }
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut decisions = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.get("id");
            let recorded_at: DateTime<Utc> = row.get("recorded_at");
            let payload: serde_json::Value = row.get("payload");
            decisions.push(StoredDecision {
                id: Self::id_from_seq(seq),
                recorded_at,
                decision: serde_json::from_value(payload)?,
            });
        }
        Ok(decisions)
    }

    async fn outcomes_for(&self, decision_ids: &[String]) -> Result<Vec<Outcome>> {
        if decision_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT payload FROM events WHERE kind = 'outcome' AND decision_id = ANY($1) ORDER BY id",
        )
        .bind(decision_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.get("payload");
            outcomes.push(serde_json::from_value(payload)?);
        }
        Ok(outcomes)
    }

    async fn get_decision(&self, id: &str) -> Result<Option<StoredDecision>> {
        let seq = match Self::seq_from_id(id) {
            Some(seq) => seq,
            None => return Ok(None),
        };

        let row = sqlx::query(
            "SELECT id, recorded_at, payload FROM events WHERE kind = 'decision' AND id = $1",
        )
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let recorded_at: DateTime<Utc> = row.get("recorded_at");
                let payload: serde_json::Value = row.get("payload");
                Ok(Some(StoredDecision {
                    id: id.to_string(),
                    recorded_at,
                    decision: serde_json::from_value(payload)?,
                }))
            }
            None => Ok(None),
        }
    }
}
