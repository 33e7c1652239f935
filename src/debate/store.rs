//! Idempotent persistence of finished debates
//!
//! `create` is a conditional write on (ticker, trigger_date): a second write for
//! the same key, or one colliding on signature, reports `AlreadyExists` and
//! leaves the stored record untouched. `update` is the only way to overwrite.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::DebateRecord;
use crate::data::{DataError, DataResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a new record unless one exists for its key or signature
    async fn create(&self, record: &DebateRecord) -> DataResult<StoreOutcome>;

    /// Overwrite an existing record, e.g. to attach enrichment.
    /// Fails with `DataError::NotFound` when no record matches key and signature.
    async fn update(&self, record: &DebateRecord) -> DataResult<()>;

    async fn lookup_by_signature(&self, signature: &str) -> DataResult<Option<DebateRecord>>;

    async fn lookup_by_key(&self, ticker: &str, trigger_date: NaiveDate) -> DataResult<Option<DebateRecord>>;

    /// Most recent records for `ticker`, newest trigger date first
    async fn lookup_by_ticker(&self, ticker: &str, limit: usize) -> DataResult<Vec<DebateRecord>>;

    /// Tickers with a record whose trigger date is on or after `since`
    async fn tickers_debated_since(&self, since: NaiveDate) -> DataResult<HashSet<String>>;
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    payload: serde_json::Value,
    enrichment: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    /// Columns win over the copy embedded in the payload
    fn into_record(self) -> DataResult<DebateRecord> {
        let mut record: DebateRecord = serde_json::from_value(self.payload)?;
        record.enrichment = self.enrichment;
        record.created_at = self.created_at;
        record.updated_at = self.updated_at;
        Ok(record)
    }
}

/// Postgres-backed result store over `debate_records`
#[derive(Debug, Clone)]
pub struct PgDebateStore {
    pool: PgPool,
}

impl PgDebateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn payload(record: &DebateRecord) -> DataResult<serde_json::Value> {
        let mut payload = serde_json::to_value(record)?;
        // Enrichment lives in its own column
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("enrichment");
        }
        Ok(payload)
    }
}

#[async_trait]
impl ResultStore for PgDebateStore {
    async fn create(&self, record: &DebateRecord) -> DataResult<StoreOutcome> {
        let payload = Self::payload(record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO debate_records
                (ticker, trigger_date, signature, verdict, confidence, payload, enrichment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&record.ticker)
        .bind(record.trigger_date)
        .bind(&record.signature)
        .bind(record.synthesis.verdict.as_str())
        .bind(record.synthesis.confidence)
        .bind(payload)
        .bind(&record.enrichment)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                ticker = %record.ticker,
                trigger_date = %record.trigger_date,
                signature = %record.signature,
                "Debate record already exists, keeping stored copy"
            );
            return Ok(StoreOutcome::AlreadyExists);
        }

        info!(
            ticker = %record.ticker,
            trigger_date = %record.trigger_date,
            signature = %record.signature,
            verdict = %record.synthesis.verdict,
            "Debate record stored"
        );
        Ok(StoreOutcome::Created)
    }

    async fn update(&self, record: &DebateRecord) -> DataResult<()> {
        let payload = Self::payload(record)?;

        let result = sqlx::query(
            r#"
            UPDATE debate_records
            SET verdict = $4, confidence = $5, payload = $6, enrichment = $7, updated_at = NOW()
            WHERE ticker = $1 AND trigger_date = $2 AND signature = $3
            "#,
        )
        .bind(&record.ticker)
        .bind(record.trigger_date)
        .bind(&record.signature)
        .bind(record.synthesis.verdict.as_str())
        .bind(record.synthesis.confidence)
        .bind(payload)
        .bind(&record.enrichment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!(
                "debate record {} on {} with signature {}",
                record.ticker, record.trigger_date, record.signature
            )));
        }

        debug!(ticker = %record.ticker, signature = %record.signature, "Debate record updated");
        Ok(())
    }

    async fn lookup_by_signature(&self, signature: &str) -> DataResult<Option<DebateRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT payload, enrichment, created_at, updated_at
            FROM debate_records
            WHERE signature = $1
            "#,
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn lookup_by_key(&self, ticker: &str, trigger_date: NaiveDate) -> DataResult<Option<DebateRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT payload, enrichment, created_at, updated_at
            FROM debate_records
            WHERE ticker = $1 AND trigger_date = $2
            "#,
        )
        .bind(ticker.to_ascii_uppercase())
        .bind(trigger_date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn lookup_by_ticker(&self, ticker: &str, limit: usize) -> DataResult<Vec<DebateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT payload, enrichment, created_at, updated_at
            FROM debate_records
            WHERE ticker = $1
            ORDER BY trigger_date DESC
            LIMIT $2
            "#,
        )
        .bind(ticker.to_ascii_uppercase())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn tickers_debated_since(&self, since: NaiveDate) -> DataResult<HashSet<String>> {
        let tickers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT ticker
            FROM debate_records
            WHERE trigger_date >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickers.into_iter().collect())
    }
}
