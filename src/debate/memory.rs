//! In-process result store with the same conditional-write semantics as Postgres

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::store::{ResultStore, StoreOutcome};
use super::DebateRecord;
use crate::data::{DataError, DataResult};

#[derive(Debug, Default)]
pub struct MemoryDebateStore {
    records: RwLock<HashMap<(String, NaiveDate), DebateRecord>>,
}

impl MemoryDebateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the create check
    pub async fn insert(&self, record: DebateRecord) {
        let key = (record.ticker.clone(), record.trigger_date);
        self.records.write().await.insert(key, record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, ticker: &str, trigger_date: NaiveDate) -> Option<DebateRecord> {
        self.records
            .read()
            .await
            .get(&(ticker.to_string(), trigger_date))
            .cloned()
    }
}

#[async_trait]
impl ResultStore for MemoryDebateStore {
    async fn create(&self, record: &DebateRecord) -> DataResult<StoreOutcome> {
        // Check and insert under one write lock
        let mut records = self.records.write().await;
        let key = (record.ticker.clone(), record.trigger_date);
        if records.contains_key(&key) || records.values().any(|r| r.signature == record.signature) {
            return Ok(StoreOutcome::AlreadyExists);
        }
        records.insert(key, record.clone());
        Ok(StoreOutcome::Created)
    }

    async fn update(&self, record: &DebateRecord) -> DataResult<()> {
        let mut records = self.records.write().await;
        let key = (record.ticker.clone(), record.trigger_date);
        match records.get_mut(&key) {
            Some(existing) if existing.signature == record.signature => {
                let created_at = existing.created_at;
                *existing = record.clone();
                existing.created_at = created_at;
                existing.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(DataError::NotFound(format!(
                "debate record {} on {} with signature {}",
                record.ticker, record.trigger_date, record.signature
            ))),
        }
    }

    async fn lookup_by_signature(&self, signature: &str) -> DataResult<Option<DebateRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.signature == signature)
            .cloned())
    }

    async fn lookup_by_key(&self, ticker: &str, trigger_date: NaiveDate) -> DataResult<Option<DebateRecord>> {
        Ok(self.get(&ticker.to_ascii_uppercase(), trigger_date).await)
    }

    async fn lookup_by_ticker(&self, ticker: &str, limit: usize) -> DataResult<Vec<DebateRecord>> {
        let ticker = ticker.to_ascii_uppercase();
        let mut matches: Vec<DebateRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.ticker == ticker)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.trigger_date.cmp(&a.trigger_date));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn tickers_debated_since(&self, since: NaiveDate) -> DataResult<HashSet<String>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.trigger_date >= since)
            .map(|r| r.ticker.clone())
            .collect())
    }
}
