//! In-process market data and signal storage, for dry runs and tests

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{DataError, DataResult, IndexMember, MarketStore, PriceRow};
use crate::trading::signals::{Signal, SignalRepository};

#[derive(Debug, Default)]
pub struct MemoryMarket {
    prices: RwLock<HashMap<NaiveDate, Vec<PriceRow>>>,
    members: RwLock<HashMap<String, Vec<IndexMember>>>,
    signals: RwLock<HashMap<NaiveDate, Vec<Signal>>>,
    unavailable: AtomicBool,
}

impl MemoryMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_prices(&self, date: NaiveDate, rows: Vec<PriceRow>) {
        self.prices.write().await.entry(date).or_default().extend(rows);
    }

    /// Replace the date's rows, as a corrected price load would
    pub async fn set_prices(&self, date: NaiveDate, rows: Vec<PriceRow>) {
        self.prices.write().await.insert(date, rows);
    }

    pub async fn add_members(&self, index_code: &str, members: Vec<IndexMember>) {
        self.members
            .write()
            .await
            .entry(index_code.to_string())
            .or_default()
            .extend(members);
    }

    /// Make every read fail as if the database were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> DataResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DataError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketStore for MemoryMarket {
    async fn price_rows(&self, date: NaiveDate) -> DataResult<Vec<PriceRow>> {
        self.check_available()?;
        match self.prices.read().await.get(&date) {
            Some(rows) if !rows.is_empty() => Ok(rows.clone()),
            _ => Err(DataError::NoData {
                what: "daily prices".to_string(),
                date: date.to_string(),
            }),
        }
    }

    async fn index_members(&self, index_code: &str) -> DataResult<Vec<IndexMember>> {
        self.check_available()?;
        Ok(self
            .members
            .read()
            .await
            .get(index_code)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SignalRepository for MemoryMarket {
    async fn replace_signals(&self, date: NaiveDate, signals: &[Signal]) -> DataResult<usize> {
        self.check_available()?;
        self.signals.write().await.insert(date, signals.to_vec());
        Ok(signals.len())
    }

    async fn signals_on(&self, date: NaiveDate) -> DataResult<Vec<Signal>> {
        self.check_available()?;
        Ok(self
            .signals
            .read()
            .await
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::signals::Direction;
    use chrono::Utc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()
    }

    #[tokio::test]
    async fn test_missing_date_has_no_data() {
        let market = MemoryMarket::new();
        let err = market.price_rows(date()).await.unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_toggle() {
        let market = MemoryMarket::new();
        market.set_unavailable(true);
        let err = market.index_members("SPX").await.unwrap_err();
        assert!(err.is_unavailable());

        market.set_unavailable(false);
        assert!(market.index_members("SPX").await.unwrap().is_empty());
    }

    fn signal(ticker: &str) -> Signal {
        Signal {
            ticker: ticker.to_string(),
            signal_date: date(),
            close_price: 102.0,
            prev_close_price: 99.0,
            price_change_pct: 3.03,
            ma20_direction: Direction::CrossAbove,
            ma60_direction: Direction::None,
            ma250_direction: Direction::None,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_replace_signals_overwrites_date() {
        let market = MemoryMarket::new();
        let other_day = date().pred_opt().unwrap();
        market.replace_signals(other_day, &[signal("KO")]).await.unwrap();
        market
            .replace_signals(date(), &[signal("AAPL"), signal("NVDA")])
            .await
            .unwrap();

        let stored = market.replace_signals(date(), &[signal("NVDA")]).await.unwrap();

        assert_eq!(stored, 1);
        let tickers: Vec<_> = market
            .signals_on(date())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.ticker)
            .collect();
        assert_eq!(tickers, vec!["NVDA"]);
        assert_eq!(market.signals_on(other_day).await.unwrap().len(), 1);
    }
}
