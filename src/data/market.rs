use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{DataError, DataResult, IndexMember, MarketStore, PriceRow};
use crate::trading::signals::{Signal, SignalRepository};

/// Calendar days searched backwards for the previous trading close
const PREV_CLOSE_LOOKBACK_DAYS: i32 = 14;

/// Postgres access to ingested prices, index membership and crossover signals
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: PgPool,
    /// Index codes whose constituents form the scanned universe
    universe: Vec<String>,
}

impl PgMarketStore {
    pub fn new(pool: PgPool, universe: Vec<String>) -> Self {
        Self { pool, universe }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn price_rows(&self, date: NaiveDate) -> DataResult<Vec<PriceRow>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            WITH recent AS (
                SELECT
                    p.ticker,
                    p.trade_date,
                    p.close,
                    p.ma20,
                    p.ma60,
                    p.ma250,
                    LAG(p.close) OVER (PARTITION BY p.ticker ORDER BY p.trade_date) AS prev_close
                FROM daily_prices p
                WHERE p.trade_date BETWEEN $1::date - $3::int AND $1::date
                  AND p.ticker IN (
                      SELECT ticker FROM index_constituents WHERE index_code = ANY($2)
                  )
            )
            SELECT ticker, close, prev_close, ma20, ma60, ma250
            FROM recent
            WHERE trade_date = $1 AND prev_close IS NOT NULL
            ORDER BY ticker
            "#,
        )
        .bind(date)
        .bind(&self.universe)
        .bind(PREV_CLOSE_LOOKBACK_DAYS)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(DataError::NoData {
                what: "daily prices".to_string(),
                date: date.to_string(),
            });
        }

        debug!(%date, rows = rows.len(), "Loaded price rows");
        Ok(rows)
    }

    async fn index_members(&self, index_code: &str) -> DataResult<Vec<IndexMember>> {
        let members: Vec<IndexMember> = sqlx::query_as(
            r#"
            SELECT ticker, name, weight
            FROM index_constituents
            WHERE index_code = $1
            ORDER BY ticker
            "#,
        )
        .bind(index_code)
        .fetch_all(&self.pool)
        .await?;

        debug!(index = index_code, members = members.len(), "Loaded index members");
        Ok(members)
    }
}

#[async_trait]
impl SignalRepository for PgMarketStore {
    async fn replace_signals(&self, date: NaiveDate, signals: &[Signal]) -> DataResult<usize> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM ma_crossover_signals WHERE signal_date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for signal in signals {
            if signal.signal_date != date {
                return Err(DataError::validation_error(
                    "signal_date".to_string(),
                    format!("{} dated {} in batch for {}", signal.ticker, signal.signal_date, date),
                ));
            }

            sqlx::query(
                r#"
                INSERT INTO ma_crossover_signals
                    (ticker, signal_date, close_price, prev_close_price, price_change_pct,
                     ma20_direction, ma60_direction, ma250_direction, generated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (ticker, signal_date) DO UPDATE SET
                    close_price = EXCLUDED.close_price,
                    prev_close_price = EXCLUDED.prev_close_price,
                    price_change_pct = EXCLUDED.price_change_pct,
                    ma20_direction = EXCLUDED.ma20_direction,
                    ma60_direction = EXCLUDED.ma60_direction,
                    ma250_direction = EXCLUDED.ma250_direction,
                    generated_at = EXCLUDED.generated_at
                "#,
            )
            .bind(&signal.ticker)
            .bind(signal.signal_date)
            .bind(signal.close_price)
            .bind(signal.prev_close_price)
            .bind(signal.price_change_pct)
            .bind(signal.ma20_direction)
            .bind(signal.ma60_direction)
            .bind(signal.ma250_direction)
            .bind(signal.generated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(%date, removed, stored = signals.len(), "Replaced crossover signals");
        Ok(signals.len())
    }

    async fn signals_on(&self, date: NaiveDate) -> DataResult<Vec<Signal>> {
        let signals: Vec<Signal> = sqlx::query_as(
            r#"
            SELECT ticker, signal_date, close_price, prev_close_price, price_change_pct,
                   ma20_direction, ma60_direction, ma250_direction, generated_at
            FROM ma_crossover_signals
            WHERE signal_date = $1
            ORDER BY ticker
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(signals)
    }
}
