//! Moving-average crossover detection
//!
//! A signal is kept for a ticker-date only when the close rose day-over-day
//! and at least one of the 20/60/250 averages was crossed. Detection for a
//! date replaces that date's signal set, so a failed run can be retried as a whole.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::{DataResult, MarketStore, PriceRow};

/// Direction of a crossover against one moving average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    CrossAbove,
    CrossBelow,
    None,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::CrossAbove => "CROSS_ABOVE",
            Direction::CrossBelow => "CROSS_BELOW",
            Direction::None => "NONE",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Direction::None)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moving-average window. Declared in ascending priority so `Ord` ranks 250 highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaWindow {
    #[serde(rename = "20MA")]
    Ma20,
    #[serde(rename = "60MA")]
    Ma60,
    #[serde(rename = "250MA")]
    Ma250,
}

impl MaWindow {
    pub const ALL: [MaWindow; 3] = [MaWindow::Ma20, MaWindow::Ma60, MaWindow::Ma250];

    pub fn label(&self) -> &'static str {
        match self {
            MaWindow::Ma20 => "20MA",
            MaWindow::Ma60 => "60MA",
            MaWindow::Ma250 => "250MA",
        }
    }
}

impl std::fmt::Display for MaWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted crossover signal for one ticker on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signal {
    pub ticker: String,
    pub signal_date: NaiveDate,
    pub close_price: f64,
    pub prev_close_price: f64,
    /// Day-over-day change in percent
    pub price_change_pct: f64,
    pub ma20_direction: Direction,
    pub ma60_direction: Direction,
    pub ma250_direction: Direction,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn direction(&self, window: MaWindow) -> Direction {
        match window {
            MaWindow::Ma20 => self.ma20_direction,
            MaWindow::Ma60 => self.ma60_direction,
            MaWindow::Ma250 => self.ma250_direction,
        }
    }

    pub fn has(&self, window: MaWindow) -> bool {
        self.direction(window).is_active()
    }

    /// Windows with a non-NONE direction, highest priority first
    pub fn active_windows(&self) -> Vec<MaWindow> {
        MaWindow::ALL
            .iter()
            .rev()
            .copied()
            .filter(|w| self.has(*w))
            .collect()
    }

    pub fn signal_count(&self) -> usize {
        MaWindow::ALL.iter().filter(|w| self.has(**w)).count()
    }
}

/// Persistence for detected signals
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Replace every signal stored for `date` with `signals`, atomically
    async fn replace_signals(&self, date: NaiveDate, signals: &[Signal]) -> DataResult<usize>;

    async fn signals_on(&self, date: NaiveDate) -> DataResult<Vec<Signal>>;
}

/// Classify the crossover of `prev_close -> close` against a moving average.
/// A missing average never produces a signal.
pub fn classify_crossover(prev_close: f64, close: f64, ma: Option<f64>) -> Direction {
    match ma {
        Some(ma) if prev_close < ma && close >= ma => Direction::CrossAbove,
        Some(ma) if prev_close >= ma && close < ma => Direction::CrossBelow,
        _ => Direction::None,
    }
}

/// Build the signal for one row, or `None` when the row does not qualify
pub fn detect_signal(date: NaiveDate, row: &PriceRow, generated_at: DateTime<Utc>) -> Option<Signal> {
    if row.prev_close <= 0.0 || !row.close.is_finite() || !row.prev_close.is_finite() {
        return None;
    }
    if row.close <= row.prev_close {
        return None;
    }

    let ma20_direction = classify_crossover(row.prev_close, row.close, row.ma20);
    let ma60_direction = classify_crossover(row.prev_close, row.close, row.ma60);
    let ma250_direction = classify_crossover(row.prev_close, row.close, row.ma250);

    if !(ma20_direction.is_active() || ma60_direction.is_active() || ma250_direction.is_active()) {
        return None;
    }

    Some(Signal {
        ticker: row.ticker.clone(),
        signal_date: date,
        close_price: row.close,
        prev_close_price: row.prev_close,
        price_change_pct: (row.close - row.prev_close) / row.prev_close * 100.0,
        ma20_direction,
        ma60_direction,
        ma250_direction,
        generated_at,
    })
}

/// Detect signals over a full set of rows, ordered by ticker
pub fn detect_signals(date: NaiveDate, rows: &[PriceRow], generated_at: DateTime<Utc>) -> Vec<Signal> {
    let mut signals: Vec<Signal> = rows
        .iter()
        .filter_map(|row| detect_signal(date, row, generated_at))
        .collect();
    signals.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    signals.dedup_by(|a, b| a.ticker == b.ticker);
    signals
}

/// Outcome of one detection run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub date: NaiveDate,
    pub scanned: usize,
    pub retained: usize,
}

/// Reads the day's rows, detects crossovers and replaces the stored signal set
pub struct SignalDetector {
    market: Arc<dyn MarketStore>,
    repository: Arc<dyn SignalRepository>,
}

impl SignalDetector {
    pub fn new(market: Arc<dyn MarketStore>, repository: Arc<dyn SignalRepository>) -> Self {
        Self { market, repository }
    }

    pub async fn run(&self, date: NaiveDate) -> DataResult<DetectionReport> {
        info!(%date, "Detecting moving-average crossovers");

        // A read failure aborts before anything is written
        let rows = self.market.price_rows(date).await?;
        let signals = detect_signals(date, &rows, Utc::now());

        for signal in &signals {
            debug!(
                ticker = %signal.ticker,
                ma20 = %signal.ma20_direction,
                ma60 = %signal.ma60_direction,
                ma250 = %signal.ma250_direction,
                change_pct = signal.price_change_pct,
                "Crossover detected"
            );
        }

        let stored = self.repository.replace_signals(date, &signals).await?;

        info!(%date, scanned = rows.len(), retained = stored, "Signal detection complete");
        Ok(DetectionReport {
            date,
            scanned: rows.len(),
            retained: stored,
        })
    }
}
