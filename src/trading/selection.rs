//! Daily ticker selection across the weighted-index and broad-index tracks
//!
//! `select` is pure: identical signals, membership and exclusion set always
//! yield the same ordered list. `TickerSelector` only gathers those inputs.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::data::{DataResult, IndexMember, MarketStore};
use crate::debate::ResultStore;
use crate::trading::signals::{MaWindow, Signal, SignalRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Weighted,
    Broad,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Track::Weighted => write!(f, "weighted"),
            Track::Broad => write!(f, "broad"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankInputs {
    pub signal_count: usize,
    pub price_change_pct: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTicker {
    pub ticker: String,
    pub name: String,
    pub track: Track,
    /// Highest-priority active window
    pub trigger_type: MaWindow,
    pub active_signals: Vec<MaWindow>,
    pub rank_inputs: RankInputs,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionParams {
    pub weighted_quota: usize,
    pub broad_quota: usize,
    pub freshness_days: i64,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            weighted_quota: 4,
            broad_quota: 4,
            freshness_days: 14,
        }
    }
}

impl SelectionParams {
    /// First trigger date that still counts as "recently debated"
    pub fn freshness_cutoff(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(self.freshness_days)
    }
}

/// Everything `select` reads, borrowed from the caller
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    pub signals: &'a [Signal],
    pub weighted_members: &'a [IndexMember],
    pub broad_members: &'a [IndexMember],
    pub excluded: &'a HashSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub date: NaiveDate,
    /// Track A picks first, then Track B
    pub selected: Vec<SelectedTicker>,
    pub weighted_pool: usize,
    pub broad_pool: usize,
    pub excluded: usize,
}

impl Selection {
    pub fn tickers(&self) -> Vec<&str> {
        self.selected.iter().map(|s| s.ticker.as_str()).collect()
    }
}

fn to_selected(signal: &Signal, member: &IndexMember, track: Track) -> Option<SelectedTicker> {
    let active_signals = signal.active_windows();
    let trigger_type = *active_signals.first()?;
    Some(SelectedTicker {
        ticker: signal.ticker.clone(),
        name: member.name.clone(),
        track,
        trigger_type,
        rank_inputs: RankInputs {
            signal_count: active_signals.len(),
            price_change_pct: signal.price_change_pct,
            weight: member.weight,
        },
        active_signals,
        signal: signal.clone(),
    })
}

/// Weighted track order: index weight descending, ticker ascending
fn weighted_order(a: &SelectedTicker, b: &SelectedTicker) -> Ordering {
    b.rank_inputs
        .weight
        .total_cmp(&a.rank_inputs.weight)
        .then_with(|| a.ticker.cmp(&b.ticker))
}

/// Broad track order: signal count, then 250/60/20 presence, then price change, then ticker
pub fn broad_order(a: &SelectedTicker, b: &SelectedTicker) -> Ordering {
    let has = |t: &SelectedTicker, w: MaWindow| t.active_signals.contains(&w);

    b.rank_inputs
        .signal_count
        .cmp(&a.rank_inputs.signal_count)
        .then_with(|| has(b, MaWindow::Ma250).cmp(&has(a, MaWindow::Ma250)))
        .then_with(|| has(b, MaWindow::Ma60).cmp(&has(a, MaWindow::Ma60)))
        .then_with(|| has(b, MaWindow::Ma20).cmp(&has(a, MaWindow::Ma20)))
        .then_with(|| {
            b.rank_inputs
                .price_change_pct
                .total_cmp(&a.rank_inputs.price_change_pct)
        })
        .then_with(|| a.ticker.cmp(&b.ticker))
}

/// Membership tables may list a ticker twice; the best-ranked entry wins
fn keep_first_per_ticker(pool: &mut Vec<SelectedTicker>) {
    let mut seen = HashSet::new();
    pool.retain(|t| seen.insert(t.ticker.clone()));
}

/// Rank and pick the day's tickers
pub fn select(date: NaiveDate, input: SelectionInput<'_>, params: &SelectionParams) -> Selection {
    let signals_by_ticker: HashMap<&str, &Signal> = input
        .signals
        .iter()
        .filter(|s| s.signal_count() > 0)
        .map(|s| (s.ticker.as_str(), s))
        .collect();

    let weighted_universe: HashSet<&str> = input
        .weighted_members
        .iter()
        .map(|m| m.ticker.as_str())
        .collect();

    let mut weighted_pool: Vec<SelectedTicker> = input
        .weighted_members
        .iter()
        .filter(|m| !input.excluded.contains(&m.ticker))
        .filter_map(|m| {
            let signal = signals_by_ticker.get(m.ticker.as_str())?;
            to_selected(signal, m, Track::Weighted)
        })
        .collect();
    weighted_pool.sort_by(weighted_order);
    keep_first_per_ticker(&mut weighted_pool);

    let mut broad_pool: Vec<SelectedTicker> = input
        .broad_members
        .iter()
        .filter(|m| !input.excluded.contains(&m.ticker))
        .filter(|m| !weighted_universe.contains(m.ticker.as_str()))
        .filter_map(|m| {
            let signal = signals_by_ticker.get(m.ticker.as_str())?;
            to_selected(signal, m, Track::Broad)
        })
        .collect();
    broad_pool.sort_by(broad_order);
    keep_first_per_ticker(&mut broad_pool);

    let weighted_pool_size = weighted_pool.len();
    let broad_pool_size = broad_pool.len();

    let selected: Vec<SelectedTicker> = weighted_pool
        .into_iter()
        .take(params.weighted_quota)
        .chain(broad_pool.into_iter().take(params.broad_quota))
        .collect();

    Selection {
        date,
        selected,
        weighted_pool: weighted_pool_size,
        broad_pool: broad_pool_size,
        excluded: input.excluded.len(),
    }
}

/// Gathers selection inputs from the stores and runs `select`
pub struct TickerSelector {
    market: Arc<dyn MarketStore>,
    signals: Arc<dyn SignalRepository>,
    results: Arc<dyn ResultStore>,
    weighted_index: String,
    broad_index: String,
}

impl TickerSelector {
    pub fn new(
        market: Arc<dyn MarketStore>,
        signals: Arc<dyn SignalRepository>,
        results: Arc<dyn ResultStore>,
        weighted_index: impl Into<String>,
        broad_index: impl Into<String>,
    ) -> Self {
        Self {
            market,
            signals,
            results,
            weighted_index: weighted_index.into(),
            broad_index: broad_index.into(),
        }
    }

    pub async fn select(&self, date: NaiveDate, params: &SelectionParams) -> DataResult<Selection> {
        let cutoff = params.freshness_cutoff(date);
        let excluded = self.results.tickers_debated_since(cutoff).await?;
        let signals = self.signals.signals_on(date).await?;
        let weighted_members = self.market.index_members(&self.weighted_index).await?;
        let broad_members = self.market.index_members(&self.broad_index).await?;

        let selection = select(
            date,
            SelectionInput {
                signals: &signals,
                weighted_members: &weighted_members,
                broad_members: &broad_members,
                excluded: &excluded,
            },
            params,
        );

        info!(
            %date,
            signals = signals.len(),
            excluded = excluded.len(),
            weighted_pool = selection.weighted_pool,
            broad_pool = selection.broad_pool,
            selected = selection.selected.len(),
            "Ticker selection complete"
        );
        Ok(selection)
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

    fn signal(ticker: &str, pct: f64, dirs: [Direction; 3]) -> Signal {
        Signal {
            ticker: ticker.to_string(),
            signal_date: date(),
            close_price: 100.0 + pct,
            prev_close_price: 100.0,
            price_change_pct: pct,
            ma20_direction: dirs[0],
            ma60_direction: dirs[1],
            ma250_direction: dirs[2],
            generated_at: Utc::now(),
        }
    }

    fn member(ticker: &str, weight: f64) -> IndexMember {
        IndexMember {
            ticker: ticker.to_string(),
            name: format!("{} Inc", ticker),
            weight,
        }
    }

    const UP: Direction = Direction::CrossAbove;
    const NO: Direction = Direction::None;

    #[test]
    fn test_weighted_quota_takes_heaviest() {
        let signals: Vec<Signal> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|t| signal(t, 1.0, [UP, NO, NO]))
            .collect();
        let weighted = vec![
            member("A", 1.0),
            member("B", 5.0),
            member("C", 3.0),
            member("D", 4.0),
            member("E", 2.0),
        ];
        // Weighted members are also broad members; they must not spill into Track B
        let broad = weighted.clone();
        let excluded = HashSet::new();
        let params = SelectionParams::default();

        let selection = select(
            date(),
            SelectionInput {
                signals: &signals,
                weighted_members: &weighted,
                broad_members: &broad,
                excluded: &excluded,
            },
            &params,
        );

        assert_eq!(selection.tickers(), vec!["B", "D", "C", "E"]);
        assert!(selection.selected.iter().all(|s| s.track == Track::Weighted));
        assert_eq!(selection.weighted_pool, 5);
        assert_eq!(selection.broad_pool, 0);
    }

    #[test]
    fn test_broad_ranking_order() {
        let signals = vec![
            signal("ONE", 9.0, [UP, NO, NO]),
            signal("TWO20", 2.0, [UP, UP, NO]),
            signal("TWO250", 1.0, [UP, NO, UP]),
            signal("THREE", 0.5, [UP, UP, UP]),
            signal("ONE250", 0.1, [NO, NO, UP]),
        ];
        let broad: Vec<IndexMember> = signals.iter().map(|s| member(&s.ticker, 0.0)).collect();
        let excluded = HashSet::new();

        let selection = select(
            date(),
            SelectionInput {
                signals: &signals,
                weighted_members: &[],
                broad_members: &broad,
                excluded: &excluded,
            },
            &SelectionParams {
                weighted_quota: 4,
                broad_quota: 10,
                freshness_days: 14,
            },
        );

        assert_eq!(selection.tickers(), vec!["THREE", "TWO250", "TWO20", "ONE250", "ONE"]);
        assert_eq!(selection.selected[0].trigger_type, MaWindow::Ma250);
        assert_eq!(selection.selected[2].trigger_type, MaWindow::Ma60);
        assert_eq!(selection.selected[4].trigger_type, MaWindow::Ma20);
    }

    #[test]
    fn test_broad_tie_break_on_change_then_ticker() {
        let signals = vec![
            signal("BBB", 2.0, [UP, NO, NO]),
            signal("AAA", 2.0, [UP, NO, NO]),
            signal("CCC", 3.0, [UP, NO, NO]),
        ];
        let broad: Vec<IndexMember> = signals.iter().map(|s| member(&s.ticker, 0.0)).collect();
        let excluded = HashSet::new();

        let selection = select(
            date(),
            SelectionInput {
                signals: &signals,
                weighted_members: &[],
                broad_members: &broad,
                excluded: &excluded,
            },
            &SelectionParams::default(),
        );

        assert_eq!(selection.tickers(), vec!["CCC", "AAA", "BBB"]);
    }

    #[test]
    fn test_excluded_tickers_never_selected() {
        let signals = vec![
            signal("NVDA", 3.0, [NO, NO, UP]),
            signal("AAPL", 1.0, [UP, NO, NO]),
            signal("F", 4.0, [UP, NO, NO]),
        ];
        let weighted = vec![member("NVDA", 8.0), member("AAPL", 7.0)];
        let broad = vec![member("NVDA", 6.0), member("AAPL", 6.0), member("F", 0.1)];
        let excluded: HashSet<String> = ["NVDA".to_string(), "F".to_string()].into_iter().collect();

        let selection = select(
            date(),
            SelectionInput {
                signals: &signals,
                weighted_members: &weighted,
                broad_members: &broad,
                excluded: &excluded,
            },
            &SelectionParams::default(),
        );

        assert_eq!(selection.tickers(), vec!["AAPL"]);
        assert_eq!(selection.excluded, 2);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let signals = vec![
            signal("X", 1.0, [UP, NO, NO]),
            signal("Y", 1.0, [UP, NO, NO]),
            signal("Z", 1.0, [UP, NO, NO]),
            signal("W", 1.0, [UP, NO, NO]),
        ];
        let weighted = vec![member("X", 1.0), member("Y", 1.0)];
        let broad = vec![member("W", 0.0), member("Z", 0.0), member("X", 0.0)];
        let excluded = HashSet::new();
        let input = SelectionInput {
            signals: &signals,
            weighted_members: &weighted,
            broad_members: &broad,
            excluded: &excluded,
        };
        let params = SelectionParams::default();

        let first = select(date(), input, &params);
        let second = select(date(), input, &params);
        assert_eq!(first.selected, second.selected);
        assert_eq!(first.tickers(), vec!["X", "Y", "W", "Z"]);
    }

    #[test]
    fn test_freshness_cutoff() {
        let params = SelectionParams::default();
        assert_eq!(
            params.freshness_cutoff(date()),
            NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()
        );
    }
}
