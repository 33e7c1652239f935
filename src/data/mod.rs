//! Read-only market data access: daily closes with moving averages and
//! index membership for the two selection tracks.

pub mod errors;
pub mod market;
pub mod memory;

pub use errors::{DataError, DataResult};
pub use market::PgMarketStore;
pub use memory::MemoryMarket;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ticker's close, previous close and moving averages for a trading date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceRow {
    pub ticker: String,
    pub close: f64,
    pub prev_close: f64,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub ma250: Option<f64>,
}

/// Index constituent with its weight inside the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexMember {
    pub ticker: String,
    pub name: String,
    pub weight: f64,
}

/// Query surface over the ingested market data
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Price and moving-average rows for every ticker of the broad universe on `date`
    async fn price_rows(&self, date: NaiveDate) -> DataResult<Vec<PriceRow>>;

    /// Constituents of an index by its code
    async fn index_members(&self, index_code: &str) -> DataResult<Vec<IndexMember>>;
}
