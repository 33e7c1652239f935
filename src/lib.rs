// debatedesk - daily moving-average crossover screening with structured
// bull/bear LLM debates and an idempotent verdict store.

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod data;
pub mod db;
pub mod debate;
pub mod llm;
pub mod orchestrator;
pub mod trading;

// Re-export commonly used items
pub use config::Config;
pub use debate::{DebateRecord, ResultStore};
pub use orchestrator::{BatchSummary, DailyPipeline};
