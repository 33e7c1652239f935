//! Orchestration of the daily debate run
//! Per-ticker four-stage workflow, bounded batch fan-out and the end-to-end pipeline

pub mod batch;
pub mod debate;
pub mod join;
pub mod pipeline;

pub use batch::{BatchSummary, DebateOrchestrator, TickerOutcome, TickerStatus};
pub use debate::{DebateError, DebateStage, DebateWorkflow};
pub use join::{join_both, Branch, JoinFailure};
pub use pipeline::{DailyPipeline, PipelineOptions, PipelineReport};
