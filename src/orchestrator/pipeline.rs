//! Daily pipeline: detect crossovers, select tickers, debate them

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use super::batch::{BatchSummary, DebateOrchestrator};
use crate::data::DataResult;
use crate::trading::selection::{Selection, SelectionParams, TickerSelector};
use crate::trading::signals::{DetectionReport, SignalDetector};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub date: NaiveDate,
    pub selection: SelectionParams,
    /// Reuse signals already stored for the date
    pub skip_detection: bool,
    /// Wall-clock budget for the whole run
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub weighted_pool: usize,
    pub broad_pool: usize,
    pub excluded: usize,
    pub selected: Vec<String>,
}

impl From<&Selection> for SelectionSummary {
    fn from(selection: &Selection) -> Self {
        Self {
            weighted_pool: selection.weighted_pool,
            broad_pool: selection.broad_pool,
            excluded: selection.excluded,
            selected: selection.tickers().into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub date: NaiveDate,
    pub detection: Option<DetectionReport>,
    pub selection: SelectionSummary,
    pub batch: BatchSummary,
}

pub struct DailyPipeline {
    detector: SignalDetector,
    selector: TickerSelector,
    orchestrator: DebateOrchestrator,
}

/// Detection and selection must finish before the deadline; overrunning it is pipeline-fatal
async fn before_deadline<T>(deadline: Instant, step: &str, work: impl Future<Output = DataResult<T>>) -> Result<T> {
    let result = tokio::time::timeout_at(deadline, work)
        .await
        .map_err(|_| anyhow::anyhow!("pipeline deadline reached during {}", step))?;

    result.map_err(|e| {
        if e.is_unavailable() {
            error!(step, error = %e, "Data store unreachable, aborting pipeline");
            anyhow::Error::new(e).context(format!("{} failed: data store unreachable", step))
        } else {
            error!(step, error = %e, "Pipeline step failed");
            anyhow::Error::new(e).context(format!("{} failed", step))
        }
    })
}

impl DailyPipeline {
    pub fn new(detector: SignalDetector, selector: TickerSelector, orchestrator: DebateOrchestrator) -> Self {
        Self {
            detector,
            selector,
            orchestrator,
        }
    }

    /// Errors only when the market or signal data cannot be read; per-ticker
    /// failures are reported in the returned summary.
    pub async fn run(&self, options: &PipelineOptions) -> Result<PipelineReport> {
        let deadline = Instant::now() + options.timeout;
        let date = options.date;
        info!(%date, timeout_secs = options.timeout.as_secs(), "🚀 Starting daily debate pipeline");

        let detection = if options.skip_detection {
            info!(%date, "Skipping detection, using stored signals");
            None
        } else {
            info!("📈 Detecting crossovers...");
            Some(before_deadline(deadline, "signal detection", self.detector.run(date)).await?)
        };

        info!("🎯 Selecting tickers...");
        let selection = before_deadline(
            deadline,
            "ticker selection",
            self.selector.select(date, &options.selection),
        )
        .await?;
        let selection_summary = SelectionSummary::from(&selection);

        info!(tickers = ?selection_summary.selected, "🗣️ Running debates...");
        let batch = self
            .orchestrator
            .run_batch(selection.selected, Some(deadline))
            .await;

        info!(
            %date,
            selected = batch.selected,
            succeeded = batch.succeeded,
            failed = batch.failed,
            abandoned = batch.abandoned,
            "✅ Daily pipeline complete"
        );

        Ok(PipelineReport {
            date,
            detection,
            selection: selection_summary,
            batch,
        })
    }
}
