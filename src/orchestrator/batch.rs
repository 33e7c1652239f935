//! Bounded fan-out of debate runs across the day's selected tickers

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use super::debate::{DebateStage, DebateWorkflow};
use crate::debate::{DebateContext, ResultStore, StoreOutcome, Verdict};
use crate::trading::selection::{SelectedTicker, Track};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickerStatus {
    Created {
        signature: String,
        verdict: Verdict,
        confidence: f64,
    },
    AlreadyExists {
        signature: String,
    },
    Failed {
        stage: Option<DebateStage>,
        error: String,
    },
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerOutcome {
    pub ticker: String,
    pub track: Track,
    #[serde(flatten)]
    pub status: TickerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Tickers handed to the batch, duplicates included
    pub selected: usize,
    /// Repeats of a ticker already in the batch; not debated
    pub duplicates: usize,
    pub succeeded: usize,
    pub already_existed: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// In selection order
    pub outcomes: Vec<TickerOutcome>,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<TickerOutcome>, duplicates: usize) -> Self {
        let mut summary = BatchSummary {
            selected: outcomes.len() + duplicates,
            duplicates,
            ..BatchSummary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                TickerStatus::Created { .. } => summary.succeeded += 1,
                TickerStatus::AlreadyExists { .. } => summary.already_existed += 1,
                TickerStatus::Failed { .. } => summary.failed += 1,
                TickerStatus::Abandoned => summary.abandoned += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }
}

async fn process_ticker(workflow: &DebateWorkflow, store: &dyn ResultStore, selected: SelectedTicker) -> TickerOutcome {
    let ticker = selected.ticker.clone();
    let track = selected.track;
    let context = DebateContext::from_selected(&selected);

    let record = match workflow.run(context).await {
        Ok(record) => record,
        Err(e) => {
            error!(
                ticker = %ticker,
                stage = %e.stage(),
                participant = %e.participant(),
                error = %e,
                "Debate failed"
            );
            return TickerOutcome {
                ticker,
                track,
                status: TickerStatus::Failed {
                    stage: Some(e.stage()),
                    error: e.to_string(),
                },
            };
        }
    };

    let status = match store.create(&record).await {
        Ok(StoreOutcome::Created) => TickerStatus::Created {
            signature: record.signature.clone(),
            verdict: record.synthesis.verdict,
            confidence: record.synthesis.confidence,
        },
        Ok(StoreOutcome::AlreadyExists) => TickerStatus::AlreadyExists {
            signature: record.signature.clone(),
        },
        Err(e) => {
            error!(ticker = %ticker, error = %e, "Failed to persist debate record");
            TickerStatus::Failed {
                stage: None,
                error: format!("persist failed: {}", e),
            }
        }
    };

    TickerOutcome { ticker, track, status }
}

/// Runs debates for a batch with at most `workers` in flight
pub struct DebateOrchestrator {
    workflow: Arc<DebateWorkflow>,
    store: Arc<dyn ResultStore>,
    workers: usize,
}

impl DebateOrchestrator {
    pub fn new(workflow: DebateWorkflow, store: Arc<dyn ResultStore>, workers: usize) -> Self {
        Self {
            workflow: Arc::new(workflow),
            store,
            workers: workers.max(1),
        }
    }

    /// Debate every ticker once. Tickers still running at `deadline` are
    /// aborted and reported as abandoned.
    pub async fn run_batch(&self, tickers: Vec<SelectedTicker>, deadline: Option<Instant>) -> BatchSummary {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(tickers.len());
        let mut duplicates = 0;
        for selected in tickers {
            if seen.insert(selected.ticker.clone()) {
                unique.push(selected);
            } else {
                duplicates += 1;
                warn!(ticker = %selected.ticker, "Duplicate ticker in batch, debating once");
            }
        }

        let order: Vec<(String, Track, NaiveDate)> = unique
            .iter()
            .map(|s| (s.ticker.clone(), s.track, s.signal.signal_date))
            .collect();
        let started_at = Utc::now();
        info!(tickers = order.len(), workers = self.workers, "Starting debate batch");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for selected in unique {
            let permits = semaphore.clone();
            let workflow = self.workflow.clone();
            let store = self.store.clone();
            let span = info_span!("debate", ticker = %selected.ticker, track = %selected.track);

            tasks.spawn(
                async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return TickerOutcome {
                                ticker: selected.ticker,
                                track: selected.track,
                                status: TickerStatus::Failed {
                                    stage: None,
                                    error: "worker pool closed".to_string(),
                                },
                            }
                        }
                    };
                    process_ticker(&workflow, store.as_ref(), selected).await
                }
                .instrument(span),
            );
        }

        let mut finished: HashMap<String, TickerOutcome> = HashMap::new();
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match next {
                Some(Ok(outcome)) => {
                    finished.insert(outcome.ticker.clone(), outcome);
                }
                Some(Err(e)) => error!(error = %e, "Debate worker task failed"),
                None => break,
            }
        }

        if timed_out {
            warn!(in_flight = tasks.len(), "Pipeline deadline reached, abandoning remaining debates");
            tasks.abort_all();
            // Tasks that finished before the abort landed still count
            while let Some(joined) = tasks.join_next().await {
                if let Ok(outcome) = joined {
                    finished.insert(outcome.ticker.clone(), outcome);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(order.len());
        for (ticker, track, trigger_date) in order {
            if let Some(outcome) = finished.remove(&ticker) {
                outcomes.push(outcome);
                continue;
            }
            let status = if timed_out {
                self.reconcile_aborted(&ticker, trigger_date, started_at).await
            } else {
                TickerStatus::Failed {
                    stage: None,
                    error: "worker task did not complete".to_string(),
                }
            };
            outcomes.push(TickerOutcome { ticker, track, status });
        }

        let summary = BatchSummary::from_outcomes(outcomes, duplicates);
        info!(
            selected = summary.selected,
            duplicates = summary.duplicates,
            succeeded = summary.succeeded,
            already_existed = summary.already_existed,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Debate batch complete"
        );
        summary
    }

    /// An abort can land after the store has committed the insert; report
    /// what is actually stored for the key.
    async fn reconcile_aborted(&self, ticker: &str, trigger_date: NaiveDate, started_at: DateTime<Utc>) -> TickerStatus {
        match self.store.lookup_by_key(ticker, trigger_date).await {
            Ok(Some(record)) if record.created_at >= started_at => {
                info!(ticker, signature = %record.signature, "Aborted debate had already been stored");
                TickerStatus::Created {
                    signature: record.signature,
                    verdict: record.synthesis.verdict,
                    confidence: record.synthesis.confidence,
                }
            }
            Ok(Some(record)) => TickerStatus::AlreadyExists {
                signature: record.signature,
            },
            Ok(None) => TickerStatus::Abandoned,
            Err(e) => {
                warn!(ticker, error = %e, "Could not check store for aborted debate");
                TickerStatus::Abandoned
            }
        }
    }
}
