use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use debatedesk::config::Config;
use debatedesk::data::PgMarketStore;
use debatedesk::debate::{PgDebateStore, ResultStore};
use debatedesk::llm::{LLMClient, RetryPolicy};
use debatedesk::orchestrator::{DailyPipeline, DebateOrchestrator, DebateWorkflow, PipelineOptions};
use debatedesk::trading::selection::{SelectionParams, TickerSelector};
use debatedesk::trading::signals::SignalDetector;

use super::SelectionArgs;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_date(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Utc::now().date_naive())
}

fn selection_params(config: &Config, args: &SelectionArgs) -> Result<SelectionParams> {
    let params = SelectionParams {
        weighted_quota: args.weighted_quota.unwrap_or(config.pipeline.weighted_quota),
        broad_quota: args.broad_quota.unwrap_or(config.pipeline.broad_quota),
        freshness_days: args.freshness_days.unwrap_or(config.pipeline.freshness_days),
    };
    if params.freshness_days < 0 {
        anyhow::bail!("--freshness-days must not be negative");
    }
    Ok(params)
}

fn market_store(pool: &PgPool, config: &Config) -> Arc<PgMarketStore> {
    Arc::new(PgMarketStore::new(
        pool.clone(),
        vec![config.pipeline.weighted_index.clone(), config.pipeline.broad_index.clone()],
    ))
}

fn selector(market: Arc<PgMarketStore>, results: Arc<dyn ResultStore>, config: &Config) -> TickerSelector {
    TickerSelector::new(
        market.clone(),
        market,
        results,
        config.pipeline.weighted_index.clone(),
        config.pipeline.broad_index.clone(),
    )
}

/// Detect crossovers for one date and replace that date's stored signals
pub async fn detect(pool: PgPool, config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let date = resolve_date(date);
    let market = market_store(&pool, config);
    let detector = SignalDetector::new(market.clone(), market);

    let report = detector
        .run(date)
        .await
        .with_context(|| format!("Signal detection failed for {}", date))?;

    print_json(&report)
}

/// Print the ranked selection without debating anything
pub async fn select(pool: PgPool, config: &Config, args: SelectionArgs) -> Result<()> {
    let date = resolve_date(args.date);
    let params = selection_params(config, &args)?;
    let market = market_store(&pool, config);
    let results: Arc<dyn ResultStore> = Arc::new(PgDebateStore::new(pool.clone()));

    let selection = selector(market, results, config)
        .select(date, &params)
        .await
        .with_context(|| format!("Ticker selection failed for {}", date))?;

    if selection.selected.is_empty() {
        warn!(%date, "No tickers selected");
    }
    print_json(&selection)
}

pub async fn run_pipeline(
    pool: PgPool,
    config: &Config,
    args: SelectionArgs,
    workers: Option<usize>,
    timeout_seconds: Option<u64>,
    skip_detection: bool,
) -> Result<()> {
    let date = resolve_date(args.date);
    let params = selection_params(config, &args)?;
    let workers = workers.unwrap_or(config.pipeline.workers);
    if workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }
    let timeout = Duration::from_secs(timeout_seconds.unwrap_or(config.pipeline.timeout_seconds));

    let market = market_store(&pool, config);
    let results: Arc<dyn ResultStore> = Arc::new(PgDebateStore::new(pool.clone()));
    let generator = Arc::new(LLMClient::new(&config.llm)?);
    let workflow = DebateWorkflow::new(generator, RetryPolicy::from_config(&config.llm));

    let pipeline = DailyPipeline::new(
        SignalDetector::new(market.clone(), market.clone()),
        selector(market, results.clone(), config),
        DebateOrchestrator::new(workflow, results, workers),
    );

    let report = pipeline
        .run(&PipelineOptions {
            date,
            selection: params,
            skip_detection,
            timeout,
        })
        .await?;

    info!(
        succeeded = report.batch.succeeded,
        failed = report.batch.failed,
        abandoned = report.batch.abandoned,
        "Pipeline finished"
    );
    print_json(&report)
}

/// Recent verdicts for a ticker, newest first
pub async fn show(pool: PgPool, ticker: &str, limit: usize) -> Result<()> {
    let store = PgDebateStore::new(pool);
    let records = store.lookup_by_ticker(ticker, limit).await?;

    if records.is_empty() {
        println!("No debates recorded for {}", ticker.to_ascii_uppercase());
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:<6} {:<10} {:>5.1}  {}",
            record.trigger_date,
            record.ticker,
            record.synthesis.verdict.as_str(),
            record.synthesis.confidence,
            record.signature
        );
    }
    Ok(())
}

pub async fn lookup(pool: PgPool, signature: &str) -> Result<()> {
    let store = PgDebateStore::new(pool);
    let record = store
        .lookup_by_signature(signature)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No debate found with signature {}", signature))?;

    print_json(&record)
}
