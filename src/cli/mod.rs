use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;

use debatedesk::config::Config;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "debatedesk",
    about = "Moving-average crossover screening with bull/bear LLM debates",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Selection knobs shared by `select` and `run`; unset values come from config
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Trading date (defaults to today, UTC)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Tickers taken from the weighted index track
    #[arg(long)]
    pub weighted_quota: Option<usize>,

    /// Tickers taken from the broad index track
    #[arg(long)]
    pub broad_quota: Option<usize>,

    /// Skip tickers debated within this many days
    #[arg(long)]
    pub freshness_days: Option<i64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect moving-average crossovers and store the day's signals
    Detect {
        /// Trading date (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show which tickers would be debated, without running debates
    Select {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Run the full pipeline: detect, select, debate, persist
    Run {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Concurrent debates
        #[arg(short, long)]
        workers: Option<usize>,

        /// Wall-clock budget for the whole run
        #[arg(short, long)]
        timeout_seconds: Option<u64>,

        /// Reuse signals already stored for the date
        #[arg(long)]
        skip_detection: bool,
    },

    /// List recent verdicts for a ticker
    Show {
        #[arg(short, long)]
        ticker: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print a stored debate by its signature
    Lookup {
        #[arg(short, long)]
        signature: String,
    },

    /// Apply database migrations and exit
    Migrate,
}

/// Execute CLI command with database pool
pub async fn run(cli: Cli, config: Config, pool: PgPool) -> Result<()> {
    match cli.command {
        Commands::Detect { date } => {
            info!("Running signal detection");
            commands::detect(pool, &config, date).await?;
        }
        Commands::Select { selection } => {
            info!("Running ticker selection (dry run)");
            commands::select(pool, &config, selection).await?;
        }
        Commands::Run {
            selection,
            workers,
            timeout_seconds,
            skip_detection,
        } => {
            info!("Running daily debate pipeline");
            commands::run_pipeline(pool, &config, selection, workers, timeout_seconds, skip_detection).await?;
        }
        Commands::Show { ticker, limit } => {
            commands::show(pool, &ticker, limit).await?;
        }
        Commands::Lookup { signature } => {
            commands::lookup(pool, &signature).await?;
        }
        Commands::Migrate => {
            // Migrations already ran during start-up
            println!("Database schema is up to date");
        }
    }

    Ok(())
}
