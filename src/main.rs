use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;
use debatedesk::config::Config;
use debatedesk::db::Database;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with structured JSON logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "debatedesk starting up");

    let config = Config::load()?;

    let db = Database::new(&config.database).await?;
    db.run_migrations().await?;
    db.health_check().await?;

    info!("Database initialized successfully");

    cli::run(cli, config, db.pool.clone()).await?;

    db.close().await;
    info!("debatedesk completed successfully");
    Ok(())
}
