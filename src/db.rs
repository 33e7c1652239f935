use anyhow::{Context, Result};
use sqlx::{postgres::{PgConnectOptions, PgPoolOptions}, PgPool};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let connect_options = PgConnectOptions::from_str(&config.url)
            .context("Failed to parse DATABASE_URL")?
            // Pooled endpoints (pgBouncer) reject named prepared statements
            .statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to PostgreSQL database. Check that DATABASE_URL is set correctly.")?;

        info!("Database connection established successfully");
        Ok(Database { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check on the database connection
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .persistent(false)
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        info!("Database health check passed");
        Ok(())
    }

    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}
