use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    /// Model used for the synthesis stage, which returns a reasoning trace
    pub reasoning_model: String,
    pub timeout_seconds: u64,
    /// Total attempts per stage call, first call included
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
    pub max_backoff_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub weighted_index: String,
    pub broad_index: String,
    pub weighted_quota: usize,
    pub broad_quota: usize,
    pub freshness_days: i64,
    pub workers: usize,
    pub timeout_seconds: u64,
}

/// Read an env var, falling back to `default`, and parse it with a readable error.
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {} value", key))
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL environment variable is required but not set")?;

        let config = Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DB_MAX_CONNECTIONS", "5")?,
                min_connections: env_or("DB_MIN_CONNECTIONS", "1")?,
            },
            llm: LlmConfig {
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: env::var("LLM_API_KEY").ok(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                reasoning_model: env::var("LLM_REASONING_MODEL")
                    .unwrap_or_else(|_| "o4-mini".to_string()),
                timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", "120")?,
                max_attempts: env_or("LLM_MAX_ATTEMPTS", "3")?,
                backoff_unit_ms: env_or("LLM_BACKOFF_UNIT_MS", "1000")?,
                max_backoff_seconds: env_or("LLM_MAX_BACKOFF_SECONDS", "30")?,
            },
            pipeline: PipelineConfig {
                weighted_index: env::var("WEIGHTED_INDEX").unwrap_or_else(|_| "NDX".to_string()),
                broad_index: env::var("BROAD_INDEX").unwrap_or_else(|_| "SPX".to_string()),
                weighted_quota: env_or("WEIGHTED_QUOTA", "4")?,
                broad_quota: env_or("BROAD_QUOTA", "4")?,
                freshness_days: env_or("FRESHNESS_DAYS", "14")?,
                workers: env_or("DEBATE_WORKERS", "5")?,
                timeout_seconds: env_or("PIPELINE_TIMEOUT_SECONDS", "900")?,
            },
        };

        if config.pipeline.workers == 0 {
            anyhow::bail!("DEBATE_WORKERS must be at least 1");
        }
        if config.llm.max_attempts == 0 {
            anyhow::bail!("LLM_MAX_ATTEMPTS must be at least 1");
        }
        if config.pipeline.freshness_days < 0 {
            anyhow::bail!("FRESHNESS_DAYS must not be negative");
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/debatedesk".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                reasoning_model: "o4-mini".to_string(),
                timeout_seconds: 120,
                max_attempts: 3,
                backoff_unit_ms: 1000,
                max_backoff_seconds: 30,
            },
            pipeline: PipelineConfig {
                weighted_index: "NDX".to_string(),
                broad_index: "SPX".to_string(),
                weighted_quota: 4,
                broad_quota: 4,
                freshness_days: 14,
                workers: 5,
                timeout_seconds: 900,
            },
        }
    }
}
