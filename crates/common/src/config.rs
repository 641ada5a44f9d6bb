//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Completion pipeline tuning
    pub completion_timeout_secs: u64,
    pub completion_max_tokens: u32,
    pub completion_temperature: f32,
    pub pipeline_queue_capacity: usize,
    pub pipeline_concurrency: usize,

    /// Attempts for the message phase of a conversation delete
    pub delete_retry_attempts: u32,

    /// Runtime configuration
    pub log_level: String,
    pub log_format: String,
    pub rust_log: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            completion_timeout_secs: 30,
            completion_max_tokens: 200,
            completion_temperature: 0.7,
            pipeline_queue_capacity: 256,
            pipeline_concurrency: 8,
            delete_retry_attempts: 3,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            rust_log: "chatline=debug".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Self::default();

        let config = Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),

            completion_timeout_secs: parse_or(
                "COMPLETION_TIMEOUT_SECS",
                defaults.completion_timeout_secs,
            )?,
            completion_max_tokens: parse_or("COMPLETION_MAX_TOKENS", defaults.completion_max_tokens)?,
            completion_temperature: parse_or(
                "COMPLETION_TEMPERATURE",
                defaults.completion_temperature,
            )?,
            pipeline_queue_capacity: parse_or(
                "PIPELINE_QUEUE_CAPACITY",
                defaults.pipeline_queue_capacity,
            )?,
            pipeline_concurrency: parse_or("PIPELINE_CONCURRENCY", defaults.pipeline_concurrency)?,
            delete_retry_attempts: parse_or("DELETE_RETRY_ATTEMPTS", defaults.delete_retry_attempts)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
            rust_log: env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            port: parse_or("PORT", defaults.port)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.completion_timeout_secs == 0 {
            anyhow::bail!("COMPLETION_TIMEOUT_SECS must be at least 1");
        }
        if self.completion_max_tokens == 0 {
            anyhow::bail!("COMPLETION_MAX_TOKENS must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.completion_temperature) {
            anyhow::bail!("COMPLETION_TEMPERATURE must be between 0.0 and 2.0");
        }
        if self.pipeline_queue_capacity == 0 {
            anyhow::bail!("PIPELINE_QUEUE_CAPACITY must be at least 1");
        }
        if self.pipeline_concurrency == 0 {
            anyhow::bail!("PIPELINE_CONCURRENCY must be at least 1");
        }
        if self.delete_retry_attempts == 0 {
            anyhow::bail!("DELETE_RETRY_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

/// Parse an optional environment variable, falling back to `default` when unset
fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(default),
    }
}
