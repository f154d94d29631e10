use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the `signal-engine` binary, loaded once at
/// startup the way `trading-agent/src/config.rs` does it: optional-with-
/// default fields parse an env var or fall back to a literal, hard
/// requirements use `.context(...)?`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_url: String,
    pub watchlist: Vec<String>,
    pub portfolio_value: rust_decimal::Decimal,

    // ReliabilityLayer defaults (per-agent retry policy).
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,

    // Learning gates; double as system_config defaults (see schema.sql).
    pub auto_learning_enabled: bool,
    pub human_review_required: bool,
    pub min_confidence_for_auto: f64,
    pub max_weight_change_daily: f64,

    // Schedule timing, overridable for testing without touching wall-clock math.
    pub fetch_market_data_interval_secs: u64,
    pub fetch_sentiment_interval_secs: u64,
    pub generate_daily_signals_times: Vec<(u32, u32)>,
    pub analyze_performance_time: (u32, u32),
    pub optimize_weights_time: (u32, u32),
    pub daily_summary_time: (u32, u32),
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:signal_engine.db".to_string()),
            watchlist: env::var("WATCHLIST")
                .unwrap_or_else(|_| "AAPL,MSFT,GOOGL,AMZN,NVDA".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            portfolio_value: env::var("PORTFOLIO_VALUE")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()
                .context("PORTFOLIO_VALUE must be a decimal")?,

            max_retries: env::var("RELIABILITY_MAX_RETRIES").unwrap_or_else(|_| "3".to_string()).parse()?,
            initial_delay_ms: env::var("RELIABILITY_INITIAL_DELAY_MS").unwrap_or_else(|_| "1000".to_string()).parse()?,
            backoff_factor: env::var("RELIABILITY_BACKOFF_FACTOR").unwrap_or_else(|_| "2.0".to_string()).parse()?,
            max_delay_ms: env::var("RELIABILITY_MAX_DELAY_MS").unwrap_or_else(|_| "60000".to_string()).parse()?,

            auto_learning_enabled: env::var("AUTO_LEARNING_ENABLED").unwrap_or_else(|_| "false".to_string()).parse()?,
            human_review_required: env::var("HUMAN_REVIEW_REQUIRED").unwrap_or_else(|_| "true".to_string()).parse()?,
            min_confidence_for_auto: env::var("MIN_CONFIDENCE_FOR_AUTO").unwrap_or_else(|_| "0.80".to_string()).parse()?,
            max_weight_change_daily: env::var("MAX_WEIGHT_CHANGE_DAILY").unwrap_or_else(|_| "0.10".to_string()).parse()?,

            fetch_market_data_interval_secs: env::var("FETCH_MARKET_DATA_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            fetch_sentiment_interval_secs: env::var("FETCH_SENTIMENT_INTERVAL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()?,
            generate_daily_signals_times: vec![(9, 0), (12, 0)],
            analyze_performance_time: (16, 30),
            optimize_weights_time: (0, 0),
            daily_summary_time: (8, 30),
        })
    }

    pub fn retry_policy(&self) -> reliability::RetryPolicy {
        reliability::RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }

    pub fn learning_config(&self) -> learning_loop::LearningLoopConfig {
        learning_loop::LearningLoopConfig {
            auto_learning_enabled: self.auto_learning_enabled,
            human_review_required: self.human_review_required,
            min_confidence_for_auto: self.min_confidence_for_auto,
            daily_change_cap: self.max_weight_change_daily,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_any_env_vars_set() {
        for key in [
            "DATABASE_URL",
            "WATCHLIST",
            "PORTFOLIO_VALUE",
            "RELIABILITY_MAX_RETRIES",
            "AUTO_LEARNING_ENABLED",
        ] {
            env::remove_var(key);
        }
        let config = EngineConfig::from_env().unwrap();
        assert!(!config.watchlist.is_empty());
        assert!(!config.auto_learning_enabled);
    }
}
