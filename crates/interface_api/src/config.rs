//! Service configuration
//!
//! Read from `CREDITS_*` environment variables; every field has a default so
//! that a bare `credits-server` starts on a development setup.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use core_kernel::{CreditPrecision, Credits, ProjectId};
use domain_billing::{NotificationPolicy, Threshold};
use infra_pipeline::PipelineConfig;

/// Errors turning the raw configuration into typed settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Log level, used when `RUST_LOG` is not set
    pub log_level: String,
    /// Number of billing workers
    pub workers: usize,
    /// Conflicting writes tolerated per measurement
    pub max_conflicts: u32,
    /// Retries while the attribute store is unreachable
    pub max_unavailable_retries: u32,
    /// First retry delay in milliseconds
    pub backoff_initial_ms: u64,
    /// Retry delay cap in milliseconds
    pub backoff_max_ms: u64,
    /// Seconds shutdown waits for queued measurements
    pub drain_timeout_secs: u64,
    /// Decimal places of credit amounts
    pub precision: u32,
    /// Semicolon separated projects to bill, empty bills all
    pub project_whitelist: String,
    /// Semicolon separated thresholds, `50%` of granted or absolute credits
    pub notify_thresholds: String,
    /// Credits granted to projects the store has not seen yet
    pub default_grant: Option<Decimal>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            workers: 10,
            max_conflicts: 3,
            max_unavailable_retries: 3,
            backoff_initial_ms: 100,
            backoff_max_ms: 5_000,
            drain_timeout_secs: 30,
            precision: 2,
            project_whitelist: String::new(),
            notify_thresholds: "50%".to_string(),
            default_grant: None,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(config::Config::builder()
            .add_source(config::Environment::with_prefix("CREDITS"))
            .build()?
            .try_deserialize()?)
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses the project whitelist, `None` if it is empty
    pub fn whitelist(&self) -> Result<Option<Vec<ProjectId>>, ConfigError> {
        let projects = split_list(&self.project_whitelist)
            .map(|p| ProjectId::new(p).map_err(|e| ConfigError::invalid("project_whitelist", e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((!projects.is_empty()).then_some(projects))
    }

    /// Parses the notification thresholds
    pub fn notification_policy(&self) -> Result<NotificationPolicy, ConfigError> {
        let thresholds = split_list(&self.notify_thresholds)
            .map(parse_threshold)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(if thresholds.is_empty() {
            NotificationPolicy::disabled()
        } else {
            NotificationPolicy::new(thresholds)
        })
    }

    pub fn default_grant(&self) -> Option<Credits> {
        self.default_grant.map(Credits::new)
    }

    /// Builds the pipeline configuration
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let precision =
            CreditPrecision::new(self.precision).map_err(|e| ConfigError::invalid("precision", e))?;

        let mut config = PipelineConfig::new()
            .workers(self.workers)
            .max_conflicts(self.max_conflicts)
            .max_unavailable_retries(self.max_unavailable_retries)
            .backoff(
                Duration::from_millis(self.backoff_initial_ms),
                Duration::from_millis(self.backoff_max_ms),
            )
            .drain_timeout(Duration::from_secs(self.drain_timeout_secs))
            .precision(precision)
            .notification_policy(self.notification_policy()?);
        if let Some(projects) = self.whitelist()? {
            config = config.project_whitelist(projects);
        }

        config
            .validate()
            .map_err(|e| ConfigError::invalid("pipeline", e))?;
        Ok(config)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_threshold(raw: &str) -> Result<Threshold, ConfigError> {
    let invalid = |reason: String| ConfigError::invalid("notify_thresholds", reason);
    match raw.strip_suffix('%') {
        Some(percent) => {
            let percent: Decimal = percent
                .trim()
                .parse()
                .map_err(|_| invalid(format!("`{}` is not a percentage", raw)))?;
            if percent <= Decimal::ZERO || percent >= Decimal::ONE_HUNDRED {
                return Err(invalid(format!("`{}` must lie between 0% and 100%", raw)));
            }
            Ok(Threshold::FractionOfGranted(percent / Decimal::ONE_HUNDRED))
        }
        None => {
            let credits: Decimal = raw
                .parse()
                .map_err(|_| invalid(format!("`{}` is not a credit amount", raw)))?;
            if credits < Decimal::ZERO {
                return Err(invalid(format!("`{}` is negative", raw)));
            }
            Ok(Threshold::Absolute(Credits::new(credits)))
        }
    }
}
