use std::time::Duration;

use crate::modules::{
    error::{code::ErrorCode, PushlineResult},
    scheduler::retry::{RetryBackoff, RetryPolicy},
    settings::cli::Settings,
};
use crate::raise_error;

pub const DEFAULT_ENDPOINT: &str = "https://api.pushline.io/api/";

/// Everything the delivery core reads at runtime. Built once by the host and
/// handed to [`crate::modules::context::SdkContext::initialize`].
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub api_key: String,
    pub endpoint: String,
    /// Governs task retries after transient failures.
    pub task_retry_policy: RetryPolicy,
    /// Governs token refreshes after JWT failures.
    pub auth_retry_policy: RetryPolicy,
    pub expiring_auth_token_refresh_period: Duration,
    pub event_threshold_limit: usize,
    pub runner_interval: Duration,
    pub retain_failed_tasks: bool,
    pub connectivity_poll_interval: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            task_retry_policy: RetryPolicy {
                max_retry: 3,
                retry_interval: Duration::from_secs(6),
                retry_backoff: RetryBackoff::Exponential,
            },
            auth_retry_policy: RetryPolicy {
                max_retry: 10,
                retry_interval: Duration::from_secs(6),
                retry_backoff: RetryBackoff::Linear,
            },
            expiring_auth_token_refresh_period: Duration::from_secs(60),
            event_threshold_limit: 100,
            runner_interval: Duration::from_secs(60),
            retain_failed_tasks: false,
            connectivity_poll_interval: Duration::from_secs(30),
        }
    }
}

impl SdkConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.pushline_api_key.clone(),
            endpoint: settings.pushline_endpoint.clone(),
            task_retry_policy: RetryPolicy {
                max_retry: settings.pushline_max_retry,
                retry_interval: Duration::from_secs(settings.pushline_retry_interval_secs),
                retry_backoff: settings.pushline_retry_backoff,
            },
            auth_retry_policy: RetryPolicy {
                max_retry: settings.pushline_auth_max_retry,
                retry_interval: Duration::from_secs(settings.pushline_auth_retry_interval_secs),
                retry_backoff: settings.pushline_auth_retry_backoff,
            },
            expiring_auth_token_refresh_period: Duration::from_secs(
                settings.pushline_expiring_auth_token_refresh_period_secs,
            ),
            event_threshold_limit: settings.pushline_event_threshold_limit as usize,
            runner_interval: Duration::from_secs(settings.pushline_runner_interval_secs),
            retain_failed_tasks: settings.pushline_retain_failed_tasks,
            connectivity_poll_interval: Duration::from_secs(
                settings.pushline_connectivity_poll_secs,
            ),
        }
    }

    pub fn validate(&self) -> PushlineResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(raise_error!(
                "An api key is required to send requests.".into(),
                ErrorCode::MissingConfiguration
            ));
        }
        url::Url::parse(&self.endpoint).map_err(|e| {
            raise_error!(
                format!("Invalid endpoint '{}': {}", self.endpoint, e),
                ErrorCode::MissingConfiguration
            )
        })?;
        if self.task_retry_policy.max_retry == 0 {
            return Err(raise_error!(
                "'max_retry' must be at least 1.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.runner_interval.is_zero() {
            return Err(raise_error!(
                "'runner_interval' must be greater than zero.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}
