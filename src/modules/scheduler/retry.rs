// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const EXPONENTIAL_FACTOR: f64 = 2.0;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
pub enum RetryBackoff {
    /// The same interval between every attempt.
    Linear,
    /// `retry_interval * 2^(attempt - 1)`
    #[default]
    Exponential,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retry: u32,
    pub retry_interval: Duration,
    pub retry_backoff: RetryBackoff,
}

impl RetryPolicy {
    pub fn linear(max_retry: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry,
            retry_interval,
            retry_backoff: RetryBackoff::Linear,
        }
    }

    pub fn exponential(max_retry: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry,
            retry_interval,
            retry_backoff: RetryBackoff::Exponential,
        }
    }

    /// Delay before `attempt` (1-based). Attempt 0 is treated as attempt 1.
    pub fn wait_time(&self, attempt: u32) -> Duration {
        match self.retry_backoff {
            RetryBackoff::Linear => self.retry_interval,
            RetryBackoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(32) as i32;
                self.retry_interval
                    .mul_f64(EXPONENTIAL_FACTOR.powi(exponent))
            }
        }
    }

    /// Next eligibility time in milliseconds. Never earlier than `previous`.
    pub fn next_scheduled_at(&self, previous: i64, now: i64, attempt: u32) -> i64 {
        previous.max(now) + self.wait_time(attempt).as_millis() as i64
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retry
    }
}
