// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::{builder::ValueParser, Parser};
use std::{path::PathBuf, sync::LazyLock};
use url::Url;

use crate::modules::scheduler::retry::RetryBackoff;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "pushline",
    about = "Queue tracking calls durably on this device and deliver them to the messaging API,
    retrying through outages and token expiry.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// pushline log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for pushline"
    )]
    pub pushline_log_level: String,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub pushline_ansi_logs: bool,

    /// Enable log file output (default: false)
    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub pushline_log_to_file: bool,

    /// Enable JSON logs (default: false)
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable JSON formatted logs"
    )]
    pub pushline_json_logs: bool,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of log files"
    )]
    pub pushline_max_log_files: usize,

    #[clap(
        long,
        env,
        help = "Set the directory holding the task database and logs",
        value_parser = ValueParser::new(|s: &str| {
            let path = PathBuf::from(s);
            if !path.is_absolute() {
                return Err("Path must be an absolute directory path".to_string());
            }
            if !path.exists() {
                return Err(format!("Path {:?} does not exist", path));
            }
            if !path.is_dir() {
                return Err(format!("Path {:?} is not a directory", path));
            }
            Ok(s.to_string())
        })
    )]
    pub pushline_root_dir: Option<String>,

    /// Keep the task queue in memory only. Tasks do not survive a restart.
    #[clap(long, default_value = "false", env)]
    pub pushline_memory_mode: bool,

    #[clap(long, env, default_value = "", help = "API key sent with every request")]
    pub pushline_api_key: String,

    #[clap(
        long,
        env,
        default_value = "https://api.pushline.io/api/",
        help = "Base URL of the messaging API",
        value_parser = ValueParser::new(|s: &str| {
            let url = Url::parse(s).map_err(|e| format!("Invalid endpoint '{}': {}", s, e))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err("Endpoint must use http or https".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub pushline_endpoint: String,

    #[clap(long, env, default_value = "3", help = "Attempts before a task is marked failed")]
    pub pushline_max_retry: u32,

    #[clap(long, env, default_value = "6", help = "Base retry interval for tasks, in seconds")]
    pub pushline_retry_interval_secs: u64,

    #[clap(long, env, value_enum, default_value = "exponential")]
    pub pushline_retry_backoff: RetryBackoff,

    #[clap(long, env, default_value = "10", help = "Token refresh attempts after auth failures")]
    pub pushline_auth_max_retry: u32,

    #[clap(long, env, default_value = "6", help = "Base interval between token refreshes, in seconds")]
    pub pushline_auth_retry_interval_secs: u64,

    #[clap(long, env, value_enum, default_value = "linear")]
    pub pushline_auth_retry_backoff: RetryBackoff,

    #[clap(
        long,
        env,
        default_value = "60",
        help = "Refresh an expiring token this many seconds before it expires"
    )]
    pub pushline_expiring_auth_token_refresh_period_secs: u64,

    #[clap(
        long,
        env,
        default_value = "100",
        help = "Maximum number of events buffered before a user is identified",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub pushline_event_threshold_limit: u32,

    #[clap(long, env, default_value = "60", help = "Task runner wake-up interval, in seconds")]
    pub pushline_runner_interval_secs: u64,

    #[clap(long, env, default_value = "false", help = "Keep failed tasks in the store")]
    pub pushline_retain_failed_tasks: bool,

    #[clap(long, env, help = "URL probed to decide whether the device is online")]
    pub pushline_connectivity_probe_url: Option<String>,

    #[clap(long, env, default_value = "30")]
    pub pushline_connectivity_poll_secs: u64,

    #[clap(long, env)]
    pub pushline_email: Option<String>,

    #[clap(long, env)]
    pub pushline_user_id: Option<String>,

    /// Static bearer token handed out by the harness' auth delegate.
    #[clap(long, env)]
    pub pushline_auth_token: Option<String>,

    #[clap(long, help = "Track a single custom event and wait for the result")]
    pub pushline_event_name: Option<String>,

    #[clap(long, help = "JSON object attached to the tracked event")]
    pub pushline_data_fields: Option<String>,

    #[clap(long, default_value = "30", help = "Seconds to wait for the tracked event")]
    pub pushline_wait_secs: u64,

    #[clap(long, default_value = "false")]
    pub pushline_print_metrics: bool,
}

impl Settings {
    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            pushline_log_level: "info".to_string(),
            pushline_ansi_logs: false,
            pushline_log_to_file: false,
            pushline_json_logs: false,
            pushline_max_log_files: 5,
            pushline_root_dir: None,
            pushline_memory_mode: true,
            pushline_api_key: "test-api-key".to_string(),
            pushline_endpoint: "https://api.pushline.io/api/".to_string(),
            pushline_max_retry: 3,
            pushline_retry_interval_secs: 6,
            pushline_retry_backoff: RetryBackoff::Exponential,
            pushline_auth_max_retry: 10,
            pushline_auth_retry_interval_secs: 6,
            pushline_auth_retry_backoff: RetryBackoff::Linear,
            pushline_expiring_auth_token_refresh_period_secs: 60,
            pushline_event_threshold_limit: 100,
            pushline_runner_interval_secs: 60,
            pushline_retain_failed_tasks: false,
            pushline_connectivity_probe_url: None,
            pushline_connectivity_poll_secs: 30,
            pushline_email: None,
            pushline_user_id: None,
            pushline_auth_token: None,
            pushline_event_name: None,
            pushline_data_fields: None,
            pushline_wait_secs: 30,
            pushline_print_metrics: false,
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.pushline_root_dir
            .as_ref()
            .map(|root| PathBuf::from(root).join("logs"))
    }

    pub fn task_db_path(&self) -> Option<PathBuf> {
        self.pushline_root_dir
            .as_ref()
            .map(|root| PathBuf::from(root).join("tasks.db"))
    }
}
