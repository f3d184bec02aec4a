use std::sync::LazyLock;

use crate::modules::error::{code::ErrorCode, PushlineResult};
use crate::{pushline_version, raise_error};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};

pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";
pub const RETRY: &str = "retry";
pub const AUTH: &str = "auth";

// Metric name constants
pub const METRIC_BUILD_INFO: &str = "pushline_build_info";
pub const METRIC_TASKS_SCHEDULED_TOTAL: &str = "pushline_tasks_scheduled_total";
pub const METRIC_TASK_OUTCOME_TOTAL: &str = "pushline_task_outcome_total";
pub const METRIC_TASK_QUEUE_LENGTH: &str = "pushline_task_queue_length";
pub const METRIC_TASK_FETCH_DURATION: &str = "pushline_task_fetch_duration_seconds";
pub const METRIC_TASK_EXECUTION_DURATION: &str = "pushline_task_execution_duration_seconds";
pub const METRIC_AUTH_REFRESH_TOTAL: &str = "pushline_auth_refresh_total";
pub const METRIC_STORAGE_ERRORS_TOTAL: &str = "pushline_storage_errors_total";

pub static PUSHLINE_BUILD_INFO: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        METRIC_BUILD_INFO,
        "Build information including version and commit hash",
        &["version", "commit"]
    )
    .expect("Failed to register pushline_build_info")
});

pub static PUSHLINE_TASKS_SCHEDULED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_TASKS_SCHEDULED_TOTAL,
        "Total number of tasks persisted by the scheduler"
    )
    .expect("Failed to register pushline_tasks_scheduled_total")
});

pub static PUSHLINE_TASK_OUTCOME_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        METRIC_TASK_OUTCOME_TOTAL,
        "Task execution outcomes, grouped by result (success, retry, failure, auth)",
        &["result"]
    )
    .expect("Failed to register pushline_task_outcome_total")
});

pub static PUSHLINE_TASK_QUEUE_LENGTH: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        METRIC_TASK_QUEUE_LENGTH,
        "Number of unfinished tasks seen at the last claim"
    )
    .expect("Failed to register pushline_task_queue_length")
});

pub static PUSHLINE_TASK_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        METRIC_TASK_FETCH_DURATION,
        "Time spent claiming the next task from the store, in seconds"
    )
    .expect("Failed to register pushline_task_fetch_duration_seconds")
});

pub static PUSHLINE_TASK_EXECUTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        METRIC_TASK_EXECUTION_DURATION,
        "Time spent executing a claimed task's network call, in seconds"
    )
    .expect("Failed to register pushline_task_execution_duration_seconds")
});

pub static PUSHLINE_AUTH_REFRESH_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        METRIC_AUTH_REFRESH_TOTAL,
        "Auth token refresh requests answered by the host, grouped by result",
        &["result"]
    )
    .expect("Failed to register pushline_auth_refresh_total")
});

pub static PUSHLINE_STORAGE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_STORAGE_ERRORS_TOTAL,
        "Storage failures observed by the scheduler and runner"
    )
    .expect("Failed to register pushline_storage_errors_total")
});

pub fn record_build_info() {
    PUSHLINE_BUILD_INFO
        .with_label_values(&[pushline_version!(), env!("GIT_HASH")])
        .set(1);
}

/// Renders every registered metric in the Prometheus text format.
pub fn render() -> PushlineResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    String::from_utf8(buffer)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}
