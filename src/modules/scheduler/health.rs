use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{error, info};

use crate::modules::{error::PushlineError, metrics::PUSHLINE_STORAGE_ERRORS_TOTAL};

/// Tracks store failures. Once the runner hits one it stops claiming until
/// someone calls [`HealthMonitor::reset`].
#[derive(Debug, Default)]
pub struct HealthMonitor {
    errored: AtomicBool,
    error_count: AtomicU64,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_process(&self) -> bool {
        !self.errored.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Records a failure seen by the scheduler. The caller gets the error, so
    /// claiming is not halted.
    pub fn on_schedule_error(&self, error: &PushlineError) {
        error!("failed to persist task: {:?}", error);
        self.count();
    }

    /// Records a failure seen by the runner and halts claiming.
    pub fn on_runner_error(&self, operation: &str, error: &PushlineError) {
        error!("task store '{}' failed, halting runner: {:?}", operation, error);
        self.count();
        self.errored.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        if self.errored.swap(false, Ordering::SeqCst) {
            info!("task store health reset, runner may resume");
        }
    }

    fn count(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        PUSHLINE_STORAGE_ERRORS_TOTAL.inc();
    }
}
