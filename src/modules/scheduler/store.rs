// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::{error::PushlineResult, scheduler::model::TaskMeta};
use std::future::Future;

/// Durable task table shared by the scheduler and the runner.
///
/// Every mutation must be atomic with respect to the others: a claim reads
/// and flips `processing` inside one write transaction.
pub trait TaskStore: Send + Sync + 'static {
    fn store_task(&self, task: TaskMeta) -> impl Future<Output = PushlineResult<()>> + Send;

    fn find_task(
        &self,
        task_id: &str,
    ) -> impl Future<Output = PushlineResult<Option<TaskMeta>>> + Send;

    fn list_tasks(&self) -> impl Future<Output = PushlineResult<Vec<TaskMeta>>> + Send;

    /// Claims the next runnable task, marking it `processing`.
    fn claim_next_task(
        &self,
        now: i64,
    ) -> impl Future<Output = PushlineResult<Option<TaskMeta>>> + Send;

    /// Claims one specific task. `None` when it is gone, failed, already
    /// processing, or not yet due.
    fn claim_task(
        &self,
        task_id: &str,
        now: i64,
    ) -> impl Future<Output = PushlineResult<Option<TaskMeta>>> + Send;

    /// Releases a claimed task back to pending with new `attempts` and
    /// `scheduled_at`.
    fn reschedule_task(
        &self,
        task_id: &str,
        attempts: u32,
        scheduled_at: i64,
    ) -> impl Future<Output = PushlineResult<()>> + Send;

    fn mark_failed(
        &self,
        task_id: &str,
        failure_data: Option<Vec<u8>>,
    ) -> impl Future<Output = PushlineResult<()>> + Send;

    fn delete_task(&self, task_id: &str) -> impl Future<Output = PushlineResult<()>> + Send;

    fn delete_all_tasks(&self) -> impl Future<Output = PushlineResult<usize>> + Send;

    fn count_tasks(&self) -> impl Future<Output = PushlineResult<u64>> + Send;

    /// Earliest `scheduled_at` among unfinished, unclaimed tasks.
    fn next_wake_at(&self) -> impl Future<Output = PushlineResult<Option<i64>>> + Send;

    /// Clears `processing` left behind by a crash.
    fn restore(&self) -> impl Future<Output = PushlineResult<usize>> + Send;

    /// Largest `sequence` in the table, used to seed new insertions.
    fn max_sequence(&self) -> impl Future<Output = PushlineResult<u64>> + Send;
}
