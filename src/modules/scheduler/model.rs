// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{task_id, utc_now};

/// Bumped whenever the persisted task layout changes.
pub const TASK_SCHEMA_VERSION: u32 = 1;

/// Selects the executor for a task. Blocking tasks are serialized per type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[default]
    ApiCall,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ApiCall => "apiCall",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduling options supplied alongside a request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScheduleContext {
    pub blocking: bool,
}

impl ScheduleContext {
    pub fn blocking() -> Self {
        Self { blocking: true }
    }
}

/// Derived lifecycle state of a stored task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Pending,
    Processing,
    RetryPending,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub id: String,
    /// Operation identifier, e.g. `events/track`.
    pub name: String,
    pub version: u32,
    pub created_at: i64,
    pub modified_at: i64,
    pub task_type: TaskType,
    pub attempts: u32,
    pub last_attempted_at: Option<i64>,
    pub processing: bool,
    pub scheduled_at: i64,
    pub data: Vec<u8>,
    pub failed: bool,
    pub blocking: bool,
    pub requested_at: i64,
    pub task_failure_data: Option<Vec<u8>>,
    /// Monotonic insertion order, used for FIFO ordering of blocking tasks.
    pub sequence: u64,
}

impl TaskMeta {
    pub fn new(
        id: Option<String>,
        name: &str,
        task_type: TaskType,
        data: Vec<u8>,
        context: &ScheduleContext,
        sequence: u64,
    ) -> Self {
        let now = utc_now!();
        Self {
            id: id.unwrap_or_else(|| task_id!()),
            name: name.to_string(),
            version: TASK_SCHEMA_VERSION,
            created_at: now,
            modified_at: now,
            task_type,
            attempts: 0,
            last_attempted_at: None,
            processing: false,
            scheduled_at: now,
            data,
            failed: false,
            blocking: context.blocking,
            requested_at: now,
            task_failure_data: None,
            sequence,
        }
    }

    pub fn state(&self, now: i64) -> TaskState {
        if self.failed {
            TaskState::Failed
        } else if self.processing {
            TaskState::Processing
        } else if self.attempts > 0 && self.scheduled_at > now {
            TaskState::RetryPending
        } else {
            TaskState::Pending
        }
    }

    pub fn is_runnable(&self, now: i64) -> bool {
        !self.processing && !self.failed && self.scheduled_at <= now
    }
}

/// Tasks that are allowed to run once due, in insertion order.
///
/// A blocking task is only eligible when it is the oldest unfinished blocking
/// task of its type, so a blocking task waiting on a retry delay holds back
/// every later blocking task of the same type.
fn eligible(tasks: &[TaskMeta]) -> Vec<&TaskMeta> {
    let mut ordered: Vec<&TaskMeta> = tasks.iter().filter(|t| !t.failed).collect();
    ordered.sort_by_key(|t| t.sequence);

    let mut blocked: AHashSet<TaskType> = AHashSet::new();
    ordered
        .into_iter()
        .filter(|task| !task.blocking || blocked.insert(task.task_type))
        .collect()
}

/// Picks the task the runner should claim next: the eligible runnable task
/// with the smallest `scheduled_at`, ties broken by insertion order.
pub fn pick_next_runnable(tasks: &[TaskMeta], now: i64) -> Option<&TaskMeta> {
    eligible(tasks)
        .into_iter()
        .filter(|t| t.is_runnable(now))
        .min_by_key(|t| (t.scheduled_at, t.sequence))
}

/// Earliest time at which an eligible, unclaimed task becomes runnable.
pub fn next_wake_at(tasks: &[TaskMeta]) -> Option<i64> {
    eligible(tasks)
        .into_iter()
        .filter(|t| !t.processing)
        .map(|t| t.scheduled_at)
        .min()
}

#[cfg(test)]
mod tests {
    use super::{next_wake_at, pick_next_runnable, ScheduleContext, TaskMeta, TaskState, TaskType};

    fn task(id: &str, sequence: u64, blocking: bool, scheduled_at: i64) -> TaskMeta {
        let context = ScheduleContext { blocking };
        let mut task = TaskMeta::new(
            Some(id.into()),
            "events/track",
            TaskType::ApiCall,
            vec![],
            &context,
            sequence,
        );
        task.scheduled_at = scheduled_at;
        task
    }

    #[test]
    fn earliest_due_task_wins() {
        let tasks = vec![task("a", 1, false, 50), task("b", 2, false, 10)];
        assert_eq!(pick_next_runnable(&tasks, 100).map(|t| t.id.as_str()), Some("b"));
        assert_eq!(pick_next_runnable(&tasks, 5), None);
    }

    #[test]
    fn blocking_head_holds_back_later_blocking_tasks() {
        let mut head = task("head", 1, true, 500);
        head.attempts = 1;
        let tasks = vec![head, task("next", 2, true, 0), task("free", 3, false, 0)];

        assert_eq!(pick_next_runnable(&tasks, 100).map(|t| t.id.as_str()), Some("free"));
        assert_eq!(tasks[0].state(100), TaskState::RetryPending);

        let blocked_only = vec![tasks[0].clone(), tasks[1].clone()];
        assert_eq!(pick_next_runnable(&blocked_only, 100), None);
        assert_eq!(next_wake_at(&blocked_only), Some(500));
    }

    #[test]
    fn processing_head_blocks_but_never_wakes() {
        let mut head = task("head", 1, true, 0);
        head.processing = true;
        let tasks = vec![head, task("next", 2, true, 0)];
        assert_eq!(pick_next_runnable(&tasks, 100), None);
        assert_eq!(next_wake_at(&tasks), None);
    }

    #[test]
    fn failed_tasks_release_the_channel() {
        let mut head = task("head", 1, true, 0);
        head.failed = true;
        let tasks = vec![head, task("next", 2, true, 0)];
        assert_eq!(pick_next_runnable(&tasks, 100).map(|t| t.id.as_str()), Some("next"));
    }
}
