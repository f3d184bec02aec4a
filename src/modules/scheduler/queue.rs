// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tracing::{debug, info};

use crate::modules::{
    error::PushlineResult,
    events::{EventBus, SdkEvent},
    metrics::PUSHLINE_TASKS_SCHEDULED_TOTAL,
    request::model::ApiCallRequest,
    scheduler::{
        health::HealthMonitor,
        model::{ScheduleContext, TaskMeta, TaskType},
        store::TaskStore,
    },
};
use crate::task_id;

/// Turns API calls into persisted tasks.
pub struct TaskScheduler<S: TaskStore> {
    store: Arc<S>,
    bus: EventBus,
    health: Arc<HealthMonitor>,
    sequence: AtomicU64,
}

impl<S: TaskStore> TaskScheduler<S> {
    pub async fn new(
        store: Arc<S>,
        bus: EventBus,
        health: Arc<HealthMonitor>,
    ) -> PushlineResult<Self> {
        let sequence = store.max_sequence().await?;
        Ok(Self {
            store,
            bus,
            health,
            sequence: AtomicU64::new(sequence),
        })
    }

    /// Persists `request` under a fresh id. Returns once the task is stored.
    pub async fn schedule(
        &self,
        request: &ApiCallRequest,
        context: &ScheduleContext,
    ) -> PushlineResult<String> {
        self.schedule_with_id(task_id!(), request, context).await
    }

    /// Same as [`Self::schedule`] with a caller-chosen id, so a result
    /// listener can be registered before the task can possibly finish.
    pub async fn schedule_with_id(
        &self,
        task_id: String,
        request: &ApiCallRequest,
        context: &ScheduleContext,
    ) -> PushlineResult<String> {
        let data = request.encode()?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let task = TaskMeta::new(
            Some(task_id.clone()),
            request.request.path(),
            TaskType::ApiCall,
            data,
            context,
            sequence,
        );

        if let Err(e) = self.store.store_task(task).await {
            self.health.on_schedule_error(&e);
            return Err(e);
        }

        PUSHLINE_TASKS_SCHEDULED_TOTAL.inc();
        debug!(
            "scheduled task {} for '{}' (blocking={})",
            task_id,
            request.request.path(),
            context.blocking
        );
        self.bus.publish(SdkEvent::TaskScheduled {
            task_id: task_id.clone(),
        });
        Ok(task_id)
    }

    /// Drops every stored task. There is no undo.
    pub async fn delete_all_tasks(&self) -> PushlineResult<usize> {
        let deleted = self.store.delete_all_tasks().await?;
        info!("deleted all tasks, {} removed", deleted);
        Ok(deleted)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
