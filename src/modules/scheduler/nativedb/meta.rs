// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use native_db::Database;
use tracing::{debug, info};

use crate::{
    modules::{
        database::{
            async_find_impl, batch_delete_impl, batch_update_impl, count_impl, delete_impl,
            insert_impl, list_all_impl, rw_transaction_impl, storage_error, update_impl,
        },
        error::{code::ErrorCode, PushlineResult},
        metrics::{PUSHLINE_TASK_FETCH_DURATION, PUSHLINE_TASK_QUEUE_LENGTH},
        scheduler::{
            model::{next_wake_at, pick_next_runnable, TaskMeta},
            nativedb::{TaskEntity, TaskEntityKey},
            store::TaskStore,
        },
    },
    raise_error, utc_now,
};

#[derive(Clone)]
pub struct NativeDbTaskStore {
    pub store: Arc<Database<'static>>,
}

impl NativeDbTaskStore {
    pub fn init(database: Arc<Database<'static>>) -> Self {
        Self { store: database }
    }

    fn not_found(task_id: &str) -> crate::modules::error::PushlineError {
        raise_error!(
            format!(
                "The task with id={} that you want to modify was not found.",
                task_id
            ),
            ErrorCode::ResourceNotFound
        )
    }

    async fn claim_next(
        database: &Arc<Database<'static>>,
        now: i64,
    ) -> PushlineResult<Option<TaskMeta>> {
        let start = Instant::now();
        let claimed = rw_transaction_impl(database, move |rw| {
            let entities: Vec<TaskEntity> = rw
                .scan()
                .secondary::<TaskEntity>(TaskEntityKey::sequence)
                .map_err(storage_error)?
                .all()
                .map_err(storage_error)?
                .try_collect()
                .map_err(storage_error)?;
            PUSHLINE_TASK_QUEUE_LENGTH.set(entities.iter().filter(|t| !t.failed).count() as i64);

            let tasks: Vec<TaskMeta> = entities.into_iter().map(Into::into).collect();
            let Some(next) = pick_next_runnable(&tasks, now) else {
                return Ok(None);
            };

            let mut updated = next.clone();
            updated.processing = true;
            updated.last_attempted_at = Some(now);
            updated.modified_at = utc_now!();
            rw.update::<TaskEntity>(next.clone().into(), updated.clone().into())
                .map_err(storage_error)?;
            Ok(Some(updated))
        })
        .await?;

        let elapsed = start.elapsed();
        PUSHLINE_TASK_FETCH_DURATION.observe(elapsed.as_secs_f64());
        debug!("Time taken to claim task from native_db: {:#?}", elapsed);
        Ok(claimed)
    }

    async fn update_task(
        database: &Arc<Database<'static>>,
        task_id: &str,
        apply: impl FnOnce(&mut TaskEntity) + Send + 'static,
    ) -> PushlineResult<TaskEntity> {
        let id = task_id.to_string();
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .primary::<TaskEntity>(id.clone())
                    .map_err(storage_error)?
                    .ok_or_else(|| Self::not_found(&id))
            },
            move |current| {
                let mut updated = current.clone();
                apply(&mut updated);
                updated.modified_at = utc_now!();
                Ok(updated)
            },
        )
        .await
    }
}

impl TaskStore for NativeDbTaskStore {
    async fn store_task(&self, task: TaskMeta) -> PushlineResult<()> {
        insert_impl(&self.store, TaskEntity::from(task)).await
    }

    async fn find_task(&self, task_id: &str) -> PushlineResult<Option<TaskMeta>> {
        let entity: Option<TaskEntity> = async_find_impl(&self.store, task_id.to_string()).await?;
        Ok(entity.map(Into::into))
    }

    async fn list_tasks(&self) -> PushlineResult<Vec<TaskMeta>> {
        let entities = list_all_impl::<TaskEntity>(&self.store).await?;
        Ok(entities
            .into_iter()
            .sorted_by_key(|e| e.sequence)
            .map(Into::into)
            .collect())
    }

    async fn claim_next_task(&self, now: i64) -> PushlineResult<Option<TaskMeta>> {
        Self::claim_next(&self.store, now).await
    }

    async fn claim_task(&self, task_id: &str, now: i64) -> PushlineResult<Option<TaskMeta>> {
        let id = task_id.to_string();
        rw_transaction_impl(&self.store, move |rw| {
            let Some(current) = rw
                .get()
                .primary::<TaskEntity>(id)
                .map_err(storage_error)?
            else {
                return Ok(None);
            };
            let task: TaskMeta = current.clone().into();
            if !task.is_runnable(now) {
                return Ok(None);
            }
            let mut updated = current.clone();
            updated.processing = true;
            updated.last_attempted_at = Some(now);
            updated.modified_at = utc_now!();
            rw.update(current, updated.clone()).map_err(storage_error)?;
            Ok(Some(updated.into()))
        })
        .await
    }

    async fn reschedule_task(
        &self,
        task_id: &str,
        attempts: u32,
        scheduled_at: i64,
    ) -> PushlineResult<()> {
        Self::update_task(&self.store, task_id, move |task| {
            task.processing = false;
            task.attempts = task.attempts.max(attempts);
            task.scheduled_at = task.scheduled_at.max(scheduled_at);
        })
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, failure_data: Option<Vec<u8>>) -> PushlineResult<()> {
        Self::update_task(&self.store, task_id, move |task| {
            if task.failed {
                return;
            }
            task.processing = false;
            task.failed = true;
            task.task_failure_data = failure_data;
        })
        .await?;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> PushlineResult<()> {
        let id = task_id.to_string();
        let deleted = delete_impl::<TaskEntity>(&self.store, move |rw| {
            rw.get().primary::<TaskEntity>(id).map_err(storage_error)
        })
        .await?;
        if !deleted {
            debug!("task {} was already gone", task_id);
        }
        Ok(())
    }

    async fn delete_all_tasks(&self) -> PushlineResult<usize> {
        let deleted = batch_delete_impl(&self.store, |rw| {
            let all: Vec<TaskEntity> = rw
                .scan()
                .primary()
                .map_err(storage_error)?
                .all()
                .map_err(storage_error)?
                .try_collect()
                .map_err(storage_error)?;
            Ok(all)
        })
        .await?;
        PUSHLINE_TASK_QUEUE_LENGTH.set(0);
        Ok(deleted)
    }

    async fn count_tasks(&self) -> PushlineResult<u64> {
        count_impl::<TaskEntity>(&self.store).await
    }

    async fn next_wake_at(&self) -> PushlineResult<Option<i64>> {
        let tasks = self.list_tasks().await?;
        Ok(next_wake_at(&tasks))
    }

    async fn restore(&self) -> PushlineResult<usize> {
        info!("starting task restore...");
        let restored = batch_update_impl(
            &self.store,
            |rw| {
                let interrupted: Vec<TaskEntity> = rw
                    .scan()
                    .primary::<TaskEntity>()
                    .map_err(storage_error)?
                    .all()
                    .map_err(storage_error)?
                    .filter_ok(|t| t.processing)
                    .try_collect()
                    .map_err(storage_error)?;
                Ok(interrupted)
            },
            |interrupted| {
                Ok(interrupted
                    .iter()
                    .map(|task| {
                        // A crash mid-flight releases the claim; attempts and
                        // scheduled_at stay as they were.
                        let mut updated = task.clone();
                        updated.processing = false;
                        updated.modified_at = utc_now!();
                        (task.clone(), updated)
                    })
                    .collect())
            },
        )
        .await?;
        info!("task restore finished, {} task(s) released", restored.len());
        Ok(restored.len())
    }

    async fn max_sequence(&self) -> PushlineResult<u64> {
        let tasks = list_all_impl::<TaskEntity>(&self.store).await?;
        Ok(tasks.iter().map(|t| t.sequence).max().unwrap_or(0))
    }
}
