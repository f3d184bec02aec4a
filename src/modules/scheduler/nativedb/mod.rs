use crate::modules::scheduler::model::{TaskMeta, TaskType};
use native_db::*;
use native_model::native_model;
use native_model::Model;
use serde::{Deserialize, Serialize};

pub mod meta;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct TaskEntity {
    #[primary_key]
    pub id: String,
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
    #[secondary_key(unique)]
    pub sequence: u64,
}

impl From<TaskEntity> for TaskMeta {
    fn from(entity: TaskEntity) -> Self {
        TaskMeta {
            id: entity.id,
            name: entity.name,
            version: entity.version,
            created_at: entity.created_at,
            modified_at: entity.modified_at,
            task_type: entity.task_type,
            attempts: entity.attempts,
            last_attempted_at: entity.last_attempted_at,
            processing: entity.processing,
            scheduled_at: entity.scheduled_at,
            data: entity.data,
            failed: entity.failed,
            blocking: entity.blocking,
            requested_at: entity.requested_at,
            task_failure_data: entity.task_failure_data,
            sequence: entity.sequence,
        }
    }
}

impl From<TaskMeta> for TaskEntity {
    fn from(task: TaskMeta) -> Self {
        TaskEntity {
            id: task.id,
            name: task.name,
            version: task.version,
            created_at: task.created_at,
            modified_at: task.modified_at,
            task_type: task.task_type,
            attempts: task.attempts,
            last_attempted_at: task.last_attempted_at,
            processing: task.processing,
            scheduled_at: task.scheduled_at,
            data: task.data,
            failed: task.failed,
            blocking: task.blocking,
            requested_at: task.requested_at,
            task_failure_data: task.task_failure_data,
            sequence: task.sequence,
        }
    }
}
