use std::{future::Future, pin::Pin, sync::Arc};

use ahash::AHashMap;

use crate::modules::{
    network::sender::SendOutcome,
    scheduler::model::{TaskMeta, TaskType},
};

pub type ProcessFuture = Pin<Box<dyn Future<Output = SendOutcome> + Send>>;

/// Executes one claimed task and classifies the result.
pub trait TaskProcessor: Send + Sync {
    fn process(&self, task: &TaskMeta) -> ProcessFuture;
}

/// Maps each task type to the processor that executes it.
#[derive(Clone, Default)]
pub struct TaskHandlers {
    handlers: AHashMap<TaskType, Arc<dyn TaskProcessor>>,
}

impl TaskHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, task_type: TaskType, processor: Arc<dyn TaskProcessor>) -> Self {
        self.handlers.insert(task_type, processor);
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskProcessor>> {
        self.handlers.get(&task_type).cloned()
    }
}
