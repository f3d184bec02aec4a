use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::modules::{
    error::SendRequestError,
    events::{EventBus, SdkEvent},
};

pub type TaskResult = Result<Value, SendRequestError>;

/// Routes task completions published on the event bus to the callers
/// waiting on them.
#[derive(Clone, Default)]
pub struct TaskResultBridge {
    pending: Arc<DashMap<String, oneshot::Sender<TaskResult>>>,
}

impl TaskResultBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts listening. The subscription is taken before this returns.
    pub fn start(&self, bus: &EventBus, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        let bridge = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => bridge.on_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("result bridge lagged, {} completion event(s) lost", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => {
                        info!("result bridge stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn register(&self, task_id: &str) -> oneshot::Receiver<TaskResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(task_id.to_string(), tx);
        rx
    }

    /// Forgets a registration whose task was never stored.
    pub fn discard(&self, task_id: &str) {
        self.pending.remove(task_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn on_event(&self, event: SdkEvent) {
        match event {
            SdkEvent::TaskFinishedWithSuccess { task_id, response } => {
                self.resolve(&task_id, Ok(response))
            }
            SdkEvent::TaskFinishedWithNoRetry { task_id, error } => {
                self.resolve(&task_id, Err(error))
            }
            SdkEvent::TaskFinishedWithRetry { task_id, error } => {
                debug!("task {} will be retried: {}", task_id, error);
            }
            _ => {}
        }
    }

    fn resolve(&self, task_id: &str, result: TaskResult) {
        match self.pending.remove(task_id) {
            Some((_, sender)) => {
                if sender.send(result).is_err() {
                    debug!("caller for task {} is gone", task_id);
                }
            }
            None => warn!("no pending request for task {}, dropping completion", task_id),
        }
    }
}

/// The caller's handle on a submitted request. Resolves when the task
/// succeeds or fails for good.
pub struct PendingRequest {
    task_id: Option<String>,
    receiver: oneshot::Receiver<TaskResult>,
}

impl PendingRequest {
    pub(crate) fn new(task_id: String, receiver: oneshot::Receiver<TaskResult>) -> Self {
        Self {
            task_id: Some(task_id),
            receiver,
        }
    }

    /// A request that failed before a task was stored.
    pub(crate) fn failed(error: SendRequestError) -> Self {
        let (tx, receiver) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            task_id: None,
            receiver,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }
}

impl Future for PendingRequest {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| Err(SendRequestError::new("request was abandoned")))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::broadcast;

    use super::TaskResultBridge;
    use crate::modules::{
        error::SendRequestError,
        events::{EventBus, SdkEvent},
    };

    #[tokio::test]
    async fn resolves_and_forgets_registered_tasks() {
        let bus = EventBus::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let bridge = TaskResultBridge::new();
        bridge.start(&bus, shutdown_rx);

        let ok = bridge.register("task-ok");
        let failed = bridge.register("task-failed");
        assert_eq!(bridge.pending_count(), 2);

        bus.publish(SdkEvent::TaskFinishedWithSuccess {
            task_id: "task-ok".into(),
            response: json!({"msg": "ok"}),
        });
        bus.publish(SdkEvent::TaskFinishedWithNoRetry {
            task_id: "task-failed".into(),
            error: SendRequestError::with_status("bad", 400),
        });

        assert_eq!(ok.await.unwrap(), Ok(json!({"msg": "ok"})));
        assert_eq!(
            failed.await.unwrap().unwrap_err().http_status_code,
            Some(400)
        );
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn retries_and_unknown_ids_leave_registrations_alone() {
        let bus = EventBus::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let bridge = TaskResultBridge::new();
        bridge.start(&bus, shutdown_rx);

        let mut pending = bridge.register("task-1");
        bus.publish(SdkEvent::TaskFinishedWithRetry {
            task_id: "task-1".into(),
            error: SendRequestError::with_status("busy", 503),
        });
        bus.publish(SdkEvent::TaskFinishedWithSuccess {
            task_id: "task-unknown".into(),
            response: json!({}),
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pending.try_recv().is_err());
        assert_eq!(bridge.pending_count(), 1);
    }
}
