use crate::modules::error::PushlineResult;
use std::{future::Future, time::Duration};
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

pub struct PeriodicTask {
    name: String,
}

pub struct TaskHandle {
    cancel_sender: Option<oneshot::Sender<()>>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    pub async fn cancel(self) {
        if let Some(sender) = self.cancel_sender {
            let _ = sender.send(());
        }
        let _ = self.join_handle.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

impl PeriodicTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    /// Runs `task` every `interval` until cancelled through the returned
    /// handle or until `shutdown` fires.
    pub fn start<F, T>(
        self,
        task: T,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
        run_immediately: bool,
    ) -> TaskHandle
    where
        T: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = PushlineResult<()>> + Send + 'static,
    {
        info!("Task '{}' started", &self.name);

        let (cancel_sender, mut cancel_receiver) = oneshot::channel::<()>();
        let name = self.name;

        let join_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            if !run_immediately {
                interval.tick().await; // discard first immediate tick
            }

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = task().await {
                            warn!("Task '{}' failed: {:?}", name, e);
                        }
                    }
                    _ = &mut cancel_receiver => {
                        info!("Task '{}' received cancellation signal", name);
                        break;
                    }
                    _ = shutdown.recv() => {
                        info!("Task '{}' shutting down due to shutdown signal", name);
                        break;
                    }
                }
            }

            info!("Task '{}' stopped", name);
        });

        TaskHandle {
            cancel_sender: Some(cancel_sender),
            join_handle,
        }
    }
}
