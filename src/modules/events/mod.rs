// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::modules::error::SendRequestError;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Typed notifications shared between the scheduler, the runner, the auth
/// manager and the result bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    TaskScheduled {
        task_id: String,
    },
    TaskFinishedWithSuccess {
        task_id: String,
        response: Value,
    },
    TaskFinishedWithRetry {
        task_id: String,
        error: SendRequestError,
    },
    TaskFinishedWithNoRetry {
        task_id: String,
        error: SendRequestError,
    },
    AuthTokenRefreshed,
    ConnectivityChanged {
        online: bool,
    },
}

impl SdkEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SdkEvent::TaskScheduled { task_id }
            | SdkEvent::TaskFinishedWithSuccess { task_id, .. }
            | SdkEvent::TaskFinishedWithRetry { task_id, .. }
            | SdkEvent::TaskFinishedWithNoRetry { task_id, .. } => Some(task_id),
            SdkEvent::AuthTokenRefreshed | SdkEvent::ConnectivityChanged { .. } => None,
        }
    }
}

/// Many listeners, fire-and-forget. A slow listener lags and loses the
/// oldest events instead of slowing publishers down.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SdkEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: SdkEvent) {
        if self.sender.send(event).is_err() {
            trace!("event published with no active listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
