// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::{
    sync::{broadcast, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::modules::{
    auth::{failure::AuthFailureReason, manager::AuthManager},
    error::{code::ErrorCode, PushlineError, SendRequestError},
    events::{EventBus, SdkEvent},
    metrics::{
        AUTH, FAILURE, PUSHLINE_TASK_EXECUTION_DURATION, PUSHLINE_TASK_OUTCOME_TOTAL, RETRY,
        SUCCESS,
    },
    network::sender::SendOutcome,
    scheduler::{
        handlers::TaskHandlers, health::HealthMonitor, model::TaskMeta, retry::RetryPolicy,
        store::TaskStore,
    },
    settings::config::SdkConfig,
};
use crate::utc_now;

struct RunnerInner<S: TaskStore> {
    store: Arc<S>,
    handlers: TaskHandlers,
    auth: AuthManager,
    bus: EventBus,
    health: Arc<HealthMonitor>,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
    retain_failed_tasks: bool,
    wake: Arc<Notify>,
    stopped: AtomicBool,
    paused: AtomicBool,
    offline: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Single background loop that claims due tasks one at a time and executes
/// them.
pub struct TaskRunner<S: TaskStore> {
    inner: Arc<RunnerInner<S>>,
}

impl<S: TaskStore> Clone for TaskRunner<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: TaskStore> TaskRunner<S> {
    pub fn new(
        store: Arc<S>,
        handlers: TaskHandlers,
        auth: AuthManager,
        bus: EventBus,
        health: Arc<HealthMonitor>,
        config: &SdkConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                store,
                handlers,
                auth,
                bus,
                health,
                retry_policy: config.task_retry_policy.clone(),
                poll_interval: config.runner_interval,
                retain_failed_tasks: config.retain_failed_tasks,
                wake: Arc::new(Notify::new()),
                stopped: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                offline: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Spawns the loop. Calling it while the loop is alive does nothing.
    pub fn start(&self, shutdown: broadcast::Receiver<()>) {
        let mut handle = self
            .inner
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("task runner already running");
            return;
        }
        self.inner.stopped.store(false, Ordering::SeqCst);
        // Subscribe before spawning so no event published after start() is missed.
        let events = self.inner.bus.subscribe();
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(async move {
            inner.run(events, shutdown).await;
        }));
        info!("task runner started");
    }

    /// Lets the task in flight finish, then ends the loop.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
        let handle = self
            .inner
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("task runner ended abnormally: {:?}", e);
            }
        }
        info!("task runner stopped");
    }

    /// Host-driven pause, e.g. while the app is in the background.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.wake_up();
    }

    pub fn wake_up(&self) {
        self.inner.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl<S: TaskStore> RunnerInner<S> {
    async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SdkEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            let wait = match self.process_tasks().await {
                Some(until_due) => until_due.min(self.poll_interval),
                None => self.poll_interval,
            };

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = self.wait_for_relevant_event(&mut events) => {}
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    info!("task runner received shutdown signal");
                    break;
                }
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn wait_for_relevant_event(&self, events: &mut broadcast::Receiver<SdkEvent>) {
        loop {
            match events.recv().await {
                Ok(SdkEvent::ConnectivityChanged { online }) => {
                    self.offline.store(!online, Ordering::SeqCst);
                    if online {
                        info!("back online, resuming task runner");
                        return;
                    }
                    info!("offline, task runner paused");
                }
                Ok(SdkEvent::TaskScheduled { .. }) | Ok(SdkEvent::AuthTokenRefreshed) => return,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("task runner lagged {} event(s)", skipped);
                    return;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn can_claim(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst)
            || self.paused.load(Ordering::SeqCst)
            || self.offline.load(Ordering::SeqCst)
        {
            return false;
        }
        if !self.health.can_process() {
            debug!("health monitor halted processing");
            return false;
        }
        if self.auth.is_failure_refresh_pending() {
            debug!("auth token refresh pending, deferring claims");
            return false;
        }
        true
    }

    /// Runs due tasks until none is left. Returns the delay until the next
    /// task becomes due, if any.
    async fn process_tasks(&self) -> Option<Duration> {
        loop {
            if !self.can_claim() {
                return None;
            }
            match self.store.claim_next_task(utc_now!()).await {
                Ok(Some(task)) => self.execute(task).await,
                Ok(None) => break,
                Err(e) => {
                    self.health.on_runner_error("claim", &e);
                    return None;
                }
            }
        }

        match self.store.next_wake_at().await {
            Ok(next) => next.map(|at| Duration::from_millis((at - utc_now!()).max(0) as u64)),
            Err(e) => {
                self.health.on_runner_error("next_wake_at", &e);
                None
            }
        }
    }

    async fn execute(&self, task: TaskMeta) {
        info!(
            "executing task {} ('{}'), attempt {}",
            task.id,
            task.name,
            task.attempts + 1
        );
        let Some(processor) = self.handlers.get(task.task_type) else {
            let error =
                SendRequestError::new(format!("no processor for task type '{}'", task.task_type));
            self.finish_with_failure(task, error).await;
            return;
        };

        let start = Instant::now();
        let outcome = processor.process(&task).await;
        PUSHLINE_TASK_EXECUTION_DURATION.observe(start.elapsed().as_secs_f64());

        match outcome {
            SendOutcome::Success(response) => self.finish_with_success(task, response).await,
            SendOutcome::Transient(error) => self.retry_later(task, error).await,
            SendOutcome::Auth(error) => self.wait_for_new_token(task, error).await,
            SendOutcome::Permanent(error) => self.finish_with_failure(task, error).await,
        }
    }

    async fn finish_with_success(&self, task: TaskMeta, response: Value) {
        if self.auth.get_auth_token().is_some() {
            self.auth.reset_retry_count();
            self.auth.set_is_last_auth_token_valid(true);
        }
        if let Err(e) = self.store.delete_task(&task.id).await {
            self.on_store_error(&task.id, "delete", &e);
        }
        PUSHLINE_TASK_OUTCOME_TOTAL.with_label_values(&[SUCCESS]).inc();
        info!("task {} succeeded", task.id);
        self.bus.publish(SdkEvent::TaskFinishedWithSuccess {
            task_id: task.id,
            response,
        });
    }

    async fn retry_later(&self, task: TaskMeta, error: SendRequestError) {
        let attempts = task.attempts + 1;
        if self.retry_policy.is_exhausted(attempts) {
            warn!("task {} exhausted {} attempt(s)", task.id, attempts);
            self.finish_with_failure(task, error).await;
            return;
        }

        let scheduled_at = self
            .retry_policy
            .next_scheduled_at(task.scheduled_at, utc_now!(), attempts);
        if let Err(e) = self
            .store
            .reschedule_task(&task.id, attempts, scheduled_at)
            .await
        {
            self.on_store_error(&task.id, "reschedule", &e);
            return;
        }
        PUSHLINE_TASK_OUTCOME_TOTAL.with_label_values(&[RETRY]).inc();
        warn!(
            "task {} failed ({}), retry {} at {}",
            task.id, error, attempts, scheduled_at
        );
        self.bus.publish(SdkEvent::TaskFinishedWithRetry {
            task_id: task.id,
            error,
        });
    }

    /// A rejected token does not consume an attempt. The task waits for the
    /// auth manager to obtain a new token.
    async fn wait_for_new_token(&self, task: TaskMeta, error: SendRequestError) {
        self.auth.handle_auth_failure(
            self.auth.get_auth_token(),
            AuthFailureReason::from_message(error.reason.as_deref()),
        );
        self.auth.set_is_last_auth_token_valid(false);

        if !self.auth.has_delegate() {
            warn!("task {} rejected by auth and no auth delegate is set", task.id);
            self.finish_with_failure(task, error).await;
            return;
        }
        if self.auth.retry_count() >= self.auth.retry_policy().max_retry {
            warn!("task {} rejected by auth and auth retries are exhausted", task.id);
            self.finish_with_failure(task, error).await;
            return;
        }

        let interval = self.auth.get_next_retry_interval();
        let scheduled_at = task
            .scheduled_at
            .max(utc_now!() + interval.as_millis() as i64);
        if let Err(e) = self
            .store
            .reschedule_task(&task.id, task.attempts, scheduled_at)
            .await
        {
            self.on_store_error(&task.id, "reschedule", &e);
            return;
        }
        PUSHLINE_TASK_OUTCOME_TOTAL.with_label_values(&[AUTH]).inc();
        info!(
            "task {} waiting for a new auth token, refresh in {:?}",
            task.id, interval
        );

        let wake = self.wake.clone();
        self.auth.schedule_auth_token_refresh_timer(
            interval,
            false,
            Some(Box::new(move |_token| wake.notify_one())),
        );
    }

    async fn finish_with_failure(&self, task: TaskMeta, error: SendRequestError) {
        let failure_data = serde_json::to_vec(&error).ok();
        match self.store.mark_failed(&task.id, failure_data).await {
            Ok(()) if !self.retain_failed_tasks => {
                if let Err(e) = self.store.delete_task(&task.id).await {
                    self.on_store_error(&task.id, "delete", &e);
                }
            }
            Ok(()) => {}
            Err(e) if is_purged(&e) => {
                debug!("task {} was deleted while running, dropping its failure", task.id);
                return;
            }
            Err(e) => self.on_store_error(&task.id, "mark_failed", &e),
        }
        PUSHLINE_TASK_OUTCOME_TOTAL.with_label_values(&[FAILURE]).inc();
        error!("task {} failed with no retry: {}", task.id, error);
        self.bus.publish(SdkEvent::TaskFinishedWithNoRetry {
            task_id: task.id,
            error,
        });
    }

    /// A task purged by `delete_all_tasks` while it ran is not a store
    /// failure and must not halt the runner.
    fn on_store_error(&self, task_id: &str, operation: &str, error: &PushlineError) {
        if is_purged(error) {
            debug!("task {} was deleted while running, skipping '{}'", task_id, operation);
            return;
        }
        self.health.on_runner_error(operation, error);
    }
}

fn is_purged(error: &PushlineError) -> bool {
    error.code() == ErrorCode::ResourceNotFound
}
