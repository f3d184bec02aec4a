// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, Mutex};

use native_db::Database;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::modules::{
    auth::{
        manager::{AuthDelegate, AuthManager},
        token::AuthTokenStore,
    },
    common::signal::SignalManager,
    error::PushlineResult,
    events::EventBus,
    network::{
        connectivity::{ConnectivityChecker, ConnectivityMonitor},
        sender::RequestSender,
        transport::NetworkTransport,
    },
    request::{
        bridge::{PendingRequest, TaskResultBridge},
        metadata::{ApiMetadataProvider, StaticMetadataProvider},
        model::{DeviceMetadata, Identity},
        processor::{RequestHandlers, RequestProcessor},
    },
    scheduler::{
        handlers::TaskHandlers,
        health::HealthMonitor,
        model::TaskType,
        nativedb::meta::NativeDbTaskStore,
        periodic::TaskHandle,
        processor::ApiCallTaskProcessor,
        queue::TaskScheduler,
        runner::TaskRunner,
        store::TaskStore,
    },
    settings::config::SdkConfig,
    unknown::UnknownUserEventBuffer,
};
use crate::utc_now;

#[cfg(test)]
mod tests;

/// Host-supplied implementations the core depends on.
pub struct SdkCollaborators {
    pub transport: Arc<dyn NetworkTransport>,
    pub auth_delegate: Option<Arc<dyn AuthDelegate>>,
    /// Without a checker the runner assumes it is always online.
    pub connectivity: Option<Arc<dyn ConnectivityChecker>>,
    pub device_metadata: DeviceMetadata,
}

/// One SDK instance. Owns every component and wires them together.
pub struct SdkContext {
    config: SdkConfig,
    start_at: i64,
    bus: EventBus,
    signal: SignalManager,
    health: Arc<HealthMonitor>,
    scheduler: Arc<TaskScheduler<NativeDbTaskStore>>,
    runner: TaskRunner<NativeDbTaskStore>,
    auth: AuthManager,
    bridge: TaskResultBridge,
    processor: RequestProcessor<NativeDbTaskStore>,
    metadata: Arc<dyn ApiMetadataProvider>,
    buffer: UnknownUserEventBuffer,
    connectivity: Option<Arc<dyn ConnectivityChecker>>,
    bridge_handle: Mutex<Option<JoinHandle<()>>>,
    connectivity_handle: Mutex<Option<TaskHandle>>,
}

impl SdkContext {
    /// Builds every component over `database`, releases tasks left claimed by
    /// a crash and restores the persisted auth token. Nothing runs until
    /// [`Self::start`].
    pub async fn initialize(
        config: SdkConfig,
        database: Arc<Database<'static>>,
        collaborators: SdkCollaborators,
    ) -> PushlineResult<Self> {
        config.validate()?;

        let store = Arc::new(NativeDbTaskStore::init(database.clone()));
        let released = store.restore().await?;
        if released > 0 {
            warn!("{} task(s) were interrupted by a previous shutdown", released);
        }

        let bus = EventBus::new();
        let health = Arc::new(HealthMonitor::new());
        let scheduler =
            Arc::new(TaskScheduler::new(store.clone(), bus.clone(), health.clone()).await?);

        let metadata: Arc<dyn ApiMetadataProvider> = Arc::new(StaticMetadataProvider::new(
            &config,
            collaborators.device_metadata,
        ));
        let auth = AuthManager::new(
            collaborators.auth_delegate,
            config.auth_retry_policy.clone(),
            config.expiring_auth_token_refresh_period,
            AuthTokenStore::new(database.clone()),
            metadata.clone(),
            bus.clone(),
        );
        auth.restore().await?;

        let handlers = TaskHandlers::new().register(
            TaskType::ApiCall,
            Arc::new(ApiCallTaskProcessor::new(
                RequestSender::new(collaborators.transport),
                auth.clone(),
            )),
        );
        let runner = TaskRunner::new(
            store,
            handlers,
            auth.clone(),
            bus.clone(),
            health.clone(),
            &config,
        );
        let bridge = TaskResultBridge::new();
        let processor = RequestProcessor::new(
            scheduler.clone(),
            bridge.clone(),
            auth.clone(),
            metadata.clone(),
        );
        let buffer = UnknownUserEventBuffer::new(database, config.event_threshold_limit);

        Ok(Self {
            config,
            start_at: utc_now!(),
            bus,
            signal: SignalManager::new(),
            health,
            scheduler,
            runner,
            auth,
            bridge,
            processor,
            metadata,
            buffer,
            connectivity: collaborators.connectivity,
            bridge_handle: Mutex::new(None),
            connectivity_handle: Mutex::new(None),
        })
    }

    /// Starts the result bridge, the task runner and the connectivity
    /// monitor. The bridge subscribes first so no completion is missed.
    pub fn start(&self) {
        {
            let mut handle = lock(&self.bridge_handle);
            if handle.is_none() {
                *handle = Some(self.bridge.start(&self.bus, self.signal.subscribe()));
            }
        }
        self.runner.start(self.signal.subscribe());

        if let Some(checker) = &self.connectivity {
            let mut handle = lock(&self.connectivity_handle);
            if handle.as_ref().is_none_or(|h| h.is_finished()) {
                *handle = Some(ConnectivityMonitor::start(
                    checker.clone(),
                    self.bus.clone(),
                    self.config.connectivity_poll_interval,
                    self.signal.subscribe(),
                ));
            }
        }
        info!("pushline context started");
    }

    /// Lets the task in flight finish, then stops every background loop.
    pub async fn shutdown(&self) {
        self.runner.stop().await;
        self.signal.shutdown();

        let bridge = lock(&self.bridge_handle).take();
        let connectivity = lock(&self.connectivity_handle).take();
        futures::future::join(
            async move {
                if let Some(handle) = bridge {
                    if let Err(e) = handle.await {
                        error!("result bridge ended abnormally: {:?}", e);
                    }
                }
            },
            async move {
                if let Some(handle) = connectivity {
                    handle.cancel().await;
                }
            },
        )
        .await;
        info!("pushline context stopped");
    }

    /// Switches to `identity`. A different previously known user is logged
    /// out first. Events buffered while anonymous are replayed for the new
    /// identity. Returns the number replayed.
    pub async fn set_identity(&self, identity: Identity) -> PushlineResult<usize> {
        let previous = self.metadata.identity();
        if previous.is_known() && previous != identity {
            info!("identity changed, logging out the previous user");
            self.processor.delete_all_tasks().await?;
            self.auth.logout_user().await?;
        }
        self.metadata.set_identity(identity.clone());
        if !identity.is_known() {
            return Ok(0);
        }

        if self.auth.has_delegate() && self.auth.get_auth_token().is_none() {
            self.auth.request_new_auth_token(false, None, true);
        }
        self.flush_buffered_events().await
    }

    async fn flush_buffered_events(&self) -> PushlineResult<usize> {
        let events = self.buffer.list().await?;
        let count = events.len();
        for event in events {
            let created_at = event.created_at;
            let event_name = event.event_name.clone();
            let data_fields = event.data_fields();
            let pending = self
                .processor
                .send_request(
                    Arc::new(move |creator| {
                        creator
                            .create_track_event_request(&event_name, data_fields.clone())
                            .map(|request| request.adding_created_at(created_at))
                    }),
                    RequestHandlers::none(),
                    "track_event",
                )
                .await;
            if pending.task_id().is_none() {
                // Not persisted; leave it buffered for the next identity change.
                continue;
            }
            self.buffer.remove(event.id).await?;
        }
        if count > 0 {
            info!("replayed {} buffered event(s)", count);
        }
        Ok(count)
    }

    /// Tracks an event, buffering it while no user is identified. `None`
    /// means the event was buffered.
    pub async fn track_event(
        &self,
        event_name: &str,
        data_fields: Option<Value>,
        handlers: RequestHandlers,
    ) -> PushlineResult<Option<PendingRequest>> {
        if !self.metadata.identity().is_known() {
            self.buffer.push(event_name, data_fields).await?;
            return Ok(None);
        }
        Ok(Some(
            self.processor
                .track_event(event_name, data_fields, handlers)
                .await,
        ))
    }

    /// Abandons all queued work and forgets the user and their token.
    pub async fn logout(&self) -> PushlineResult<()> {
        let deleted = self.processor.delete_all_tasks().await?;
        self.auth.logout_user().await?;
        self.metadata.set_identity(Identity::default());
        self.buffer.clear().await?;
        info!("logged out, {} queued task(s) discarded", deleted);
        Ok(())
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn uptime_ms(&self) -> i64 {
        utc_now!() - self.start_at
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler<NativeDbTaskStore>> {
        &self.scheduler
    }

    pub fn runner(&self) -> &TaskRunner<NativeDbTaskStore> {
        &self.runner
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn bridge(&self) -> &TaskResultBridge {
        &self.bridge
    }

    pub fn processor(&self) -> &RequestProcessor<NativeDbTaskStore> {
        &self.processor
    }

    pub fn metadata(&self) -> &Arc<dyn ApiMetadataProvider> {
        &self.metadata
    }

    pub fn buffer(&self) -> &UnknownUserEventBuffer {
        &self.buffer
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
