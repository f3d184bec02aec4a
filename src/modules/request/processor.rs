// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::modules::{
    auth::manager::AuthManager,
    error::{PushlineResult, SendRequestError},
    network::sender::matches_jwt_error_code,
    request::{
        bridge::{PendingRequest, TaskResult, TaskResultBridge},
        creator::RequestCreator,
        metadata::ApiMetadataProvider,
        model::{ApiCallRequest, SdkRequest, API_ENVELOPE_VERSION},
        types::{
            CommerceItem, EmbeddedMessage, EmbeddedSession, InAppCloseSource, InAppDeleteSource,
            InAppMessageContext, InboxSession,
        },
    },
    scheduler::{model::ScheduleContext, queue::TaskScheduler, store::TaskStore},
};
use crate::task_id;

pub type OnSuccessHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type OnFailureHandler = Arc<dyn Fn(&SendRequestError) + Send + Sync>;

/// Builds the request for the identity current at submission time. Called
/// again when a request is resubmitted after a token refresh.
pub type RequestGenerator = Arc<dyn Fn(&RequestCreator) -> PushlineResult<SdkRequest> + Send + Sync>;

/// Optional callbacks run when a submitted request settles.
#[derive(Clone, Default)]
pub struct RequestHandlers {
    pub on_success: Option<OnSuccessHandler>,
    pub on_failure: Option<OnFailureHandler>,
}

impl RequestHandlers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(handler));
        self
    }

    pub fn on_failure(
        mut self,
        handler: impl Fn(&SendRequestError) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(handler));
        self
    }

    fn apply(&self, identifier: &str, result: &TaskResult) {
        match result {
            Ok(response) => match &self.on_success {
                Some(handler) => handler(response),
                None => info!("{} succeeded, got response: {}", identifier, response),
            },
            Err(e) => match &self.on_failure {
                Some(handler) => handler(e),
                None => error!("{} failed: {}", identifier, e),
            },
        }
    }
}

struct ProcessorInner<S: TaskStore> {
    scheduler: Arc<TaskScheduler<S>>,
    bridge: TaskResultBridge,
    auth: AuthManager,
    metadata: Arc<dyn ApiMetadataProvider>,
}

/// Entry point for every API operation. Requests are persisted as blocking
/// tasks and their outcome is delivered through [`PendingRequest`].
pub struct RequestProcessor<S: TaskStore> {
    inner: Arc<ProcessorInner<S>>,
}

impl<S: TaskStore> Clone for RequestProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: TaskStore> RequestProcessor<S> {
    pub fn new(
        scheduler: Arc<TaskScheduler<S>>,
        bridge: TaskResultBridge,
        auth: AuthManager,
        metadata: Arc<dyn ApiMetadataProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                scheduler,
                bridge,
                auth,
                metadata,
            }),
        }
    }

    /// Builds, persists and tracks one request. The returned future settles
    /// once the task reaches a terminal state.
    pub async fn send_request(
        &self,
        generator: RequestGenerator,
        handlers: RequestHandlers,
        identifier: &str,
    ) -> PendingRequest {
        self.submit(generator, handlers, identifier.to_string(), true)
            .await
    }

    async fn submit(
        &self,
        generator: RequestGenerator,
        handlers: RequestHandlers,
        identifier: String,
        allow_resubmit: bool,
    ) -> PendingRequest {
        let metadata = &self.inner.metadata;
        let creator = RequestCreator::new(metadata.identity(), metadata.device_metadata());
        let request = match generator(&creator) {
            Ok(request) => request,
            Err(e) => return Self::fail_early(&handlers, &identifier, e.into()),
        };

        let envelope = ApiCallRequest {
            version: API_ENVELOPE_VERSION,
            api_key: metadata.api_key(),
            endpoint: metadata.endpoint(),
            auth_token: self.inner.auth.get_auth_token(),
            device_metadata: metadata.device_metadata(),
            request,
        };

        let task_id = task_id!();
        let receiver = self.inner.bridge.register(&task_id);
        if let Err(e) = self
            .inner
            .scheduler
            .schedule_with_id(task_id.clone(), &envelope, &ScheduleContext::blocking())
            .await
        {
            self.inner.bridge.discard(&task_id);
            return Self::fail_early(&handlers, &identifier, e.into());
        }

        let (tx, rx) = oneshot::channel();
        let processor = self.clone();
        tokio::spawn(async move {
            let result = receiver
                .await
                .unwrap_or_else(|_| Err(SendRequestError::new("request was abandoned")));
            processor.settle(generator, handlers, identifier, allow_resubmit, &result);
            let _ = tx.send(result);
        });
        PendingRequest::new(task_id, rx)
    }

    fn fail_early(
        handlers: &RequestHandlers,
        identifier: &str,
        error: SendRequestError,
    ) -> PendingRequest {
        handlers.apply(identifier, &Err(error.clone()));
        PendingRequest::failed(error)
    }

    fn settle(
        &self,
        generator: RequestGenerator,
        handlers: RequestHandlers,
        identifier: String,
        allow_resubmit: bool,
        result: &TaskResult,
    ) {
        let jwt_rejected = matches!(result, Err(e) if matches_jwt_error_code(e));
        handlers.apply(&identifier, result);

        if jwt_rejected && allow_resubmit {
            info!("{} was rejected by auth, resubmitting after the next token", identifier);
            // The runner already reported this failure to the delegate. The
            // callback stays queued until some path installs a new token.
            let auth = &self.inner.auth;
            auth.set_is_last_auth_token_valid(false);
            let processor = self.clone();
            auth.schedule_auth_token_refresh_timer(
                auth.get_next_retry_interval(),
                false,
                Some(Box::new(move |_token| {
                    tokio::spawn(processor.resubmit(generator, handlers, identifier));
                })),
            );
        }
    }

    fn resubmit(
        &self,
        generator: RequestGenerator,
        handlers: RequestHandlers,
        identifier: String,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let processor = self.clone();
        Box::pin(async move {
            let _ = processor.submit(generator, handlers, identifier, false).await;
        })
    }

    pub async fn track_event(
        &self,
        event_name: &str,
        data_fields: Option<Value>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        let event_name = event_name.to_string();
        self.send_request(
            Arc::new(move |creator| {
                creator.create_track_event_request(&event_name, data_fields.clone())
            }),
            handlers,
            "track_event",
        )
        .await
    }

    pub async fn update_cart(
        &self,
        items: Vec<CommerceItem>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_update_cart_request(&items)),
            handlers,
            "update_cart",
        )
        .await
    }

    pub async fn track_purchase(
        &self,
        total: f64,
        items: Vec<CommerceItem>,
        data_fields: Option<Value>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| {
                creator.create_track_purchase_request(total, &items, data_fields.clone())
            }),
            handlers,
            "track_purchase",
        )
        .await
    }

    pub async fn track_push_open(
        &self,
        campaign_id: i64,
        template_id: Option<i64>,
        message_id: &str,
        app_already_running: bool,
        data_fields: Option<Value>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        let message_id = message_id.to_string();
        self.send_request(
            Arc::new(move |creator| {
                creator.create_track_push_open_request(
                    campaign_id,
                    template_id,
                    &message_id,
                    app_already_running,
                    data_fields.clone(),
                )
            }),
            handlers,
            "track_push_open",
        )
        .await
    }

    pub async fn track_in_app_open(
        &self,
        context: InAppMessageContext,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_track_in_app_open_request(&context)),
            handlers,
            "track_in_app_open",
        )
        .await
    }

    pub async fn track_in_app_click(
        &self,
        context: InAppMessageContext,
        clicked_url: &str,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        let clicked_url = clicked_url.to_string();
        self.send_request(
            Arc::new(move |creator| {
                creator.create_track_in_app_click_request(&context, &clicked_url)
            }),
            handlers,
            "track_in_app_click",
        )
        .await
    }

    pub async fn track_in_app_close(
        &self,
        context: InAppMessageContext,
        source: Option<InAppCloseSource>,
        clicked_url: Option<String>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| {
                creator.create_track_in_app_close_request(&context, source, clicked_url.as_deref())
            }),
            handlers,
            "track_in_app_close",
        )
        .await
    }

    pub async fn track_in_app_delivery(
        &self,
        context: InAppMessageContext,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_track_in_app_delivery_request(&context)),
            handlers,
            "track_in_app_delivery",
        )
        .await
    }

    pub async fn in_app_consume(&self, message_id: &str, handlers: RequestHandlers) -> PendingRequest {
        let message_id = message_id.to_string();
        self.send_request(
            Arc::new(move |creator| creator.create_in_app_consume_request(&message_id)),
            handlers,
            "in_app_consume",
        )
        .await
    }

    pub async fn track_in_app_consume(
        &self,
        context: InAppMessageContext,
        source: Option<InAppDeleteSource>,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_track_in_app_consume_request(&context, source)),
            handlers,
            "track_in_app_consume",
        )
        .await
    }

    pub async fn track_inbox_session(
        &self,
        session: InboxSession,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_track_inbox_session_request(&session)),
            handlers,
            "track_inbox_session",
        )
        .await
    }

    pub async fn track_embedded_message_received(
        &self,
        message: EmbeddedMessage,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_embedded_message_received_request(&message)),
            handlers,
            "track_embedded_message_received",
        )
        .await
    }

    pub async fn track_embedded_click(
        &self,
        message: EmbeddedMessage,
        button_identifier: Option<String>,
        clicked_url: &str,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        let clicked_url = clicked_url.to_string();
        self.send_request(
            Arc::new(move |creator| {
                creator.create_embedded_message_click_request(
                    &message,
                    button_identifier.as_deref(),
                    &clicked_url,
                )
            }),
            handlers,
            "track_embedded_click",
        )
        .await
    }

    pub async fn track_embedded_dismiss(
        &self,
        message: EmbeddedMessage,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_embedded_message_dismiss_request(&message)),
            handlers,
            "track_embedded_dismiss",
        )
        .await
    }

    pub async fn track_embedded_impression(
        &self,
        message: EmbeddedMessage,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_embedded_message_impression_request(&message)),
            handlers,
            "track_embedded_impression",
        )
        .await
    }

    pub async fn track_embedded_session(
        &self,
        session: EmbeddedSession,
        handlers: RequestHandlers,
    ) -> PendingRequest {
        self.send_request(
            Arc::new(move |creator| creator.create_track_embedded_session_request(&session)),
            handlers,
            "track_embedded_session",
        )
        .await
    }

    /// Purges the task store. Futures for purged tasks never settle.
    pub async fn delete_all_tasks(&self) -> PushlineResult<usize> {
        self.inner.scheduler.delete_all_tasks().await
    }
}
