// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use tracing::debug;

use crate::modules::{
    auth::manager::AuthManager,
    error::PushlineResult,
    network::{
        sender::{RequestSender, SendOutcome},
        transport::HttpRequest,
    },
    request::model::ApiCallRequest,
    scheduler::{
        handlers::{ProcessFuture, TaskProcessor},
        model::TaskMeta,
    },
};
use crate::utc_now;

/// Sends the request stored in an `apiCall` task.
pub struct ApiCallTaskProcessor {
    sender: RequestSender,
    auth: AuthManager,
}

impl ApiCallTaskProcessor {
    pub fn new(sender: RequestSender, auth: AuthManager) -> Self {
        Self { sender, auth }
    }

    fn prepare(&self, task: &TaskMeta) -> PushlineResult<HttpRequest> {
        let stored = ApiCallRequest::decode(&task.data)?;
        let mut request = stored.with_auth_token(self.auth.get_auth_token());
        request.request = request.request.adding_created_at(task.requested_at);
        request.to_http_request(utc_now!())
    }
}

impl TaskProcessor for ApiCallTaskProcessor {
    fn process(&self, task: &TaskMeta) -> ProcessFuture {
        let prepared = self.prepare(task);
        let sender = self.sender.clone();
        let task_id = task.id.clone();
        Box::pin(async move {
            match prepared {
                Ok(request) => sender.send(request).await,
                Err(e) => {
                    debug!("task {} could not be turned into a request: {}", task_id, e);
                    SendOutcome::Permanent(e.into())
                }
            }
        })
    }
}
