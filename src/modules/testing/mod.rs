//! Scripted collaborators shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde_json::{json, Value};

use crate::modules::{
    auth::{
        failure::AuthFailure,
        manager::{AuthDelegate, AuthTokenFuture},
    },
    error::{code::ErrorCode, PushlineResult},
    network::transport::{HttpRequest, HttpResponse, NetworkTransport, TransportFuture},
    request::model::DeviceMetadata,
    scheduler::retry::RetryPolicy,
    settings::config::SdkConfig,
};
use crate::{raise_error, utc_now};

pub fn test_config() -> SdkConfig {
    SdkConfig {
        api_key: "test-api-key".into(),
        endpoint: "https://api.test.local/api/".into(),
        task_retry_policy: RetryPolicy::linear(3, Duration::from_millis(20)),
        auth_retry_policy: RetryPolicy::linear(3, Duration::from_millis(20)),
        expiring_auth_token_refresh_period: Duration::from_secs(60),
        event_threshold_limit: 10,
        runner_interval: Duration::from_millis(50),
        retain_failed_tasks: false,
        connectivity_poll_interval: Duration::from_millis(20),
    }
}

pub fn test_device() -> DeviceMetadata {
    DeviceMetadata {
        device_id: "device-1".into(),
        platform: "Linux".into(),
        app_package_name: "io.pushline.test".into(),
    }
}

/// A JWT expiring `secs` from now.
pub fn jwt_expiring_in(secs: i64) -> String {
    crate::modules::auth::jwt::encode_for_test(utc_now!() / 1000 + secs)
}

pub fn ok_response(body: Value) -> PushlineResult<HttpResponse> {
    Ok(HttpResponse::new(200, body.to_string()))
}

pub fn error_response(status: u16, code: &str, msg: &str) -> PushlineResult<HttpResponse> {
    Ok(HttpResponse::new(
        status,
        json!({"code": code, "msg": msg}).to_string(),
    ))
}

pub fn jwt_rejected() -> PushlineResult<HttpResponse> {
    error_response(401, "InvalidJwtPayload", "JWT token is expired")
}

pub fn network_down() -> PushlineResult<HttpResponse> {
    Err(raise_error!(
        "connection refused".into(),
        ErrorCode::NetworkError
    ))
}

/// Replays scripted responses in order, then the fallback. Every request
/// is recorded.
pub struct MockTransport {
    script: Mutex<VecDeque<PushlineResult<HttpResponse>>>,
    fallback: Mutex<Box<dyn Fn() -> PushlineResult<HttpResponse> + Send>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Box::new(|| ok_response(json!({"msg": "ok"})))),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn push(&self, response: PushlineResult<HttpResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn set_fallback(&self, fallback: impl Fn() -> PushlineResult<HttpResponse> + Send + 'static) {
        *self.fallback.lock().unwrap() = Box::new(fallback);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self) -> PushlineResult<HttpResponse> {
        match self.script.lock().unwrap().pop_front() {
            Some(response) => response,
            None => (self.fallback.lock().unwrap())(),
        }
    }
}

impl NetworkTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture {
        self.requests.lock().unwrap().push(request);
        let response = self.next_response();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

/// Hands out queued tokens, then the default one.
pub struct MockAuthDelegate {
    tokens: Mutex<VecDeque<Option<String>>>,
    default_token: Mutex<Option<String>>,
    delay: Duration,
    requests: AtomicUsize,
    failures: Mutex<Vec<AuthFailure>>,
}

impl MockAuthDelegate {
    pub fn returning(token: Option<String>) -> Arc<Self> {
        Self::with_delay(token, Duration::ZERO)
    }

    pub fn with_delay(token: Option<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(VecDeque::new()),
            default_token: Mutex::new(token),
            delay,
            requests: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        })
    }

    pub fn push_token(&self, token: Option<String>) {
        self.tokens.lock().unwrap().push_back(token);
    }

    pub fn set_default_token(&self, token: Option<String>) {
        *self.default_token.lock().unwrap() = token;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> Vec<AuthFailure> {
        self.failures.lock().unwrap().clone()
    }
}

impl AuthDelegate for MockAuthDelegate {
    fn on_auth_token_requested(&self) -> AuthTokenFuture {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let token = match self.tokens.lock().unwrap().pop_front() {
            Some(token) => token,
            None => self.default_token.lock().unwrap().clone(),
        };
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            token
        })
    }

    fn on_auth_failure(&self, failure: AuthFailure) {
        self.failures.lock().unwrap().push(failure);
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns the final evaluation.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
