// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::modules::{
    auth::{
        failure::{AuthFailure, AuthFailureReason},
        jwt::decode_expiration,
        token::AuthTokenStore,
    },
    error::PushlineResult,
    events::{EventBus, SdkEvent},
    metrics::{FAILURE, PUSHLINE_AUTH_REFRESH_TOTAL, SUCCESS},
    request::metadata::ApiMetadataProvider,
    scheduler::retry::{RetryBackoff, RetryPolicy},
};
use crate::utc_now;

const EXPONENTIAL_FACTOR: f64 = 2.0;

pub type AuthTokenFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Invoked with the token once a refresh completes.
pub type AuthTokenCallback = Box<dyn FnOnce(Option<String>) + Send>;

/// Implemented by the host application.
pub trait AuthDelegate: Send + Sync {
    /// Produces a fresh token. `None` means the host could not issue one.
    fn on_auth_token_requested(&self) -> AuthTokenFuture;

    fn on_auth_failure(&self, failure: AuthFailure);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TimerKind {
    /// Armed ahead of a known expiry.
    Expiration,
    /// Armed after a rejected or missing token.
    Failure,
}

struct RefreshTimer {
    kind: TimerKind,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct AuthState {
    auth_token: Option<String>,
    pending_auth: bool,
    has_failed_prior_auth: bool,
    retry_count: u32,
    is_last_auth_token_valid: bool,
    pause_auth_retry: bool,
    timer: Option<RefreshTimer>,
    timer_generation: u64,
    callbacks: Vec<AuthTokenCallback>,
}

struct AuthInner {
    delegate: Option<Arc<dyn AuthDelegate>>,
    retry_policy: RetryPolicy,
    expiration_refresh_period: Duration,
    token_store: AuthTokenStore,
    metadata: Arc<dyn ApiMetadataProvider>,
    bus: EventBus,
    state: Mutex<AuthState>,
}

/// Owns the bearer token. All refreshes funnel through here so that at most
/// one delegate call is in flight at any time.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<AuthInner>,
}

impl AuthManager {
    pub fn new(
        delegate: Option<Arc<dyn AuthDelegate>>,
        retry_policy: RetryPolicy,
        expiration_refresh_period: Duration,
        token_store: AuthTokenStore,
        metadata: Arc<dyn ApiMetadataProvider>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                delegate,
                retry_policy,
                expiration_refresh_period,
                token_store,
                metadata,
                bus,
                state: Mutex::new(AuthState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads the persisted token and arms its expiry refresh.
    pub async fn restore(&self) -> PushlineResult<()> {
        let token = self.inner.token_store.load().await?;
        self.lock().auth_token = token.clone();
        if self.inner.delegate.is_none() || !self.inner.metadata.identity().is_known() {
            return Ok(());
        }
        match token {
            Some(token) => {
                info!("restored persisted auth token");
                self.queue_expiration_refresh(&token);
            }
            None => self.request_new_auth_token(false, None, true),
        }
        Ok(())
    }

    pub fn get_auth_token(&self) -> Option<String> {
        self.lock().auth_token.clone()
    }

    pub fn has_delegate(&self) -> bool {
        self.inner.delegate.is_some()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub fn reset_retry_count(&self) {
        self.lock().retry_count = 0;
    }

    pub fn reset_failed_auth_count(&self) {
        self.lock().has_failed_prior_auth = false;
    }

    pub fn set_is_last_auth_token_valid(&self, is_valid: bool) {
        self.lock().is_last_auth_token_valid = is_valid;
    }

    pub fn pause_auth_retries(&self, pause: bool) {
        let mut state = self.lock();
        state.pause_auth_retry = pause;
        state.retry_count = 0;
    }

    /// True while a refresh caused by a rejected token has not produced a new
    /// token yet. An armed expiry refresh does not count.
    pub fn is_failure_refresh_pending(&self) -> bool {
        let state = self.lock();
        state.pending_auth
            || state
                .timer
                .as_ref()
                .is_some_and(|t| t.kind == TimerKind::Failure)
    }

    pub fn pending_callback_count(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn get_next_retry_interval(&self) -> Duration {
        let retry_count = self.lock().retry_count;
        let interval = self.inner.retry_policy.retry_interval;
        match self.inner.retry_policy.retry_backoff {
            RetryBackoff::Linear => interval,
            RetryBackoff::Exponential => {
                let exponent = (retry_count as i32 - 1).min(32);
                interval.mul_f64(EXPONENTIAL_FACTOR.powi(exponent))
            }
        }
    }

    /// Asks the delegate for a token. Callers arriving while a request is in
    /// flight only attach `on_success`.
    pub fn request_new_auth_token(
        &self,
        has_failed_prior_auth: bool,
        on_success: Option<AuthTokenCallback>,
        should_ignore_retry_policy: bool,
    ) {
        let mut state = self.lock();
        self.request_locked(
            &mut state,
            has_failed_prior_auth,
            on_success,
            should_ignore_retry_policy,
        );
    }

    fn request_locked(
        &self,
        state: &mut AuthState,
        has_failed_prior_auth: bool,
        on_success: Option<AuthTokenCallback>,
        should_ignore_retry_policy: bool,
    ) {
        if state.pending_auth {
            if let Some(callback) = on_success {
                state.callbacks.push(callback);
            }
            debug!("auth token request already in flight, attaching");
            return;
        }

        let paused = !should_ignore_retry_policy
            && (state.pause_auth_retry || state.retry_count >= self.inner.retry_policy.max_retry);
        if paused || (state.has_failed_prior_auth && has_failed_prior_auth) {
            debug!(
                "skipping auth token request, retry_count={}, paused={}",
                state.retry_count, state.pause_auth_retry
            );
            return;
        }

        let Some(delegate) = self.inner.delegate.clone() else {
            debug!("no auth delegate configured, skipping auth token request");
            return;
        };

        state.has_failed_prior_auth = has_failed_prior_auth;
        state.pending_auth = true;
        if let Some(callback) = on_success {
            state.callbacks.push(callback);
        }

        let manager = self.clone();
        if state.is_last_auth_token_valid && !should_ignore_retry_policy {
            let token = state.auth_token.clone();
            tokio::spawn(async move { manager.on_auth_token_received(token).await });
            return;
        }

        tokio::spawn(async move {
            let token = delegate.on_auth_token_requested().await;
            {
                let mut state = manager.lock();
                state.pending_auth = false;
                state.retry_count += 1;
            }
            let result = if token.is_some() { SUCCESS } else { FAILURE };
            PUSHLINE_AUTH_REFRESH_TOTAL.with_label_values(&[result]).inc();
            manager.on_auth_token_received(token).await;
        });
    }

    /// Requests a token and waits for it.
    pub async fn refresh_auth_token(&self) -> Option<String> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.request_new_auth_token(
            false,
            Some(Box::new(move |token| {
                let _ = tx.send(token);
            })),
            true,
        );
        rx.await.ok().flatten()
    }

    /// Installs a token supplied directly by the host.
    pub async fn set_new_auth_token(&self, token: String) {
        {
            let mut state = self.lock();
            state.retry_count = 0;
            state.has_failed_prior_auth = false;
        }
        self.on_auth_token_received(Some(token)).await;
    }

    async fn on_auth_token_received(&self, token: Option<String>) {
        {
            let mut state = self.lock();
            state.pending_auth = false;
            state.auth_token = token.clone();
        }
        if let Err(e) = self.inner.token_store.save(token.clone()).await {
            error!("failed to persist auth token: {:?}", e);
        }

        match token {
            Some(token) => {
                self.queue_expiration_refresh(&token);
                let callbacks = std::mem::take(&mut self.lock().callbacks);
                debug!("auth token received, resolving {} callback(s)", callbacks.len());
                for callback in callbacks {
                    callback(Some(token.clone()));
                }
                self.inner.bus.publish(SdkEvent::AuthTokenRefreshed);
            }
            None => {
                warn!("auth delegate returned no token");
                self.handle_auth_failure(None, AuthFailureReason::AuthTokenNull);
                self.schedule_auth_token_refresh_timer(self.get_next_retry_interval(), false, None);
            }
        }
    }

    /// Reports a rejected token to the host.
    pub fn handle_auth_failure(&self, failed_auth_token: Option<String>, reason: AuthFailureReason) {
        warn!("auth failure: {:?}", reason);
        let Some(delegate) = &self.inner.delegate else {
            return;
        };
        let identity = self.inner.metadata.identity();
        delegate.on_auth_failure(AuthFailure {
            user_key: identity.email.or(identity.user_id),
            failed_auth_token,
            failed_request_time: utc_now!() / 1000,
            failure_reason: reason,
        });
    }

    fn queue_expiration_refresh(&self, token: &str) {
        self.clear_refresh_timer();
        let Some(expiration) = decode_expiration(token) else {
            self.handle_auth_failure(
                Some(token.to_string()),
                AuthFailureReason::AuthTokenPayloadInvalid,
            );
            self.schedule_auth_token_refresh_timer(self.get_next_retry_interval(), false, None);
            return;
        };
        let refresh_in = expiration * 1000
            - utc_now!()
            - self.inner.expiration_refresh_period.as_millis() as i64;
        if refresh_in > 0 {
            self.schedule_auth_token_refresh_timer(
                Duration::from_millis(refresh_in as u64),
                true,
                None,
            );
        } else {
            debug!("auth token expires within the refresh period, not arming a timer");
        }
    }

    /// Arms the one-shot refresh timer. `callback` runs with the next token
    /// the manager obtains, whichever path produces it.
    pub fn schedule_auth_token_refresh_timer(
        &self,
        interval: Duration,
        is_scheduled_refresh: bool,
        callback: Option<AuthTokenCallback>,
    ) {
        let mut state = self.lock();
        if let Some(callback) = callback {
            state.callbacks.push(callback);
        }

        match state.timer.as_ref().map(|t| t.kind) {
            Some(TimerKind::Failure) => return,
            Some(TimerKind::Expiration) if is_scheduled_refresh => return,
            Some(TimerKind::Expiration) => {
                if let Some(timer) = state.timer.take() {
                    timer.handle.abort();
                }
            }
            None => {}
        }

        if state.pause_auth_retry && !is_scheduled_refresh {
            debug!("auth retries paused, not arming refresh timer");
            return;
        }

        let kind = if is_scheduled_refresh {
            TimerKind::Expiration
        } else {
            TimerKind::Failure
        };
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let manager = self.clone();
        debug!("arming {:?} auth refresh timer in {:?}", kind, interval);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            manager.on_timer_fired(generation);
        });
        state.timer = Some(RefreshTimer {
            kind,
            generation,
            handle,
        });
    }

    fn on_timer_fired(&self, generation: u64) {
        let mut state = self.lock();
        let kind = match state.timer.as_ref() {
            Some(timer) if timer.generation == generation => timer.kind,
            _ => return,
        };
        state.timer = None;

        if !self.inner.metadata.identity().is_known() {
            debug!("email or userId is not available, skipping token refresh");
            state.callbacks.clear();
            return;
        }
        self.request_locked(&mut state, false, None, kind == TimerKind::Expiration);
    }

    fn clear_refresh_timer(&self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.handle.abort();
        }
    }

    /// Forgets the token, timers and waiting callbacks.
    pub async fn logout_user(&self) -> PushlineResult<()> {
        {
            let mut state = self.lock();
            state.auth_token = None;
            state.is_last_auth_token_valid = false;
            state.has_failed_prior_auth = false;
            state.retry_count = 0;
            state.callbacks.clear();
            if let Some(timer) = state.timer.take() {
                timer.handle.abort();
            }
        }
        self.inner.token_store.clear().await
    }
}
