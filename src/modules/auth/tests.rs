use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use native_db::Database;

use crate::modules::{
    auth::{
        failure::AuthFailureReason,
        manager::{AuthDelegate, AuthManager},
        token::AuthTokenStore,
    },
    database::manager::TaskDatabase,
    events::{EventBus, SdkEvent},
    request::{
        metadata::{ApiMetadataProvider, StaticMetadataProvider},
        model::Identity,
    },
    scheduler::retry::RetryPolicy,
    testing::{eventually, jwt_expiring_in, test_config, test_device, MockAuthDelegate},
};

fn metadata(known: bool) -> Arc<dyn ApiMetadataProvider> {
    let provider = StaticMetadataProvider::new(&test_config(), test_device());
    if known {
        provider.set_identity(Identity::email("user@pushline.io"));
    }
    Arc::new(provider)
}

fn manager_with(
    delegate: Option<Arc<MockAuthDelegate>>,
    database: Arc<Database<'static>>,
    refresh_period: Duration,
    bus: EventBus,
) -> AuthManager {
    AuthManager::new(
        delegate.map(|d| d as Arc<dyn AuthDelegate>),
        RetryPolicy::linear(3, Duration::from_millis(30)),
        refresh_period,
        AuthTokenStore::new(database),
        metadata(true),
        bus,
    )
}

fn manager(delegate: Arc<MockAuthDelegate>) -> AuthManager {
    manager_with(
        Some(delegate),
        TaskDatabase::in_memory().unwrap(),
        Duration::from_secs(60),
        EventBus::new(),
    )
}

#[tokio::test]
async fn concurrent_refreshes_share_one_delegate_call() {
    let token = jwt_expiring_in(3600);
    let delegate = MockAuthDelegate::with_delay(Some(token.clone()), Duration::from_millis(50));
    let auth = manager(delegate.clone());

    let tokens = futures::future::join_all((0..10).map(|_| auth.refresh_auth_token())).await;
    assert!(tokens.iter().all(|t| t.as_deref() == Some(token.as_str())));

    assert_eq!(delegate.request_count(), 1);
    assert_eq!(auth.get_auth_token(), Some(token));
    assert_eq!(auth.pending_callback_count(), 0);
}

#[tokio::test]
async fn token_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pushline.db");
    // Expires inside the refresh period, so no timer keeps the database open.
    let token = jwt_expiring_in(30);
    {
        let database = TaskDatabase::open(&path).unwrap();
        let auth = manager_with(None, database, Duration::from_secs(60), EventBus::new());
        auth.set_new_auth_token(token.clone()).await;
    }

    let database = TaskDatabase::open(&path).unwrap();
    let auth = manager_with(None, database, Duration::from_secs(60), EventBus::new());
    assert_eq!(auth.get_auth_token(), None);
    auth.restore().await.unwrap();
    assert_eq!(auth.get_auth_token(), Some(token));
}

#[tokio::test]
async fn logout_forgets_token_and_callbacks() {
    let database = TaskDatabase::in_memory().unwrap();
    let delegate = MockAuthDelegate::returning(Some(jwt_expiring_in(3600)));
    let auth = manager_with(
        Some(delegate),
        database.clone(),
        Duration::from_secs(60),
        EventBus::new(),
    );
    auth.refresh_auth_token().await;
    auth.schedule_auth_token_refresh_timer(
        Duration::from_secs(30),
        false,
        Some(Box::new(|_| {})),
    );
    assert_eq!(auth.pending_callback_count(), 1);

    auth.logout_user().await.unwrap();
    assert_eq!(auth.get_auth_token(), None);
    assert_eq!(auth.pending_callback_count(), 0);
    assert!(!auth.is_failure_refresh_pending());
    assert_eq!(AuthTokenStore::new(database).load().await.unwrap(), None);
}

#[tokio::test]
async fn failure_timer_runs_callback_with_new_token() {
    let token = jwt_expiring_in(3600);
    let delegate = MockAuthDelegate::returning(Some(token.clone()));
    let auth = manager(delegate.clone());

    let called = Arc::new(AtomicUsize::new(0));
    let counter = called.clone();
    auth.schedule_auth_token_refresh_timer(
        Duration::from_millis(20),
        false,
        Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    assert!(auth.is_failure_refresh_pending());

    assert!(
        eventually(Duration::from_secs(2), || {
            let called = called.clone();
            async move { called.load(Ordering::SeqCst) == 1 }
        })
        .await
    );
    assert_eq!(delegate.request_count(), 1);
    assert_eq!(auth.get_auth_token(), Some(token));
    assert!(!auth.is_failure_refresh_pending());
}

#[tokio::test]
async fn proactive_refresh_before_expiry() {
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let first = jwt_expiring_in(3);
    let second = jwt_expiring_in(3600);
    let delegate = MockAuthDelegate::returning(Some(second.clone()));
    let auth = manager_with(
        Some(delegate.clone()),
        TaskDatabase::in_memory().unwrap(),
        Duration::from_millis(1900),
        bus,
    );

    auth.set_new_auth_token(first).await;
    assert_eq!(events.recv().await.unwrap(), SdkEvent::AuthTokenRefreshed);
    assert!(!auth.is_failure_refresh_pending());

    let refreshed = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed, SdkEvent::AuthTokenRefreshed);
    assert_eq!(delegate.request_count(), 1);
    assert_eq!(auth.get_auth_token(), Some(second));
}

#[tokio::test]
async fn stops_asking_once_retries_are_exhausted() {
    let delegate = MockAuthDelegate::returning(Some(jwt_expiring_in(3600)));
    let auth = manager(delegate.clone());

    for _ in 0..3 {
        auth.set_is_last_auth_token_valid(false);
        auth.refresh_auth_token().await;
    }
    assert_eq!(auth.retry_count(), 3);

    auth.request_new_auth_token(false, None, false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delegate.request_count(), 3);

    auth.reset_retry_count();
    auth.request_new_auth_token(false, None, false);
    assert!(
        eventually(Duration::from_secs(1), || {
            let delegate = delegate.clone();
            async move { delegate.request_count() == 4 }
        })
        .await
    );
}

#[tokio::test]
async fn null_token_is_reported_and_retried() {
    let delegate = MockAuthDelegate::returning(None);
    let auth = manager(delegate.clone());

    auth.request_new_auth_token(false, None, false);
    assert!(
        eventually(Duration::from_secs(1), || {
            let delegate = delegate.clone();
            async move { !delegate.failures().is_empty() }
        })
        .await
    );
    let failure = delegate.failures()[0].clone();
    assert_eq!(failure.failure_reason, AuthFailureReason::AuthTokenNull);
    assert_eq!(failure.user_key.as_deref(), Some("user@pushline.io"));

    // The failure timer keeps asking until the retry budget is spent.
    assert!(
        eventually(Duration::from_secs(2), || {
            let delegate = delegate.clone();
            async move { delegate.request_count() == 3 }
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(delegate.request_count(), 3);
    assert_eq!(auth.get_auth_token(), None);
}

#[tokio::test]
async fn opaque_token_reports_invalid_payload() {
    let delegate = MockAuthDelegate::returning(None);
    let auth = manager(delegate.clone());
    auth.set_new_auth_token("not-a-jwt".into()).await;

    assert_eq!(auth.get_auth_token().as_deref(), Some("not-a-jwt"));
    let failures = delegate.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].failure_reason,
        AuthFailureReason::AuthTokenPayloadInvalid
    );
    assert!(auth.is_failure_refresh_pending());

    // The retry timer asks the delegate for a replacement.
    assert!(
        eventually(Duration::from_secs(1), || {
            let delegate = delegate.clone();
            async move { delegate.request_count() >= 1 }
        })
        .await
    );
}

#[tokio::test]
async fn no_refresh_without_identity() {
    let delegate = MockAuthDelegate::returning(Some(jwt_expiring_in(3600)));
    let auth = AuthManager::new(
        Some(delegate.clone() as Arc<dyn AuthDelegate>),
        RetryPolicy::linear(3, Duration::from_millis(10)),
        Duration::from_secs(60),
        AuthTokenStore::new(TaskDatabase::in_memory().unwrap()),
        metadata(false),
        EventBus::new(),
    );
    auth.schedule_auth_token_refresh_timer(Duration::from_millis(10), false, Some(Box::new(|_| {})));
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(delegate.request_count(), 0);
    assert_eq!(auth.pending_callback_count(), 0);
}

#[tokio::test]
async fn retry_interval_follows_backoff() {
    let delegate = MockAuthDelegate::returning(Some(jwt_expiring_in(3600)));
    let auth = AuthManager::new(
        Some(delegate as Arc<dyn AuthDelegate>),
        RetryPolicy::exponential(5, Duration::from_millis(100)),
        Duration::from_secs(60),
        AuthTokenStore::new(TaskDatabase::in_memory().unwrap()),
        metadata(true),
        EventBus::new(),
    );
    auth.refresh_auth_token().await;
    assert_eq!(auth.get_next_retry_interval(), Duration::from_millis(100));
    auth.refresh_auth_token().await;
    assert_eq!(auth.get_next_retry_interval(), Duration::from_millis(200));

    let linear = manager(MockAuthDelegate::returning(None));
    assert_eq!(linear.get_next_retry_interval(), Duration::from_millis(30));
}
