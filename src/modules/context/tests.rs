use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use serde_json::json;

use crate::modules::{
    auth::manager::AuthDelegate,
    context::{SdkCollaborators, SdkContext},
    database::manager::TaskDatabase,
    request::{metadata::ApiMetadataProvider, model::Identity, processor::RequestHandlers},
    scheduler::store::TaskStore,
    testing::{
        error_response, eventually, jwt_expiring_in, jwt_rejected, ok_response, test_config,
        test_device, MockAuthDelegate, MockTransport,
    },
};

const EMAIL: &str = "user@pushline.io";

async fn context(
    transport: Arc<MockTransport>,
    delegate: Option<Arc<MockAuthDelegate>>,
) -> SdkContext {
    SdkContext::initialize(
        test_config(),
        TaskDatabase::in_memory().unwrap(),
        SdkCollaborators {
            transport,
            auth_delegate: delegate.map(|d| d as Arc<dyn AuthDelegate>),
            connectivity: None,
            device_metadata: test_device(),
        },
    )
    .await
    .unwrap()
}

fn counting_handlers(successes: &Arc<AtomicUsize>, failures: &Arc<AtomicUsize>) -> RequestHandlers {
    let successes = successes.clone();
    let failures = failures.clone();
    RequestHandlers::none()
        .on_success(move |_| {
            successes.fetch_add(1, Ordering::SeqCst);
        })
        .on_failure(move |_| {
            failures.fetch_add(1, Ordering::SeqCst);
        })
}

#[tokio::test]
async fn server_errors_exhaust_retries_then_fail() {
    let transport = MockTransport::new();
    transport.set_fallback(|| error_response(503, "ServiceUnavailable", "try later"));
    let ctx = context(transport.clone(), None).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();
    ctx.start();

    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let pending = ctx
        .processor()
        .track_event("purchase", None, counting_handlers(&successes, &failures))
        .await;

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap();
    let error = result.unwrap_err();
    assert_eq!(error.http_status_code, Some(503));
    assert_eq!(error.reason.as_deref(), Some("try later"));
    assert_eq!(transport.request_count(), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.scheduler().store().count_tasks().await.unwrap(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn rejected_token_is_refreshed_once_then_succeeds() {
    let fresh = jwt_expiring_in(3600);
    let delegate = MockAuthDelegate::returning(Some(fresh.clone()));
    let transport = MockTransport::new();
    transport.push(jwt_rejected());
    transport.push(ok_response(json!({"msg": "ok"})));
    let ctx = context(transport.clone(), Some(delegate.clone())).await;
    ctx.auth().set_new_auth_token(jwt_expiring_in(3600)).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();
    ctx.start();

    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let pending = ctx
        .processor()
        .track_event("login", None, counting_handlers(&successes, &failures))
        .await;

    let response = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, json!({"msg": "ok"}));
    assert_eq!(delegate.request_count(), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let expected = format!("Bearer {}", fresh);
    assert_eq!(requests[1].header("Authorization"), Some(expected.as_str()));
    assert_eq!(ctx.auth().retry_count(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn blocking_tasks_run_one_after_another() {
    let transport = MockTransport::with_delay(Duration::from_millis(150));
    let ctx = context(transport.clone(), None).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();

    let first = ctx
        .processor()
        .track_event("first", None, RequestHandlers::none())
        .await;
    let second = ctx
        .processor()
        .track_event("second", None, RequestHandlers::none())
        .await;
    let first_id = first.task_id().unwrap().to_string();
    let second_id = second.task_id().unwrap().to_string();
    ctx.start();

    assert!(
        eventually(Duration::from_secs(2), || {
            let transport = transport.clone();
            async move { transport.request_count() == 1 }
        })
        .await
    );
    let store = ctx.scheduler().store();
    assert!(store.find_task(&first_id).await.unwrap().unwrap().processing);
    assert!(!store.find_task(&second_id).await.unwrap().unwrap().processing);

    tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .unwrap()
        .unwrap();

    let names: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.json_body().unwrap()["eventName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["first", "second"]);
    ctx.shutdown().await;
}

#[tokio::test]
async fn purged_tasks_never_settle() {
    let transport = MockTransport::new();
    let ctx = context(transport.clone(), None).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();

    let mut pending = Vec::new();
    for i in 0..5 {
        pending.push(
            ctx.processor()
                .track_event(&format!("event-{}", i), None, RequestHandlers::none())
                .await,
        );
    }
    assert_eq!(ctx.scheduler().store().count_tasks().await.unwrap(), 5);

    assert_eq!(ctx.processor().delete_all_tasks().await.unwrap(), 5);
    assert_eq!(ctx.scheduler().store().count_tasks().await.unwrap(), 0);

    ctx.start();
    for request in pending {
        let outcome = tokio::time::timeout(Duration::from_millis(200), request).await;
        assert!(outcome.is_err(), "a purged task must not settle");
    }
    assert_eq!(ctx.bridge().pending_count(), 5);
    assert_eq!(transport.request_count(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn buffered_events_replay_with_original_timestamp() {
    let transport = MockTransport::new();
    let ctx = context(transport.clone(), None).await;

    let buffered = ctx
        .track_event("anonymous-view", Some(json!({"page": "home"})), RequestHandlers::none())
        .await
        .unwrap();
    assert!(buffered.is_none());
    let created_at = ctx.buffer().list().await.unwrap()[0].created_at;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(ctx.set_identity(Identity::email(EMAIL)).await.unwrap(), 1);
    assert_eq!(ctx.buffer().len().await.unwrap(), 0);
    ctx.start();

    assert!(
        eventually(Duration::from_secs(2), || {
            let transport = transport.clone();
            async move { transport.request_count() == 1 }
        })
        .await
    );
    let body = transport.requests()[0].json_body().unwrap();
    assert_eq!(body["eventName"], "anonymous-view");
    assert_eq!(body["email"], EMAIL);
    assert_eq!(body["dataFields"], json!({"page": "home"}));
    assert_eq!(body["createdAt"], json!(created_at / 1000));
    ctx.shutdown().await;
}

#[tokio::test]
async fn logout_discards_queue_and_identity() {
    let transport = MockTransport::new();
    let ctx = context(transport, None).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();
    ctx.auth().set_new_auth_token(jwt_expiring_in(3600)).await;
    ctx.processor()
        .track_event("one", None, RequestHandlers::none())
        .await;
    ctx.processor()
        .track_event("two", None, RequestHandlers::none())
        .await;

    ctx.logout().await.unwrap();
    assert_eq!(ctx.scheduler().store().count_tasks().await.unwrap(), 0);
    assert_eq!(ctx.auth().get_auth_token(), None);
    assert!(!ctx.metadata().identity().is_known());
}

#[tokio::test]
async fn request_without_identity_fails_immediately() {
    let ctx = context(MockTransport::new(), None).await;
    let result = ctx
        .processor()
        .track_event("orphan", None, RequestHandlers::none())
        .await;
    assert!(result.task_id().is_none());
    assert!(result.await.is_err());
    assert_eq!(ctx.scheduler().store().count_tasks().await.unwrap(), 0);
}

#[tokio::test]
async fn jwt_rejection_is_resubmitted_with_the_next_token() {
    let transport = MockTransport::new();
    transport.push(jwt_rejected());
    let ctx = context(transport.clone(), None).await;
    ctx.auth().set_new_auth_token(jwt_expiring_in(3600)).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();
    ctx.start();

    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let pending = ctx
        .processor()
        .track_event("login", None, counting_handlers(&successes, &failures))
        .await;

    let error = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(error.http_status_code, Some(401));
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    // Without a delegate nothing produces a token, so the request waits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(ctx.auth().pending_callback_count(), 1);

    let fresh = jwt_expiring_in(3600);
    ctx.auth().set_new_auth_token(fresh.clone()).await;
    assert!(
        eventually(Duration::from_secs(2), || {
            let successes = successes.clone();
            async move { successes.load(Ordering::SeqCst) == 1 }
        })
        .await
    );

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let expected = format!("Bearer {}", fresh);
    assert_eq!(requests[1].header("Authorization"), Some(expected.as_str()));
    assert_eq!(requests[1].json_body().unwrap()["eventName"], "login");
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn logout_during_a_request_keeps_the_runner_alive() {
    let transport = MockTransport::with_delay(Duration::from_millis(200));
    transport.push(error_response(503, "ServiceUnavailable", "try later"));
    let ctx = context(transport.clone(), None).await;
    ctx.set_identity(Identity::email(EMAIL)).await.unwrap();
    ctx.start();

    let abandoned = ctx
        .processor()
        .track_event("before-logout", None, RequestHandlers::none())
        .await;
    assert!(
        eventually(Duration::from_secs(2), || {
            let transport = transport.clone();
            async move { transport.request_count() == 1 }
        })
        .await
    );
    ctx.logout().await.unwrap();

    // Let the in-flight 503 come back and find its task gone.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(ctx.health().can_process());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), abandoned)
            .await
            .is_err()
    );

    ctx.set_identity(Identity::email("next@pushline.io"))
        .await
        .unwrap();
    let pending = ctx
        .processor()
        .track_event("after-login", None, RequestHandlers::none())
        .await;
    let response = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, json!({"msg": "ok"}));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let body = requests[1].json_body().unwrap();
    assert_eq!(body["eventName"], "after-login");
    assert_eq!(body["email"], "next@pushline.io");
    ctx.shutdown().await;
}
