use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::modules::{
    error::{code::ErrorCode, PushlineResult},
    events::{EventBus, SdkEvent},
    scheduler::periodic::{PeriodicTask, TaskHandle},
};
use crate::raise_error;

pub type ConnectivityFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Host-supplied reachability check.
pub trait ConnectivityChecker: Send + Sync {
    fn is_online(&self) -> ConnectivityFuture;
}

/// Treats any HTTP response from the probe URL as "online".
pub struct HttpProbeChecker {
    client: reqwest::Client,
    url: String,
}

impl HttpProbeChecker {
    pub fn new(url: impl Into<String>) -> PushlineResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                raise_error!(
                    format!("Failed to build HTTP client: {:#?}", e),
                    ErrorCode::InternalError
                )
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConnectivityChecker for HttpProbeChecker {
    fn is_online(&self) -> ConnectivityFuture {
        let request = self.client.head(&self.url);
        Box::pin(async move { request.send().await.is_ok() })
    }
}

/// Polls a [`ConnectivityChecker`] and publishes `ConnectivityChanged` on
/// every transition. The task runner pauses while offline.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    pub fn start(
        checker: Arc<dyn ConnectivityChecker>,
        bus: EventBus,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> TaskHandle {
        let online = Arc::new(AtomicBool::new(true));
        PeriodicTask::new("connectivity-monitor").start(
            move || {
                let checker = checker.clone();
                let bus = bus.clone();
                let online = online.clone();
                async move {
                    let now_online = checker.is_online().await;
                    let was_online = online.swap(now_online, Ordering::SeqCst);
                    if was_online != now_online {
                        if now_online {
                            info!("network connectivity restored");
                        } else {
                            warn!("network connectivity lost, pausing task runner");
                        }
                        bus.publish(SdkEvent::ConnectivityChanged { online: now_online });
                    }
                    Ok(())
                }
            },
            interval,
            shutdown,
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tokio::sync::broadcast;

    use super::{ConnectivityChecker, ConnectivityFuture, ConnectivityMonitor};
    use crate::modules::events::{EventBus, SdkEvent};

    struct Toggle(Arc<AtomicBool>);

    impl ConnectivityChecker for Toggle {
        fn is_online(&self) -> ConnectivityFuture {
            let online = self.0.load(Ordering::SeqCst);
            Box::pin(async move { online })
        }
    }

    #[tokio::test]
    async fn publishes_transitions_only() {
        let flag = Arc::new(AtomicBool::new(true));
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = ConnectivityMonitor::start(
            Arc::new(Toggle(flag.clone())),
            bus.clone(),
            Duration::from_millis(10),
            shutdown_rx,
        );

        flag.store(false, Ordering::SeqCst);
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SdkEvent::ConnectivityChanged { online: false });

        flag.store(true, Ordering::SeqCst);
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SdkEvent::ConnectivityChanged { online: true });

        handle.cancel().await;
        drop(shutdown_tx);
    }
}
