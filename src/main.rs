// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{sync::Arc, time::Duration};

use mimalloc::MiMalloc;
use pushline::{
    generate_token,
    modules::{
        auth::{
            failure::AuthFailure,
            manager::{AuthDelegate, AuthTokenFuture},
        },
        context::{SdkCollaborators, SdkContext},
        database::manager::TaskDatabase,
        error::{code::ErrorCode, PushlineResult},
        logger,
        metrics,
        network::{
            connectivity::{ConnectivityChecker, HttpProbeChecker},
            http::ReqwestTransport,
        },
        request::{model::{DeviceMetadata, Identity}, processor::RequestHandlers},
        settings::{cli::SETTINGS, config::SdkConfig},
        utils::shutdown::shutdown_signal,
    },
    pushline_version, raise_error,
};
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Hands out the token given on the command line.
struct StaticTokenDelegate {
    token: String,
}

impl AuthDelegate for StaticTokenDelegate {
    fn on_auth_token_requested(&self) -> AuthTokenFuture {
        let token = self.token.clone();
        Box::pin(async move { Some(token) })
    }

    fn on_auth_failure(&self, failure: AuthFailure) {
        warn!("auth failure reported: {:?}", failure);
    }
}

#[tokio::main]
async fn main() -> PushlineResult<()> {
    logger::initialize_logging();
    info!("Starting pushline");
    info!("Version:  {}", pushline_version!());
    info!("Git:      [{}]", env!("GIT_HASH"));
    metrics::record_build_info();

    if let Err(error) = run().await {
        eprintln!("{:?}", error);
        return Err(error);
    }
    Ok(())
}

async fn run() -> PushlineResult<()> {
    let config = SdkConfig::from_settings(&SETTINGS);
    let database = match SETTINGS.task_db_path() {
        Some(path) if !SETTINGS.pushline_memory_mode => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            }
            TaskDatabase::open(path)?
        }
        _ => TaskDatabase::in_memory()?,
    };

    let connectivity = match &SETTINGS.pushline_connectivity_probe_url {
        Some(url) => Some(Arc::new(HttpProbeChecker::new(url.clone())?) as Arc<dyn ConnectivityChecker>),
        None => None,
    };
    let collaborators = SdkCollaborators {
        transport: Arc::new(ReqwestTransport::new()?),
        auth_delegate: SETTINGS.pushline_auth_token.clone().map(|token| {
            Arc::new(StaticTokenDelegate { token }) as Arc<dyn AuthDelegate>
        }),
        connectivity,
        device_metadata: DeviceMetadata {
            device_id: generate_token!(64),
            platform: std::env::consts::OS.to_string(),
            app_package_name: "pushline-cli".to_string(),
        },
    };

    let context = SdkContext::initialize(config, database, collaborators).await?;
    context.start();

    let identity = match (&SETTINGS.pushline_email, &SETTINGS.pushline_user_id) {
        (Some(email), _) => Identity::email(email.clone()),
        (None, Some(user_id)) => Identity::user_id(user_id.clone()),
        (None, None) => Identity::default(),
    };
    let replayed = context.set_identity(identity).await?;
    if replayed > 0 {
        info!("{} buffered event(s) queued for delivery", replayed);
    }

    if let Some(event_name) = &SETTINGS.pushline_event_name {
        let data_fields = SETTINGS
            .pushline_data_fields
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| {
                raise_error!(
                    format!("--pushline-data-fields is not valid JSON: {}", e),
                    ErrorCode::InvalidParameter
                )
            })?;
        track_and_wait(&context, event_name, data_fields).await;
    }

    context.shutdown().await;
    if SETTINGS.pushline_print_metrics {
        println!("{}", metrics::render()?);
    }
    Ok(())
}

async fn track_and_wait(context: &SdkContext, event_name: &str, data_fields: Option<serde_json::Value>) {
    let pending = match context
        .track_event(event_name, data_fields, RequestHandlers::none())
        .await
    {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            info!("no user identified, '{}' was buffered", event_name);
            return;
        }
        Err(e) => {
            error!("failed to track '{}': {:?}", event_name, e);
            return;
        }
    };

    let wait = Duration::from_secs(SETTINGS.pushline_wait_secs);
    tokio::select! {
        result = tokio::time::timeout(wait, pending) => match result {
            Ok(Ok(response)) => info!("'{}' delivered: {}", event_name, response),
            Ok(Err(e)) => error!("'{}' failed: {}", event_name, e),
            Err(_) => warn!("'{}' still queued after {:?}, it will be retried on next start", event_name, wait),
        },
        _ = shutdown_signal() => {
            info!("interrupted, queued work stays persisted");
        }
    }
}
