use crate::modules::logger::{env_filter, LocalTimer};
use crate::modules::settings::cli::SETTINGS;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

pub static LOG_WORKER_GUARD: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

pub fn setup_file_logger(
    level: Level,
    log_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let with_ansi = SETTINGS.pushline_ansi_logs;

    let (nonb, guard) = sdk_log_writer(log_dir)?;
    let _ = LOG_WORKER_GUARD.set(vec![guard]);

    let layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_ansi(with_ansi)
        .with_level(true)
        .with_writer(nonb)
        .with_target(true);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn sdk_log_writer(log_dir: PathBuf) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pushline")
        .max_log_files(SETTINGS.pushline_max_log_files)
        .build(log_dir)?;
    Ok(tracing_appender::non_blocking(rolling))
}
