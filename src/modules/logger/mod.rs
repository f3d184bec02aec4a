use crate::modules::logger::file::setup_file_logger;
use crate::modules::settings::cli::SETTINGS;
use chrono::Local;
use std::process;
use tracing::Level;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};
use tracing_subscriber::EnvFilter;

mod file;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub fn initialize_logging() {
    let level = validate_log_level(&SETTINGS.pushline_log_level);
    let result = match SETTINGS.log_dir() {
        Some(log_dir) if SETTINGS.pushline_log_to_file => setup_file_logger(level, log_dir),
        _ => setup_stdout_logger(level),
    };
    if let Err(e) = result {
        eprintln!("Failed to install the log subscriber: {}", e);
    }
}

/// `RUST_LOG` wins over the configured level when it is set.
fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn setup_stdout_logger(level: Level) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let with_ansi = SETTINGS.pushline_ansi_logs;

    if SETTINGS.pushline_json_logs {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(level))
            .with_timer(LocalTimer)
            .with_writer(std::io::stdout)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true)
        .with_timer(LocalTimer);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_ansi(with_ansi)
        .with_writer(std::io::stdout)
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn validate_log_level(value: &str) -> Level {
    match value.parse::<Level>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!(
                "Invalid log level specified. Use one of: error, warn, info, debug, trace. 
        The log level you currently specified is 'pushline_log_level'='{}'",
                value
            );
            process::exit(1);
        }
    }
}
