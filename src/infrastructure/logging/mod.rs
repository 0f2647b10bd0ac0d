//! Diagnostic/operational logging via `tracing`, kept distinct from the
//! `AuditStore` system-of-record: an `EnvFilter`, optional JSON
//! formatting, and optional file rotation through `tracing-appender`.

use crate::infrastructure::config::LoggingConfig as LogConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Non-reloadable guard; must be held for the lifetime of the process when
/// file logging is enabled, or the appender's background writer thread is
/// dropped and log lines stop flushing.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init(config: &LogConfig) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_guard = if let Some(path) = &config.file_path {
        let directory = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = std::path::Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or("abathur.log");
        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let builder = fmt().with_env_filter(filter).with_writer(non_blocking);
        if config.format == "json" {
            builder.json().init();
        } else {
            builder.init();
        }
        Some(guard)
    } else {
        let builder = fmt().with_env_filter(filter);
        if config.format == "json" {
            builder.json().init();
        } else {
            builder.init();
        }
        None
    };

    LoggingGuard { _file_guard: file_guard }
}
