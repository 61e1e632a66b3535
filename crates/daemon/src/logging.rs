//! `tracing`/`tracing-subscriber`/`tracing-appender` setup.

use crate::config::{Config, LogFormat};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. The returned guard must be held for the lifetime of the
/// process when file logging is enabled — dropping it early would stop the non-blocking
/// writer from flushing.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.log_file {
        let subscriber = fmt().with_env_filter(filter);
        match config.log_format {
            LogFormat::Pretty => subscriber.init(),
            LogFormat::Json => subscriber.json().init(),
        }
        return None;
    }

    let log_dir = config.data_dir.join("logs");
    let file_appender = tracing_appender::rolling::never(&log_dir, log_file_name(&log_dir));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = fmt().with_env_filter(filter).with_writer(non_blocking);
    match config.log_format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
    Some(guard)
}

fn log_file_name(_log_dir: &Path) -> &'static str {
    "daemon.log"
}
