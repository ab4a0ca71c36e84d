use std::env;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE_PATH: &str = "./logs/db-operator.log";

/// Installs the stdout layer, plus the log file layer when `to_file` is set.
/// The returned guard flushes the file writer when dropped.
pub fn init_logger(to_file: bool) -> Option<WorkerGuard> {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE_PATH.to_string());

    let (file_layer, guard) = if to_file {
        let file_appender = tracing_appender::rolling::never("./", &log_file_path);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter_layer)
        .init();

    if to_file {
        info!("Logging to stdout and {}", log_file_path);
    }

    guard
}
