use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "chatbox.log";

/// Routes tracing output to `<dir>/chatbox.log`; the terminal belongs to the UI.
///
/// `RUST_LOG` wins over `default_level`. Keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init(dir: &Path, default_level: &str) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,chatbox={default_level},chatbox_core={default_level}")));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    guard
}
