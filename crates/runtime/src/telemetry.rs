//! Tracing setup: env-filtered fmt output on stderr, plus an optional
//! daily-rotated file when `telemetry.log_dir` is configured.

use tracing_subscriber::EnvFilter;

use hearth_config::TelemetryConfig;

/// Initialize the global subscriber. Returns the appender guard when file
/// logging is on; hold it for the life of the process or buffered lines are
/// lost on shutdown.
pub fn init_tracing(config: &TelemetryConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, "hearth.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
