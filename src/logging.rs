//! Usage: tracing bootstrap (env-filtered console output, optional rolling file log).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global tracing subscriber.
///
/// With a `log_dir`, output goes to a daily-rolling file through a non-blocking
/// writer; keep the returned guard alive for the process lifetime or trailing
/// log lines are lost. Without one, output goes to stderr. Repeated calls are
/// no-ops.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Route `log`-crate records from dependencies into tracing.
    let _ = tracing_log::LogTracer::init();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "uniondesk-auth.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    }
}
