//! Opt-in diagnostic logging for the client.
//!
//! The client's stdout/stderr belong to the server's payloads, so trace
//! output never goes to the standard streams. When `KILNC_LOG` is set in
//! the environment, lifecycle events are written to a rolling file in the
//! daemon runtime directory instead; otherwise tracing stays uninitialized
//! and every event is a no-op.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

/// Setting this (to any non-empty value) enables client trace logging.
pub const LOG_ENV: &str = "KILNC_LOG";

/// Initialize file logging if `KILNC_LOG` is set.
///
/// Returns the non-blocking writer guard; dropping it flushes buffered
/// events, so the caller must keep it alive for the whole invocation.
pub fn init(daemon_dir: &Path) -> Option<WorkerGuard> {
    let enabled = std::env::var(LOG_ENV)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if !enabled {
        return None;
    }
    std::fs::create_dir_all(daemon_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(daemon_dir, "kilnc.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok()?;

    Some(guard)
}
